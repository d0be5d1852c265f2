//! Consumer loop against a queue served over RESP

use std::sync::Arc;
use std::time::Duration;

use taskq_core::application::{shutdown_channel, ConsumerConfig, DrainPolicy};
use taskq_core::port::item_handler::mocks::{PoisonHandler, RecordingHandler};
use taskq_core::{Consumer, Item};
use taskq_infra_resp::connect_queue;
use taskq_integration_tests::FakeServer;

#[tokio::test]
async fn test_drains_queue_in_order() {
    let server = FakeServer::start().await;
    let producer = connect_queue("emails", &server.config()).await.unwrap();
    for i in 0..5 {
        producer.put(format!("mail-{}", i)).await.unwrap();
    }

    let handler = Arc::new(RecordingHandler::new());
    let consumer = Consumer::with_config(
        connect_queue("emails", &server.config()).await.unwrap(),
        handler.clone(),
        ConsumerConfig {
            poll_timeout: Some(Duration::from_millis(100)),
            drain_policy: DrainPolicy::StopWhenIdle,
            ..Default::default()
        },
    );

    let (_tx, token) = shutdown_channel();
    let stats = tokio::time::timeout(Duration::from_secs(5), consumer.run(token))
        .await
        .expect("consumer should stop once drained");

    assert_eq!(stats.processed, 5);
    let expected: Vec<Item> = (0..5).map(|i| Item::from(format!("mail-{}", i))).collect();
    assert_eq!(handler.items(), expected);
    assert!(producer.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_failed_item_is_not_redelivered() {
    let server = FakeServer::start().await;
    let producer = connect_queue("jobs", &server.config()).await.unwrap();
    for item in ["ok-1", "bad", "ok-2"] {
        producer.put(item).await.unwrap();
    }

    let handler = Arc::new(PoisonHandler::new("bad"));
    let consumer = Consumer::with_config(
        connect_queue("jobs", &server.config()).await.unwrap(),
        handler.clone(),
        ConsumerConfig {
            poll_timeout: Some(Duration::from_millis(100)),
            drain_policy: DrainPolicy::StopWhenIdle,
            ..Default::default()
        },
    );

    let (_tx, token) = shutdown_channel();
    let stats = consumer.run(token).await;

    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(handler.items(), vec![Item::from("ok-1"), Item::from("ok-2")]);
    assert!(producer.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_shutdown_while_blocked_releases_server_wait() {
    let server = FakeServer::start().await;
    let handler = Arc::new(RecordingHandler::new());
    let consumer = Consumer::with_config(
        connect_queue("jobs", &server.config()).await.unwrap(),
        handler.clone(),
        ConsumerConfig {
            poll_timeout: None,
            ..Default::default()
        },
    );
    assert!(server.wait_for_connections(1).await);

    let (tx, token) = shutdown_channel();
    let running = tokio::spawn(async move { consumer.run(token).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    tx.shutdown();
    let stats = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("consumer should stop promptly")
        .unwrap();
    assert_eq!(stats.processed, 0);

    // The abandoned BLPOP went away with the connection
    assert!(server.wait_for_connections(0).await);

    let producer = connect_queue("jobs", &server.config()).await.unwrap();
    producer.put("later").await.unwrap();
    assert_eq!(producer.size().await.unwrap(), 1);
    assert!(handler.items().is_empty());
}

#[tokio::test]
async fn test_wait_for_work_picks_up_late_items() {
    let server = FakeServer::start().await;
    let handler = Arc::new(RecordingHandler::new());
    let consumer = Consumer::with_config(
        connect_queue("jobs", &server.config()).await.unwrap(),
        handler.clone(),
        ConsumerConfig {
            poll_timeout: Some(Duration::from_millis(50)),
            drain_policy: DrainPolicy::WaitForWork,
            ..Default::default()
        },
    );

    let (tx, token) = shutdown_channel();
    let running = tokio::spawn(async move { consumer.run(token).await });

    // Several empty polls go by before the item shows up
    tokio::time::sleep(Duration::from_millis(200)).await;
    let producer = connect_queue("jobs", &server.config()).await.unwrap();
    producer.put("late").await.unwrap();

    for _ in 0..100 {
        if !handler.items().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.shutdown();

    let stats = running.await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(handler.items(), vec![Item::from("late")]);
}
