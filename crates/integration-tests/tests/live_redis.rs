//! Runs against a real server when TASKQ_TEST_REDIS_URL is set, e.g.
//! `TASKQ_TEST_REDIS_URL=redis://127.0.0.1:6379/15 cargo test -p taskq-integration-tests`.
//! Skipped otherwise.

use std::time::{Duration, Instant};

use taskq_infra_resp::{connect_queue, ConnectionConfig};

fn live_config() -> Option<ConnectionConfig> {
    let url = std::env::var("TASKQ_TEST_REDIS_URL").ok()?;
    Some(ConnectionConfig::from_url(&url).expect("TASKQ_TEST_REDIS_URL must be a redis:// URL"))
}

fn unique_key(name: &str) -> String {
    format!("taskq-test:{}:{}", name, nanos_suffix())
}

fn nanos_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_live_scenario() {
    let Some(config) = live_config() else {
        eprintln!("TASKQ_TEST_REDIS_URL not set, skipping");
        return;
    };
    let queue = connect_queue(unique_key("scenario"), &config).await.unwrap();
    queue.clear().await.unwrap();

    assert!(queue.is_empty().await.unwrap());
    queue.put("A").await.unwrap();
    queue.put("B").await.unwrap();
    assert_eq!(queue.size().await.unwrap(), 2);
    assert_eq!(queue.get(false, None).await.unwrap().unwrap(), "A");
    assert_eq!(queue.get(true, None).await.unwrap().unwrap(), "B");
    assert_eq!(queue.get(false, None).await.unwrap(), None);

    let started = Instant::now();
    assert_eq!(queue.get_timeout(Duration::from_millis(300)).await.unwrap(), None);
    assert!(started.elapsed() >= Duration::from_millis(300));

    queue.clear().await.unwrap();
}

#[tokio::test]
async fn test_live_cancelled_get_does_not_swallow_items() {
    let Some(config) = live_config() else {
        eprintln!("TASKQ_TEST_REDIS_URL not set, skipping");
        return;
    };
    let key = unique_key("cancel");
    let consumer = connect_queue(key.clone(), &config).await.unwrap();
    let producer = connect_queue(key, &config).await.unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), consumer.get(true, None)).await;
    assert!(cancelled.is_err());
    // Give the server a moment to notice the closed socket
    tokio::time::sleep(Duration::from_millis(100)).await;

    producer.put("kept").await.unwrap();
    assert_eq!(producer.size().await.unwrap(), 1);
    assert_eq!(consumer.try_get().await.unwrap().unwrap(), "kept");
}
