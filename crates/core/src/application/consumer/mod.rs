// Consumer - Item processing loop over one queue

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::Queue;
use crate::port::ItemHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// How a consumer reads an empty timed `get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// `None` means "nothing yet": issue another get
    #[default]
    WaitForWork,
    /// `None` means "drained": stop the loop
    ///
    /// Other producers may still be running, so this is a heuristic for
    /// batch jobs rather than a guarantee that the queue stays empty.
    StopWhenIdle,
}

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Bound on each blocking get (`None` waits forever)
    pub poll_timeout: Option<Duration>,
    pub drain_policy: DrainPolicy,
    /// Pause after a store error
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Some(DEFAULT_POLL_TIMEOUT),
            drain_policy: DrainPolicy::default(),
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

/// Counters reported when a consumer stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub failed: u64,
    pub store_errors: u64,
}

/// Pulls items from a queue and hands them to an `ItemHandler`
///
/// Delivery is at most once: an item whose handler fails is logged and
/// counted, never put back.
pub struct Consumer {
    id: String,
    queue: Queue,
    handler: Arc<dyn ItemHandler>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(queue: Queue, handler: Arc<dyn ItemHandler>) -> Self {
        Self::with_config(queue, handler, ConsumerConfig::default())
    }

    pub fn with_config(queue: Queue, handler: Arc<dyn ItemHandler>, config: ConsumerConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue,
            handler,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Run until shutdown (or until drained under `StopWhenIdle`)
    ///
    /// Shutdown is raced against the outstanding get; the losing get future
    /// is dropped, which releases the store-side wait.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> ConsumerStats {
        let key = self.queue.key().clone();
        let mut stats = ConsumerStats::default();
        info!(consumer_id = %self.id, key = %key, "Consumer started");

        loop {
            if shutdown.is_shutdown() {
                info!(consumer_id = %self.id, "Consumer shutting down");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!(consumer_id = %self.id, "Consumer interrupted while waiting");
                    break;
                }
                next = self.queue.get(true, self.config.poll_timeout) => next,
            };

            match next {
                Ok(Some(item)) => match self.handler.handle(item).await {
                    Ok(()) => stats.processed += 1,
                    Err(e) => {
                        stats.failed += 1;
                        warn!(consumer_id = %self.id, key = %key, error = %e, "Handler failed, item dropped");
                    }
                },
                Ok(None) => {
                    if self.config.drain_policy == DrainPolicy::StopWhenIdle {
                        info!(consumer_id = %self.id, key = %key, "Queue drained");
                        break;
                    }
                }
                Err(e) => {
                    stats.store_errors += 1;
                    error!(consumer_id = %self.id, key = %key, error = %e, "Store error");
                    tokio::select! {
                        _ = sleep(self.config.error_backoff) => {},
                        _ = shutdown.wait() => {
                            info!(consumer_id = %self.id, "Consumer interrupted during error backoff");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            consumer_id = %self.id,
            processed = stats.processed,
            failed = stats.failed,
            store_errors = stats.store_errors,
            "Consumer stopped"
        );
        stats
    }
}
