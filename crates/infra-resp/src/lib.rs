// taskq Infrastructure - RESP2 Adapter
// Implements: ListStore against Redis-compatible servers

mod config;
mod connection;
mod list_store;

pub use config::{
    ConnectionConfig, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT,
};
pub use list_store::{RespStore, MAX_BLOCKING_TIMEOUT};

use std::sync::Arc;
use taskq_core::domain::QueueKey;
use taskq_core::error::Result;
use taskq_core::Queue;

/// Open a queue on a Redis-compatible server
///
/// Connects eagerly: configuration problems surface as
/// `QueueError::Config` and an unreachable server or rejected credentials
/// as `QueueError::Connection`, before any queue operation runs. The queue
/// owns its connection exclusively.
pub async fn connect_queue(key: impl Into<String>, config: &ConnectionConfig) -> Result<Queue> {
    let key = QueueKey::new(key)?;
    let store = RespStore::connect(config.clone()).await?;
    Queue::new(key.as_str(), Arc::new(store))
}
