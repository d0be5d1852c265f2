// Queue - FIFO work queue over a shared list store

use crate::domain::{Item, QueueKey};
use crate::error::Result;
use crate::port::ListStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Named FIFO work queue
///
/// All state lives in the store behind `store`: the handle only binds a key
/// to a connection. Several handles (in this or other processes) may share a
/// key; ordering and at-most-once delivery come from the store's atomic list
/// operations. No operation is retried.
pub struct Queue {
    key: QueueKey,
    store: Arc<dyn ListStore>,
}

impl Queue {
    /// Bind `key` to a store connection
    ///
    /// # Errors
    /// - `QueueError::Config` if `key` is empty
    pub fn new(key: impl Into<String>, store: Arc<dyn ListStore>) -> Result<Self> {
        Ok(Self {
            key: QueueKey::new(key)?,
            store,
        })
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Current number of items (0 if the list does not exist)
    pub async fn size(&self) -> Result<u64> {
        self.store.len(self.key.as_str()).await
    }

    /// Queries the store on every call; the answer may be stale as soon as
    /// it is returned when other handles share the key.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.size().await? == 0)
    }

    /// Append `item` to the tail
    pub async fn put(&self, item: impl Into<Item>) -> Result<()> {
        let item = item.into();
        debug!(key = %self.key, bytes = item.len(), "put");
        self.store.push_tail(self.key.as_str(), item.as_bytes()).await
    }

    /// Remove and return the head item
    ///
    /// - `block == false`: returns immediately, `None` if the queue is empty.
    /// - `block == true`: waits until an item arrives or `timeout` elapses
    ///   (`None` waits forever). Expiry returns `Ok(None)`.
    ///
    /// A zero timeout never turns into an unbounded wait: it is treated as
    /// a non-blocking pop.
    pub async fn get(&self, block: bool, timeout: Option<Duration>) -> Result<Option<Item>> {
        let key = self.key.as_str();
        let popped = match (block, timeout) {
            (false, _) => self.store.pop_head(key).await?,
            (true, Some(t)) if t.is_zero() => self.store.pop_head(key).await?,
            (true, timeout) => self.store.blocking_pop_head(key, timeout).await?,
        };

        debug!(key = %self.key, block, hit = popped.is_some(), "get");
        Ok(popped.map(Item::from))
    }

    /// Non-blocking `get`
    pub async fn try_get(&self) -> Result<Option<Item>> {
        self.get(false, None).await
    }

    /// Blocking `get` bounded by `timeout`
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Option<Item>> {
        self.get(true, Some(timeout)).await
    }

    /// Delete the underlying list; returns whether it existed
    pub async fn clear(&self) -> Result<bool> {
        self.store.delete(self.key.as_str()).await
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("key", &self.key).finish()
    }
}
