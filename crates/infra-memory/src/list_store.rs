// In-memory ListStore Implementation

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use taskq_core::error::Result;
use taskq_core::port::ListStore;
use taskq_core::Queue;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

/// One list plus the waiters blocked on it
#[derive(Default)]
struct KeyList {
    items: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl KeyList {
    fn items(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        // No user code runs under the lock, so a poisoned guard still holds
        // a consistent list.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_pop(&self) -> Option<Vec<u8>> {
        let mut items = self.items();
        let item = items.pop_front();
        if item.is_some() && !items.is_empty() {
            // Hand the remaining items to the next waiter
            self.notify.notify_one();
        }
        item
    }
}

/// Process-local ordered-list store
///
/// Clones share the same lists, so several `Queue` handles built from clones
/// behave like several clients of one server. Every operation is atomic
/// under the per-key lock. An emptied list is indistinguishable from a
/// missing key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    lists: Arc<DashMap<String, Arc<KeyList>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a queue handle to this store
    pub fn queue(&self, key: impl Into<String>) -> Result<Queue> {
        Queue::new(key, Arc::new(self.clone()))
    }

    fn list(&self, key: &str) -> Arc<KeyList> {
        if let Some(list) = self.lists.get(key) {
            return Arc::clone(list.value());
        }
        Arc::clone(self.lists.entry(key.to_string()).or_default().value())
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn len(&self, key: &str) -> Result<u64> {
        let len = self
            .lists
            .get(key)
            .map(|list| {
                let len = list.items().len();
                len
            })
            .unwrap_or(0);
        Ok(len as u64)
    }

    async fn push_tail(&self, key: &str, item: &[u8]) -> Result<()> {
        let list = self.list(key);
        list.items().push_back(item.to_vec());
        list.notify.notify_one();
        trace!(key, "push_tail");
        Ok(())
    }

    async fn pop_head(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lists.get(key).and_then(|list| list.try_pop()))
    }

    async fn blocking_pop_head(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let list = self.list(key);
        // A deadline past the clock's range is the same as no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            // Register before checking so a push between the check and the
            // await still wakes us.
            let notified = list.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = list.try_pop() {
                return Ok(Some(item));
            }

            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        trace!(key, "blocking_pop_head timed out");
                        return Ok(list.try_pop());
                    }
                }
                None => notified.await,
            }
            // Woken: another waiter may have taken the item, so loop.
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        // The entry stays in the map: blocked waiters keep their Arc and must
        // still be woken by later pushes.
        let existed = self
            .lists
            .get(key)
            .map(|list| {
                let mut items = list.items();
                let existed = !items.is_empty();
                items.clear();
                existed
            })
            .unwrap_or(false);
        Ok(existed)
    }
}
