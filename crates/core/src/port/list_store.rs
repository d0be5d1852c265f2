// List Store Port (Interface)
//
// The queue keeps no state of its own: every operation is delegated to a
// shared ordered-list store through this trait.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Ordered-list primitives the queue depends on
///
/// Implementations must make each call atomic with respect to other
/// clients of the same store, and keep list elements under a key in
/// insertion order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Number of elements under `key` (0 if the key does not exist)
    async fn len(&self, key: &str) -> Result<u64>;

    /// Append `item` to the tail, creating the list if needed
    async fn push_tail(&self, key: &str, item: &[u8]) -> Result<()>;

    /// Remove and return the head element without waiting
    async fn pop_head(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove and return the head element, waiting up to `timeout`
    /// (`None` waits forever) for one to appear
    ///
    /// Returns only the element, never the store's `[key, value]` pair.
    /// Expiry yields `Ok(None)`. Dropping the returned future must release
    /// the underlying wait.
    async fn blocking_pop_head(&self, key: &str, timeout: Option<Duration>)
        -> Result<Option<Vec<u8>>>;

    /// Remove the whole list; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}
