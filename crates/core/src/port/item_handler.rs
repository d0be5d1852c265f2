// Item Handler Port
// Work performed by a Consumer for each dequeued item

use crate::domain::Item;
use async_trait::async_trait;
use thiserror::Error;

/// Handler failure (logged and counted by the consumer, never retried)
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Item Handler trait
#[async_trait]
pub trait ItemHandler: Send + Sync {
    /// Process one dequeued item
    async fn handle(&self, item: Item) -> Result<(), HandlerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every item it receives
    #[derive(Default)]
    pub struct RecordingHandler {
        items: Mutex<Vec<Item>>,
    }

    impl RecordingHandler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn items(&self) -> Vec<Item> {
            self.items.lock().map(|items| items.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ItemHandler for RecordingHandler {
        async fn handle(&self, item: Item) -> Result<(), HandlerError> {
            if let Ok(mut items) = self.items.lock() {
                items.push(item);
            }
            Ok(())
        }
    }

    /// Fails on every item whose payload equals `poison`
    pub struct PoisonHandler {
        poison: Vec<u8>,
        inner: RecordingHandler,
    }

    impl PoisonHandler {
        pub fn new(poison: impl Into<Vec<u8>>) -> Self {
            Self {
                poison: poison.into(),
                inner: RecordingHandler::new(),
            }
        }

        /// Items that were handled successfully
        pub fn items(&self) -> Vec<Item> {
            self.inner.items()
        }
    }

    #[async_trait]
    impl ItemHandler for PoisonHandler {
        async fn handle(&self, item: Item) -> Result<(), HandlerError> {
            if item.as_bytes() == self.poison.as_slice() {
                return Err(HandlerError::Failed("poison item".to_string()));
            }
            self.inner.handle(item).await
        }
    }
}
