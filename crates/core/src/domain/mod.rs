// Domain Layer - queue identity and payloads

pub mod item;
pub mod queue;

// Re-exports
pub use item::Item;
pub use queue::QueueKey;
