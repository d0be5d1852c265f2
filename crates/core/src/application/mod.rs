// Application Layer - Queue contract and consumers

pub mod consumer;
pub mod queue;

// Re-exports
pub use consumer::{
    shutdown_channel, Consumer, ConsumerConfig, ConsumerStats, DrainPolicy, ShutdownSender,
    ShutdownToken,
};
pub use queue::Queue;
