// Central Error Type for taskq

use thiserror::Error;

/// Queue error taxonomy
///
/// A blocking `get` that times out is not an error: it returns `Ok(None)`.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Invalid or incomplete connection configuration (or queue key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unable to establish or keep a connection to the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single operation failed against a connected store
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// True for errors raised while reaching the store, as opposed to
    /// failures of an individual command
    pub fn is_connection(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}

/// Result type alias using QueueError
pub type Result<T> = std::result::Result<T, QueueError>;
