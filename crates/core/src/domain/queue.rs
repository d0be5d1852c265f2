// Queue Domain Model

use crate::error::{QueueError, Result};
use std::fmt;

/// Name of one ordered list in the shared store
///
/// Handles built from equal keys observe and mutate the same sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey(String);

impl QueueKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(QueueError::Config("Queue key cannot be empty".to_string()));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for QueueKey {
    type Error = QueueError;

    fn try_from(key: &str) -> Result<Self> {
        Self::new(key)
    }
}

impl TryFrom<String> for QueueKey {
    type Error = QueueError;

    fn try_from(key: String) -> Result<Self> {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let err = QueueKey::new("").unwrap_err();
        assert!(matches!(err, QueueError::Config(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_key_kept_verbatim() {
        let key = QueueKey::new("jobs:email high").unwrap();
        assert_eq!(key.as_str(), "jobs:email high");
        assert_eq!(key.to_string(), "jobs:email high");
    }
}
