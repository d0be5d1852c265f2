// RESP ListStore Implementation

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use async_trait::async_trait;
use redis_protocol::resp2::types::OwnedFrame;
use std::time::Duration;
use taskq_core::error::{QueueError, Result};
use taskq_core::port::ListStore;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

// Helper to turn a reply frame into a StoreError with command context
fn unexpected_reply(command: &str, frame: OwnedFrame) -> QueueError {
    match frame {
        OwnedFrame::Error(message) => {
            QueueError::Store(format!("{} failed: {}", command, message))
        }
        other => QueueError::Store(format!("Unexpected reply to {}: {:?}", command, other)),
    }
}

fn integer_reply(command: &str, frame: OwnedFrame) -> Result<i64> {
    match frame {
        OwnedFrame::Integer(n) => Ok(n),
        other => Err(unexpected_reply(command, other)),
    }
}

/// Longest wait sent to the server; anything longer waits forever
///
/// Servers reject timeouts whose deadline does not fit their millisecond
/// clock, so very long waits are sent as `0` instead.
pub const MAX_BLOCKING_TIMEOUT: Duration = Duration::from_secs(u32::MAX as u64);

/// `BLPOP` timeout argument in seconds, rounded up to the millisecond
///
/// Whole seconds are sent as integers, which every server version accepts.
/// Fractions need Redis 6.0 or later. Never renders a zero for a non-zero
/// duration, since the server reads `0` as "wait forever".
fn blpop_timeout_arg(timeout: Option<Duration>) -> String {
    match timeout {
        None => "0".to_string(),
        Some(t) => {
            let millis = t.as_nanos().div_ceil(1_000_000).max(1);
            if millis % 1000 == 0 {
                format!("{}", millis / 1000)
            } else {
                format!("{}.{:03}", millis / 1000, millis % 1000)
            }
        }
    }
}

/// Client-side bound on a blocking pop
///
/// The server answers on its own deadline; the bound only guards against a
/// silent connection. No bound when either side is unbounded or the sum
/// overflows.
fn blocking_limit(timeout: Option<Duration>, slack: Option<Duration>) -> Option<Duration> {
    timeout?.checked_add(slack?)
}

/// ListStore backed by a Redis-compatible server
///
/// Owns exactly one connection, opened eagerly by `connect`. A command takes
/// the connection out of its slot and only puts it back after a complete
/// reply; a cancelled call, an I/O error or a command timeout therefore
/// drops the socket (which also ends any server-side `BLPOP`), and the next
/// call reconnects. Nothing is retried.
///
/// Sub-second blocking timeouts require Redis 6.0 or later.
pub struct RespStore {
    config: ConnectionConfig,
    conn: Mutex<Option<Connection>>,
}

impl RespStore {
    /// Validate `config` and open the connection
    ///
    /// # Errors
    /// - `QueueError::Config` for an unusable configuration
    /// - `QueueError::Connection` if the server is unreachable or rejects
    ///   authentication
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open(&config).await?;
        info!(address = %config.address(), db = config.db, "Connected to store");

        Ok(Self {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether a live connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn execute(&self, args: &[&[u8]], limit: Option<Duration>) -> Result<OwnedFrame> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                debug!(address = %self.config.address(), "Reconnecting");
                Connection::open(&self.config).await?
            }
        };

        let reply = match limit {
            Some(limit) => match timeout(limit, conn.request(args)).await {
                Ok(reply) => reply,
                Err(_) => Err(QueueError::Store(format!(
                    "Command timed out after {:?}",
                    limit
                ))),
            },
            None => conn.request(args).await,
        };

        match reply {
            Ok(frame) => {
                *slot = Some(conn);
                Ok(frame)
            }
            Err(e) => {
                warn!(address = %self.config.address(), error = %e, "Discarding connection");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ListStore for RespStore {
    async fn len(&self, key: &str) -> Result<u64> {
        let frame = self
            .execute(&[b"LLEN".as_slice(), key.as_bytes()], self.config.command_timeout)
            .await?;
        let len = integer_reply("LLEN", frame)?;
        u64::try_from(len).map_err(|_| QueueError::Store(format!("Negative LLEN reply: {}", len)))
    }

    async fn push_tail(&self, key: &str, item: &[u8]) -> Result<()> {
        let frame = self
            .execute(&[b"RPUSH".as_slice(), key.as_bytes(), item], self.config.command_timeout)
            .await?;
        integer_reply("RPUSH", frame)?;
        Ok(())
    }

    async fn pop_head(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let frame = self
            .execute(&[b"LPOP".as_slice(), key.as_bytes()], self.config.command_timeout)
            .await?;
        match frame {
            OwnedFrame::BulkString(item) => Ok(Some(item)),
            OwnedFrame::Null => Ok(None),
            other => Err(unexpected_reply("LPOP", other)),
        }
    }

    async fn blocking_pop_head(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let timeout = timeout.filter(|t| *t <= MAX_BLOCKING_TIMEOUT);
        let timeout_arg = blpop_timeout_arg(timeout);
        let limit = blocking_limit(timeout, self.config.command_timeout);

        let frame = self
            .execute(
                &[b"BLPOP".as_slice(), key.as_bytes(), timeout_arg.as_bytes()],
                limit,
            )
            .await?;
        match frame {
            // [key, value]: only the value is surfaced
            OwnedFrame::Array(mut pair) if pair.len() == 2 => match pair.pop() {
                Some(OwnedFrame::BulkString(item)) => Ok(Some(item)),
                other => Err(QueueError::Store(format!(
                    "Unexpected BLPOP element: {:?}",
                    other
                ))),
            },
            OwnedFrame::Null => Ok(None),
            other => Err(unexpected_reply("BLPOP", other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let frame = self
            .execute(&[b"DEL".as_slice(), key.as_bytes()], self.config.command_timeout)
            .await?;
        Ok(integer_reply("DEL", frame)? > 0)
    }
}
