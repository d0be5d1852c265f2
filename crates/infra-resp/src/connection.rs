// RESP2 Connection Setup

use crate::config::ConnectionConfig;
use bytes::{Buf, BytesMut};
use redis_protocol::error::{RedisProtocolError, RedisProtocolErrorKind};
use redis_protocol::resp2::decode::decode;
use redis_protocol::resp2::encode::encode;
use redis_protocol::resp2::types::OwnedFrame;
use taskq_core::error::{QueueError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

// Array header plus per-argument `$<len>\r\n...\r\n` framing
const FRAME_OVERHEAD: usize = 32;

/// A single authenticated connection to the store
///
/// Not cancel-safe: if a request future is dropped mid-flight the reply
/// stream is out of sync, so the owner must discard the connection.
pub(crate) struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    /// Connect, authenticate and select the database
    ///
    /// Every failure here is a `QueueError::Connection`.
    pub(crate) async fn open(config: &ConnectionConfig) -> Result<Self> {
        let address = config.address();
        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| {
            QueueError::Connection(format!(
                "Connect to {} timed out after {:?}",
                address, config.connect_timeout
            ))
        })?
        .map_err(|e| QueueError::Connection(format!("Connect to {} failed: {}", address, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| QueueError::Connection(format!("Socket setup failed: {}", e)))?;

        let mut conn = Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        };

        let handshake = timeout(config.connect_timeout, conn.handshake(config))
            .await
            .map_err(|_| {
                QueueError::Connection(format!("Handshake with {} timed out", address))
            })?;
        handshake.map_err(|e| match e {
            QueueError::Connection(_) => e,
            other => QueueError::Connection(format!("Handshake with {} failed: {}", address, other)),
        })?;

        debug!(address = %address, db = config.db, "Connection established");
        Ok(conn)
    }

    async fn handshake(&mut self, config: &ConnectionConfig) -> Result<()> {
        if let Some(password) = &config.password {
            let mut args: Vec<&[u8]> = vec![b"AUTH".as_slice()];
            if let Some(username) = &config.username {
                args.push(username.as_bytes());
            }
            args.push(password.as_bytes());
            self.expect_ok("AUTH", &args).await?;
        }

        if config.db != 0 {
            let db = config.db.to_string();
            self.expect_ok("SELECT", &[b"SELECT".as_slice(), db.as_bytes()]).await?;
        }

        if let Some(name) = &config.client_name {
            self.expect_ok("CLIENT SETNAME", &[b"CLIENT".as_slice(), b"SETNAME", name.as_bytes()])
                .await?;
        }

        Ok(())
    }

    async fn expect_ok(&mut self, command: &str, args: &[&[u8]]) -> Result<()> {
        match self.request(args).await? {
            OwnedFrame::SimpleString(_) => Ok(()),
            OwnedFrame::Error(message) => Err(QueueError::Connection(format!(
                "{} rejected: {}",
                command, message
            ))),
            other => Err(QueueError::Connection(format!(
                "Unexpected reply to {}: {:?}",
                command, other
            ))),
        }
    }

    /// Send one command and read its reply
    ///
    /// Transport failures are `QueueError::Store`. Error replies are
    /// returned as `OwnedFrame::Error` for the caller to interpret.
    pub(crate) async fn request(&mut self, args: &[&[u8]]) -> Result<OwnedFrame> {
        self.write_command(args).await?;
        self.read_frame().await
    }

    async fn write_command(&mut self, args: &[&[u8]]) -> Result<()> {
        let frame = OwnedFrame::Array(
            args.iter()
                .map(|arg| OwnedFrame::BulkString(arg.to_vec()))
                .collect(),
        );

        let capacity = FRAME_OVERHEAD + args.iter().map(|a| a.len() + FRAME_OVERHEAD).sum::<usize>();
        let mut out = vec![0u8; capacity];
        let written = encode(&mut out, &frame).map_err(map_protocol_error)?;

        self.stream
            .write_all(&out[..written])
            .await
            .map_err(map_io_error)
    }

    async fn read_frame(&mut self) -> Result<OwnedFrame> {
        loop {
            match decode(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) if is_incomplete(&e) => {}
                Err(e) => return Err(map_protocol_error(e)),
            }

            let n = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(map_io_error)?;
            if n == 0 {
                return Err(QueueError::Store(
                    "Connection closed by server".to_string(),
                ));
            }
        }
    }
}

fn is_incomplete(err: &RedisProtocolError) -> bool {
    matches!(err.kind(), RedisProtocolErrorKind::BufferTooSmall(_))
}

fn map_io_error(err: std::io::Error) -> QueueError {
    QueueError::Store(format!("I/O error: {} (kind: {:?})", err, err.kind()))
}

fn map_protocol_error(err: RedisProtocolError) -> QueueError {
    QueueError::Store(format!("Protocol error: {:?}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    type Exchange = (&'static [u8], &'static [u8]);

    /// Accepts one connection and plays back a request/reply script
    async fn scripted_server(script: Vec<Exchange>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for (expected, reply) in script {
                let mut buf = vec![0u8; expected.len()];
                socket.read_exact(&mut buf).await.unwrap();
                assert_eq!(buf, expected);
                // Split the reply to exercise partial-frame reads
                let (head, tail) = reply.split_at(reply.len() / 2);
                socket.write_all(head).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                socket.write_all(tail).await.unwrap();
            }
            // Hold the socket open until the client is done
            let _ = socket.read(&mut [0u8; 1]).await;
        });
        port
    }

    #[tokio::test]
    async fn test_auth_and_select_handshake() {
        let port = scripted_server(vec![
            (
                b"*3\r\n$4\r\nAUTH\r\n$6\r\nworker\r\n$6\r\nsecret\r\n".as_slice(),
                b"+OK\r\n".as_slice(),
            ),
            (
                b"*2\r\n$6\r\nSELECT\r\n$1\r\n2\r\n".as_slice(),
                b"+OK\r\n".as_slice(),
            ),
        ])
        .await;
        let config = ConnectionConfig::new("127.0.0.1", port)
            .with_credentials(Some("worker".to_string()), "secret")
            .with_db(2);

        assert_ok!(Connection::open(&config).await);
    }

    #[tokio::test]
    async fn test_rejected_auth_is_connection_error() {
        let port = scripted_server(vec![(
            b"*2\r\n$4\r\nAUTH\r\n$5\r\nwrong\r\n".as_slice(),
            b"-WRONGPASS invalid username-password pair\r\n".as_slice(),
        )])
        .await;
        let config = ConnectionConfig::new("127.0.0.1", port).with_credentials(None, "wrong");

        let err = Connection::open(&config).await.err().unwrap();
        assert!(err.is_connection());
        assert!(err.to_string().contains("WRONGPASS"));
    }

    #[tokio::test]
    async fn test_request_reads_split_reply() {
        let port = scripted_server(vec![(
            b"*2\r\n$4\r\nLLEN\r\n$5\r\ntasks\r\n".as_slice(),
            b":42\r\n".as_slice(),
        )])
        .await;
        let mut conn = assert_ok!(Connection::open(&ConnectionConfig::new("127.0.0.1", port)).await);

        let reply = assert_ok!(conn.request(&[b"LLEN".as_slice(), b"tasks"]).await);
        assert_eq!(reply, OwnedFrame::Integer(42));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Connection::open(&ConnectionConfig::new("127.0.0.1", port))
            .await
            .err()
            .unwrap();
        assert!(err.is_connection());
    }
}
