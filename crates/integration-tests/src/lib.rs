//! Test fixtures shared by the integration tests
//!
//! `FakeServer` speaks enough RESP2 (AUTH, SELECT, CLIENT, PING, LLEN, RPUSH,
//! LPOP, BLPOP, DEL) for `RespStore` to run against it without a real Redis.
//! Lists live in a `MemoryStore`, namespaced by the selected database. A
//! blocked `BLPOP` is abandoned as soon as its client disconnects, like a
//! real server does.

use bytes::{Buf, BytesMut};
use redis_protocol::resp2::decode::decode;
use redis_protocol::resp2::encode::encode;
use redis_protocol::resp2::types::OwnedFrame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskq_core::port::ListStore;
use taskq_infra_memory::MemoryStore;
use taskq_infra_resp::ConnectionConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct FakeServer {
    port: u16,
    store: MemoryStore,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start() -> Self {
        Self::start_inner(None).await
    }

    /// Require `AUTH <password>` (any username) before other commands
    pub async fn start_with_password(password: &str) -> Self {
        Self::start_inner(Some(password.to_string())).await
    }

    async fn start_inner(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake server");
        let port = listener.local_addr().expect("local addr").port();
        let store = MemoryStore::new();
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = {
            let store = store.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let session = Session {
                        store: store.clone(),
                        password: password.clone(),
                        authenticated: password.is_none(),
                        db: 0,
                    };
                    let connections = connections.clone();
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let _ = session.run(socket).await;
                        connections.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        };

        Self {
            port,
            store,
            connections,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", self.port)
    }

    /// Server-side view of the lists (database 0 unless namespaced)
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until the server has seen `expected` open connections
    pub async fn wait_for_connections(&self, expected: usize) -> bool {
        for _ in 0..200 {
            if self.active_connections() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Namespaced list key as stored in the backing `MemoryStore`
pub fn db_key(db: i64, key: &str) -> String {
    if db == 0 {
        key.to_string()
    } else {
        format!("{}:{}", db, key)
    }
}

struct Session {
    store: MemoryStore,
    password: Option<String>,
    authenticated: bool,
    db: i64,
}

impl Session {
    async fn run(mut self, socket: TcpStream) -> std::io::Result<()> {
        let (mut reader, mut writer) = socket.into_split();
        let mut buffer = BytesMut::with_capacity(4096);

        loop {
            let frame = match decode(&buffer) {
                Ok(Some((frame, consumed))) => {
                    buffer.advance(consumed);
                    frame
                }
                Ok(None) | Err(_) => {
                    if reader.read_buf(&mut buffer).await? == 0 {
                        return Ok(());
                    }
                    continue;
                }
            };

            let reply = match self.dispatch(frame, &mut reader, &mut buffer).await {
                Some(reply) => reply,
                // Client went away while blocked
                None => return Ok(()),
            };
            writer.write_all(&encode_frame(&reply)).await?;
        }
    }

    async fn dispatch(
        &mut self,
        frame: OwnedFrame,
        reader: &mut OwnedReadHalf,
        buffer: &mut BytesMut,
    ) -> Option<OwnedFrame> {
        let args = match frame {
            OwnedFrame::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    OwnedFrame::BulkString(bytes) => Some(bytes),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            _ => return Some(error("ERR expected array")),
        };
        let Some(name) = args.first() else {
            return Some(error("ERR empty command"));
        };
        let command = String::from_utf8_lossy(name).to_uppercase();

        if command == "AUTH" {
            return Some(self.auth(&args));
        }
        if !self.authenticated {
            return Some(error("NOAUTH Authentication required."));
        }

        let key = args.get(1).map(|k| db_key(self.db, &String::from_utf8_lossy(k)));
        let reply = match (command.as_str(), key) {
            ("PING", _) => OwnedFrame::SimpleString(b"PONG".to_vec()),
            ("SELECT", _) => self.select(&args),
            ("CLIENT", _) => OwnedFrame::SimpleString(b"OK".to_vec()),
            ("LLEN", Some(key)) => match self.store.len(&key).await {
                Ok(n) => OwnedFrame::Integer(n as i64),
                Err(e) => error(&format!("ERR {}", e)),
            },
            ("RPUSH", Some(key)) if args.len() >= 3 => {
                for item in &args[2..] {
                    if let Err(e) = self.store.push_tail(&key, item).await {
                        return Some(error(&format!("ERR {}", e)));
                    }
                }
                match self.store.len(&key).await {
                    Ok(n) => OwnedFrame::Integer(n as i64),
                    Err(e) => error(&format!("ERR {}", e)),
                }
            }
            ("LPOP", Some(key)) => match self.store.pop_head(&key).await {
                Ok(Some(item)) => OwnedFrame::BulkString(item),
                Ok(None) => OwnedFrame::Null,
                Err(e) => error(&format!("ERR {}", e)),
            },
            ("BLPOP", Some(key)) if args.len() == 3 => {
                let timeout = match parse_timeout(&args[2]) {
                    Some(timeout) => timeout,
                    None => return Some(error("ERR timeout is not a float or out of range")),
                };
                tokio::select! {
                    popped = self.store.blocking_pop_head(&key, timeout) => match popped {
                        Ok(Some(item)) => OwnedFrame::Array(vec![
                            OwnedFrame::BulkString(args[1].clone()),
                            OwnedFrame::BulkString(item),
                        ]),
                        Ok(None) => OwnedFrame::Null,
                        Err(e) => error(&format!("ERR {}", e)),
                    },
                    _ = wait_for_disconnect(reader, buffer) => return None,
                }
            }
            ("DEL", Some(key)) => match self.store.delete(&key).await {
                Ok(existed) => OwnedFrame::Integer(existed as i64),
                Err(e) => error(&format!("ERR {}", e)),
            },
            _ => error(&format!(
                "ERR unknown command or wrong number of arguments for '{}'",
                command
            )),
        };
        Some(reply)
    }

    fn auth(&mut self, args: &[Vec<u8>]) -> OwnedFrame {
        let Some(expected) = &self.password else {
            return error("ERR AUTH <password> called without any password configured");
        };
        // AUTH <password> | AUTH <username> <password>
        let given = match args.len() {
            2 | 3 => &args[args.len() - 1],
            _ => return error("ERR wrong number of arguments for 'auth' command"),
        };
        if given.as_slice() == expected.as_bytes() {
            self.authenticated = true;
            OwnedFrame::SimpleString(b"OK".to_vec())
        } else {
            error("WRONGPASS invalid username-password pair or user is disabled.")
        }
    }

    fn select(&mut self, args: &[Vec<u8>]) -> OwnedFrame {
        let db = args
            .get(1)
            .and_then(|raw| String::from_utf8_lossy(raw).parse::<i64>().ok());
        match db {
            Some(db) if (0..16).contains(&db) => {
                self.db = db;
                OwnedFrame::SimpleString(b"OK".to_vec())
            }
            _ => error("ERR DB index is out of range"),
        }
    }
}

fn error(message: &str) -> OwnedFrame {
    OwnedFrame::Error(message.to_string())
}

/// `0` waits forever; anything else is seconds as a float
fn parse_timeout(raw: &[u8]) -> Option<Option<Duration>> {
    let secs: f64 = String::from_utf8_lossy(raw).parse().ok()?;
    if secs < 0.0 || !secs.is_finite() {
        return None;
    }
    if secs == 0.0 {
        Some(None)
    } else {
        Duration::try_from_secs_f64(secs).ok().map(Some)
    }
}

/// Resolves once the peer closes its side; bytes sent meanwhile are kept
async fn wait_for_disconnect(reader: &mut OwnedReadHalf, buffer: &mut BytesMut) {
    loop {
        match reader.read_buf(buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

fn encoded_len(frame: &OwnedFrame) -> usize {
    const HEADER: usize = 32;
    match frame {
        OwnedFrame::BulkString(bytes) | OwnedFrame::SimpleString(bytes) => bytes.len() + HEADER,
        OwnedFrame::Error(message) => message.len() + HEADER,
        OwnedFrame::Array(items) => HEADER + items.iter().map(encoded_len).sum::<usize>(),
        _ => HEADER,
    }
}

fn encode_frame(frame: &OwnedFrame) -> Vec<u8> {
    let mut out = vec![0u8; encoded_len(frame)];
    let written = encode(&mut out, frame).expect("encode reply");
    out.truncate(written);
    out
}
