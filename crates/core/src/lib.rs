// taskq Core - Queue contract & Ports
// NO infrastructure dependencies: stores are injected through port::ListStore

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{Consumer, Queue};
pub use domain::{Item, QueueKey};
pub use error::{QueueError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
