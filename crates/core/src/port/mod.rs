// Port Layer - Interfaces for external dependencies

pub mod item_handler;
pub mod list_store;

// Re-exports
pub use item_handler::{HandlerError, ItemHandler};
pub use list_store::ListStore;
