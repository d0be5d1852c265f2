// taskq Infrastructure - In-memory Adapter
// Implements: ListStore

mod list_store;

pub use list_store::MemoryStore;
