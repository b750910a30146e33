//! Infrastructure adapters for durable state.

pub mod store;
pub use store::FileStore;
pub use store::InMemoryStore;
