//! Database Layer
//!
//! Graph storage behind the `GraphStore` trait:
//!
//! - `GraphStore` — backend abstraction, every operation scoped by GraphID
//! - `MemoryStore` — the bundled in-memory backend
//! - `DatabaseError` — store-level failures
//!
//! Persistent backends (e.g. a property-graph database) are collaborators
//! implementing the same trait with identical semantics plus durability.

mod error;
mod graph_store;
mod memory_store;

pub use error::DatabaseError;
pub use graph_store::{GraphStore, NodeFilter, StoreCapabilities};
pub use memory_store::MemoryStore;
