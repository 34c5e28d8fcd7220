//! resgraph Core Model Layer
//!
//! This crate provides the property-graph resource models and the
//! brokering pipeline of a federated network testbed: sites author
//! aggregate resource models (ARMs), partition them into delegations
//! (ADMs), a broker merges delegations into one combined view (CBM) and
//! answers queries with read-only projections (BQMs).
//!
//! # Architecture
//!
//! - **GraphID partitioning**: every stored graph is an independent
//!   partition; nothing crosses graphs implicitly
//! - **NodeID identity**: the same logical resource carries the same
//!   NodeID in every model it appears in, which is what makes partition,
//!   merge and unmerge composable
//! - **Rules as data**: structural validation is a declarative rule list
//!   interpreted against any store backend
//! - **GraphML exchange**: models travel between sites and brokers as
//!   deterministic GraphML documents
//!
//! # Modules
//!
//! - [`models`] - graph elements, capacities, labels, slivers
//! - [`db`] - the `GraphStore` trait and the in-memory backend
//! - [`services`] - validation engine and the ARM→ADM→CBM→BQM pipeline
//! - [`utils`] - GraphML import/export

pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use db::*;
pub use models::*;
pub use services::*;
pub use utils::*;
