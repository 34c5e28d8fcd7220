//! Data Models
//!
//! Core data structures used throughout resgraph:
//!
//! - `GraphNode` / `GraphEdge` — typed property-graph elements
//! - `Capacities` / `Labels` — JSON-encoded composite properties
//! - `TimeWindow` / `CapacityDelta` — the reservation collaborator contract
//! - `StructuralInfo` — CBM provenance bookkeeping
//! - sliver types — typed views of provisionable resources
//!
//! All graph-borne data uses string-encoded JSON for composite properties,
//! matching the GraphML exchange format the models round-trip through.

mod capacity;
mod node;
mod sliver;

pub use capacity::{Capacities, CapacityDelta, Labels, StructuralInfo, TimeWindow};
pub use node::{
    connects_pair_allowed, has_pair_allowed, prop, EdgeKind, GraphEdge, GraphNode, NodeClass,
    CONNECTS_PAIRS, HAS_PAIRS, JSON_PROPERTY_NAMES,
};
pub use sliver::{ComponentSliver, ConnectionPointSliver, NodeSliver, ServiceSliver};
