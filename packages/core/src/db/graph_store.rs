//! GraphStore Trait - Backend Abstraction Layer
//!
//! This module defines the `GraphStore` trait that abstracts graph storage
//! for resgraph. The trait enables multiple backend implementations (the
//! bundled in-memory store, persistent property-graph databases) without
//! changing the validation engine or the transformation pipeline.
//!
//! # Architecture
//!
//! - **Partition key**: every operation is scoped by `graph_id`; two graphs
//!   with different ids never interact implicitly. This is what allows
//!   ADM/CBM independence and incremental merge/unmerge.
//! - **Async-First**: all methods are async to support both embedded and
//!   network backends.
//! - **No construction-time invariants**: nodes are an append-only sequence
//!   per graph and duplicate NodeIDs are representable. Graphs arrive from
//!   external authoring tools, so NodeID uniqueness is a *validation rule*,
//!   not a store guarantee.
//! - **Immediate visibility**: a mutation is visible to every subsequent
//!   read on the same store instance; no write buffering at the API.
//!
//! # Examples
//!
//! ```rust,no_run
//! use resgraph_core::db::{GraphStore, MemoryStore};
//! use resgraph_core::models::{GraphNode, NodeClass};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
//!     store.create_graph("site-arm").await?;
//!     store
//!         .add_node(
//!             "site-arm",
//!             GraphNode::new("n1", NodeClass::NetworkNode, "Server", "worker-1"),
//!         )
//!         .await?;
//!     let node = store.get_node("site-arm", "n1").await?;
//!     println!("found {}", node.name);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::models::{EdgeKind, GraphEdge, GraphNode, NodeClass};

use super::error::DatabaseError;

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Node filter for `find_nodes`: class/type/property equality, combined
/// with AND logic; `None` fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub class: Option<NodeClass>,
    pub type_name: Option<String>,
    pub property: Option<(String, String)>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: NodeClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.property = Some((key.into(), value.into()));
        self
    }

    pub fn matches(&self, node: &GraphNode) -> bool {
        if let Some(class) = self.class {
            if node.class != class {
                return false;
            }
        }
        if let Some(ref type_name) = self.type_name {
            if node.type_name != *type_name {
                return false;
            }
        }
        if let Some((ref key, ref value)) = self.property {
            if node.property(key) != Some(value.as_str()) {
                return false;
            }
        }
        true
    }
}

/// What a backend's query layer can express. Backends without adjacency
/// queries cause topological validation rules to be reported as
/// *unchecked*, never silently passed.
#[derive(Debug, Clone, Copy)]
pub struct StoreCapabilities {
    /// Backend can answer `neighbors` / edge-list queries.
    pub neighbor_queries: bool,
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self {
            neighbor_queries: true,
        }
    }
}

/// Abstraction layer for graph persistence, scoped by GraphID.
///
/// Implementations must be `Send + Sync`. All mutating operations must be
/// immediately visible to subsequent reads on the same instance; persistent
/// backends additionally guarantee durability across process restarts.
#[async_trait]
pub trait GraphStore: Send + Sync {
    //
    // GRAPH LIFECYCLE
    //

    /// Create an empty graph. Errors with `GraphExists` on id collision.
    async fn create_graph(&self, graph_id: &str) -> Result<()>;

    /// Does a graph with this id exist?
    async fn graph_exists(&self, graph_id: &str) -> Result<bool>;

    /// Ids of every stored graph, sorted.
    async fn list_graph_ids(&self) -> Result<Vec<String>>;

    /// Delete a graph and everything in it. Deleting an absent graph is a
    /// no-op (idempotent delete).
    async fn delete_graph(&self, graph_id: &str) -> Result<()>;

    /// Copy all nodes and edges of `graph_id` into a new graph
    /// `new_graph_id`. NodeIDs are preserved verbatim; identity must
    /// survive cloning for snapshot/rollback to work.
    async fn clone_graph(&self, graph_id: &str, new_graph_id: &str) -> Result<()>;

    //
    // NODE OPERATIONS
    //

    /// Append a node to the scoped graph. Duplicate NodeIDs are not
    /// rejected here; uniqueness is enforced by validation.
    async fn add_node(&self, graph_id: &str, node: GraphNode) -> Result<()>;

    /// First node carrying this NodeID, or `NodeNotFound`.
    async fn get_node(&self, graph_id: &str, node_id: &str) -> Result<GraphNode>;

    /// Delete a node; incident edges are deleted with it.
    async fn delete_node(&self, graph_id: &str, node_id: &str) -> Result<()>;

    /// Overwrite-merge properties onto a node (existing keys replaced,
    /// other keys untouched).
    async fn update_node_properties(
        &self,
        graph_id: &str,
        node_id: &str,
        props: Map<String, Value>,
    ) -> Result<()>;

    /// Replace a node's property bag wholesale; keys absent from `props`
    /// are removed. Attributes (NodeID, Class, Type, Name) are untouched.
    async fn replace_node_properties(
        &self,
        graph_id: &str,
        node_id: &str,
        props: Map<String, Value>,
    ) -> Result<()>;

    /// Nodes matching the filter, in insertion order.
    async fn find_nodes(&self, graph_id: &str, filter: &NodeFilter) -> Result<Vec<GraphNode>>;

    /// All nodes of the scoped graph, in insertion order.
    async fn list_nodes(&self, graph_id: &str) -> Result<Vec<GraphNode>>;

    /// All NodeID properties of the scoped graph (duplicates included).
    async fn list_node_ids(&self, graph_id: &str) -> Result<Vec<String>>;

    //
    // EDGE OPERATIONS
    //

    /// Add an edge. Both endpoints must already exist in the scoped graph;
    /// adding an edge with an identity that already exists overwrites its
    /// properties.
    async fn add_edge(&self, graph_id: &str, edge: GraphEdge) -> Result<()>;

    /// All edges of the scoped graph.
    async fn list_edges(&self, graph_id: &str) -> Result<Vec<GraphEdge>>;

    /// Delete the edge with this identity, if present (idempotent).
    async fn delete_edge(&self, graph_id: &str, a: &str, b: &str, kind: EdgeKind) -> Result<()>;

    /// Neighbor nodes of `node_id`, optionally restricted to one edge kind.
    /// Traversal is undirected; callers that care about `has` ownership
    /// direction inspect the edge list.
    async fn neighbors(
        &self,
        graph_id: &str,
        node_id: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<GraphNode>>;

    //
    // CAPABILITIES
    //

    /// Query expressiveness of this backend.
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}
