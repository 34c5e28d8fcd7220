//! Database Layer Error Types

use thiserror::Error;

/// Errors surfaced by a graph store backend.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// No graph with this GraphID exists
    #[error("Graph not found: {graph_id}")]
    GraphNotFound { graph_id: String },

    /// A graph with this GraphID already exists
    #[error("Graph already exists: {graph_id}")]
    GraphExists { graph_id: String },

    /// No node with this NodeID exists in the scoped graph
    #[error("Node not found: {node_id} in graph {graph_id}")]
    NodeNotFound { graph_id: String, node_id: String },

    /// An edge endpoint references a NodeID absent from the scoped graph
    #[error("Edge endpoint missing: {node_id} in graph {graph_id}")]
    EdgeEndpointMissing { graph_id: String, node_id: String },

    /// Backend-specific failure (I/O, connection, transaction)
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DatabaseError {
    pub fn graph_not_found(graph_id: impl Into<String>) -> Self {
        Self::GraphNotFound {
            graph_id: graph_id.into(),
        }
    }

    pub fn graph_exists(graph_id: impl Into<String>) -> Self {
        Self::GraphExists {
            graph_id: graph_id.into(),
        }
    }

    pub fn node_not_found(graph_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            graph_id: graph_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn edge_endpoint_missing(graph_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::EdgeEndpointMissing {
            graph_id: graph_id.into(),
            node_id: node_id.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
