//! In-Memory Graph Store
//!
//! The bundled `GraphStore` backend: graphs held in a `HashMap` keyed by
//! GraphID behind a `tokio::sync::RwLock`. Nodes are an append-only
//! sequence per graph, so externally-authored graphs with duplicate
//! NodeIDs are representable and left for the validation engine to report.
//!
//! Persistent backends implement the same trait; nothing above the trait
//! knows which one it is talking to.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{EdgeKind, GraphEdge, GraphNode};

use super::error::DatabaseError;
use super::graph_store::{GraphStore, NodeFilter, Result};

#[derive(Debug, Default, Clone)]
struct StoredGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl StoredGraph {
    fn find_node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    fn find_node_mut(&mut self, node_id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }
}

/// In-memory `GraphStore` backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: RwLock<HashMap<String, StoredGraph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn create_graph(&self, graph_id: &str) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        if graphs.contains_key(graph_id) {
            return Err(DatabaseError::graph_exists(graph_id));
        }
        debug!(graph_id, "creating graph");
        graphs.insert(graph_id.to_string(), StoredGraph::default());
        Ok(())
    }

    async fn graph_exists(&self, graph_id: &str) -> Result<bool> {
        Ok(self.graphs.read().await.contains_key(graph_id))
    }

    async fn list_graph_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_graph(&self, graph_id: &str) -> Result<()> {
        self.graphs.write().await.remove(graph_id);
        Ok(())
    }

    async fn clone_graph(&self, graph_id: &str, new_graph_id: &str) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        if graphs.contains_key(new_graph_id) {
            return Err(DatabaseError::graph_exists(new_graph_id));
        }
        let copy = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?
            .clone();
        graphs.insert(new_graph_id.to_string(), copy);
        Ok(())
    }

    async fn add_node(&self, graph_id: &str, node: GraphNode) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        graph.nodes.push(node);
        Ok(())
    }

    async fn get_node(&self, graph_id: &str, node_id: &str) -> Result<GraphNode> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        graph
            .find_node(node_id)
            .cloned()
            .ok_or_else(|| DatabaseError::node_not_found(graph_id, node_id))
    }

    async fn delete_node(&self, graph_id: &str, node_id: &str) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        let before = graph.nodes.len();
        graph.nodes.retain(|n| n.id != node_id);
        if graph.nodes.len() == before {
            return Err(DatabaseError::node_not_found(graph_id, node_id));
        }
        // incident edges go with the node
        graph.edges.retain(|e| !e.touches(node_id));
        Ok(())
    }

    async fn update_node_properties(
        &self,
        graph_id: &str,
        node_id: &str,
        props: Map<String, Value>,
    ) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        let node = graph
            .find_node_mut(node_id)
            .ok_or_else(|| DatabaseError::node_not_found(graph_id, node_id))?;
        for (k, v) in props {
            node.properties.insert(k, v);
        }
        Ok(())
    }

    async fn replace_node_properties(
        &self,
        graph_id: &str,
        node_id: &str,
        props: Map<String, Value>,
    ) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        let node = graph
            .find_node_mut(node_id)
            .ok_or_else(|| DatabaseError::node_not_found(graph_id, node_id))?;
        node.properties = props;
        Ok(())
    }

    async fn find_nodes(&self, graph_id: &str, filter: &NodeFilter) -> Result<Vec<GraphNode>> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        Ok(graph
            .nodes
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self, graph_id: &str) -> Result<Vec<GraphNode>> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        Ok(graph.nodes.clone())
    }

    async fn list_node_ids(&self, graph_id: &str) -> Result<Vec<String>> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        Ok(graph.nodes.iter().map(|n| n.id.clone()).collect())
    }

    async fn add_edge(&self, graph_id: &str, edge: GraphEdge) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        if graph.find_node(&edge.a).is_none() {
            return Err(DatabaseError::edge_endpoint_missing(graph_id, &edge.a));
        }
        if graph.find_node(&edge.b).is_none() {
            return Err(DatabaseError::edge_endpoint_missing(graph_id, &edge.b));
        }
        if let Some(existing) = graph
            .edges
            .iter_mut()
            .find(|e| e.same_identity(&edge.a, &edge.b, edge.kind))
        {
            // same identity: overwrite properties, keep the stored endpoints
            existing.properties = edge.properties;
            return Ok(());
        }
        graph.edges.push(edge);
        Ok(())
    }

    async fn list_edges(&self, graph_id: &str) -> Result<Vec<GraphEdge>> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        Ok(graph.edges.clone())
    }

    async fn delete_edge(&self, graph_id: &str, a: &str, b: &str, kind: EdgeKind) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        let graph = graphs
            .get_mut(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        graph.edges.retain(|e| !e.same_identity(a, b, kind));
        Ok(())
    }

    async fn neighbors(
        &self,
        graph_id: &str,
        node_id: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<GraphNode>> {
        let graphs = self.graphs.read().await;
        let graph = graphs
            .get(graph_id)
            .ok_or_else(|| DatabaseError::graph_not_found(graph_id))?;
        if graph.find_node(node_id).is_none() {
            return Err(DatabaseError::node_not_found(graph_id, node_id));
        }
        let mut out = Vec::new();
        for edge in &graph.edges {
            if let Some(k) = kind {
                if edge.kind != k {
                    continue;
                }
            }
            if let Some(other) = edge.other_endpoint(node_id) {
                if let Some(node) = graph.find_node(other) {
                    out.push(node.clone());
                }
            }
        }
        Ok(out)
    }
}
