//! Typed Sliver Views
//!
//! A sliver is the typed, decoded view of a provisionable resource derived
//! from a graph subtree: a NetworkNode with its owned components, their
//! connection points, and the services attached to them. Slivers are what
//! the BQM projector aggregates and what an orchestrator hands to
//! provisioning.

use serde::{Deserialize, Serialize};

use super::capacity::{Capacities, Labels};

/// Connection point of a component or service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPointSliver {
    pub node_id: String,
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub capacities: Capacities,
}

/// Component owned by a network node (NIC, GPU, storage, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSliver {
    pub node_id: String,
    pub name: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub capacities: Capacities,
    #[serde(default)]
    pub connection_points: Vec<ConnectionPointSliver>,
}

/// Network service owned by a node, with the connection points it binds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSliver {
    pub node_id: String,
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub connection_point_ids: Vec<String>,
}

/// Deep view of one NetworkNode subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSliver {
    pub node_id: String,
    pub name: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default)]
    pub capacities: Capacities,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub components: Vec<ComponentSliver>,
    #[serde(default)]
    pub services: Vec<ServiceSliver>,
}

impl NodeSliver {
    /// All connection point ids reachable through owned components.
    pub fn component_connection_point_ids(&self) -> Vec<&str> {
        self.components
            .iter()
            .flat_map(|c| c.connection_points.iter().map(|cp| cp.node_id.as_str()))
            .collect()
    }
}
