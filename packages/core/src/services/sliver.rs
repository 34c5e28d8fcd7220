//! Sliver Projection
//!
//! Projects a NetworkNode subtree out of a graph into the typed
//! [`NodeSliver`] view: the node itself, its owned Components with their
//! ConnectionPoints, and the NetworkServices attached to it. Projection
//! re-checks the structure it walks instead of trusting earlier
//! validation; a hole found here is an `IntegrityError`, a property that
//! will not decode is a `SchemaError`.

use std::sync::Arc;

use tracing::debug;

use crate::db::{GraphStore, NodeFilter};
use crate::models::{
    prop, Capacities, ComponentSliver, ConnectionPointSliver, EdgeKind, GraphNode, Labels,
    NodeClass, NodeSliver, ServiceSliver,
};

use super::error::ModelError;

/// Builds typed sliver views from stored graphs.
pub struct SliverProjector {
    store: Arc<dyn GraphStore>,
}

impl SliverProjector {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Deep projection of one NetworkNode.
    pub async fn project_node(
        &self,
        graph_id: &str,
        node_id: &str,
    ) -> Result<NodeSliver, ModelError> {
        let node = self.store.get_node(graph_id, node_id).await?;
        if node.class != NodeClass::NetworkNode {
            return Err(ModelError::integrity_error(
                node_id,
                format!("expected a NetworkNode, found {}", node.class),
            ));
        }

        let capacities = decode_capacities(&node)?;
        let labels = decode_labels(&node)?;

        let mut sliver = NodeSliver {
            node_id: node.id.clone(),
            name: node.name.clone(),
            type_name: node.type_name.clone(),
            site: node.property(prop::SITE).map(str::to_string),
            capacities,
            labels,
            components: Vec::new(),
            services: Vec::new(),
        };

        for owned in self.owned_by(graph_id, node_id).await? {
            match owned.class {
                NodeClass::Component => {
                    let component = self.project_component(graph_id, &owned).await?;
                    sliver.components.push(component);
                }
                NodeClass::NetworkService => {
                    let service = self.project_service(graph_id, &owned).await?;
                    sliver.services.push(service);
                }
                other => {
                    return Err(ModelError::integrity_error(
                        &owned.id,
                        format!("NetworkNode {node_id} owns a {other}, which it may not"),
                    ));
                }
            }
        }

        debug!(
            graph_id,
            node_id,
            components = sliver.components.len(),
            services = sliver.services.len(),
            "projected node sliver"
        );
        Ok(sliver)
    }

    /// Project every NetworkNode in the graph. The sweep the BQM
    /// aggregation runs over a broker view.
    pub async fn project_all(&self, graph_id: &str) -> Result<Vec<NodeSliver>, ModelError> {
        let nodes = self
            .store
            .find_nodes(graph_id, &NodeFilter::new().with_class(NodeClass::NetworkNode))
            .await?;
        let mut slivers = Vec::with_capacity(nodes.len());
        for node in nodes {
            slivers.push(self.project_node(graph_id, &node.id).await?);
        }
        Ok(slivers)
    }

    async fn project_component(
        &self,
        graph_id: &str,
        component: &GraphNode,
    ) -> Result<ComponentSliver, ModelError> {
        let mut out = ComponentSliver {
            node_id: component.id.clone(),
            name: component.name.clone(),
            type_name: component.type_name.clone(),
            model: component.property(prop::MODEL).map(str::to_string),
            capacities: decode_capacities(component)?,
            connection_points: Vec::new(),
        };
        for owned in self.owned_by(graph_id, &component.id).await? {
            if owned.class != NodeClass::ConnectionPoint {
                return Err(ModelError::integrity_error(
                    &owned.id,
                    format!(
                        "Component {} owns a {}, which it may not",
                        component.id, owned.class
                    ),
                ));
            }
            out.connection_points.push(ConnectionPointSliver {
                node_id: owned.id.clone(),
                name: owned.name.clone(),
                type_name: owned.type_name.clone(),
                labels: decode_labels(&owned)?,
                capacities: decode_capacities(&owned)?,
            });
        }
        Ok(out)
    }

    async fn project_service(
        &self,
        graph_id: &str,
        service: &GraphNode,
    ) -> Result<ServiceSliver, ModelError> {
        let mut out = ServiceSliver {
            node_id: service.id.clone(),
            name: service.name.clone(),
            type_name: service.type_name.clone(),
            connection_point_ids: Vec::new(),
        };
        for peer in self
            .store
            .neighbors(graph_id, &service.id, Some(EdgeKind::Connects))
            .await?
        {
            if peer.class != NodeClass::ConnectionPoint {
                return Err(ModelError::integrity_error(
                    &peer.id,
                    format!(
                        "NetworkService {} connects to a {}, which it may not",
                        service.id, peer.class
                    ),
                ));
            }
            out.connection_point_ids.push(peer.id);
        }
        Ok(out)
    }

    /// Nodes owned by `owner_id` (outgoing `has` edges only).
    async fn owned_by(&self, graph_id: &str, owner_id: &str) -> Result<Vec<GraphNode>, ModelError> {
        let edges = self.store.list_edges(graph_id).await?;
        let mut owned = Vec::new();
        for edge in edges {
            if edge.kind == EdgeKind::Has && edge.a == owner_id {
                owned.push(self.store.get_node(graph_id, &edge.b).await?);
            }
        }
        Ok(owned)
    }
}

fn decode_capacities(node: &GraphNode) -> Result<Capacities, ModelError> {
    node.json_property::<Capacities>(prop::CAPACITIES)
        .map(Option::unwrap_or_default)
        .map_err(|e| ModelError::schema_error(&node.id, prop::CAPACITIES, e.to_string()))
}

fn decode_labels(node: &GraphNode) -> Result<Labels, ModelError> {
    node.json_property::<Labels>(prop::LABELS)
        .map(Option::unwrap_or_default)
        .map_err(|e| ModelError::schema_error(&node.id, prop::LABELS, e.to_string()))
}
