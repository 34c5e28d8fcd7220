//! ARM Partitioning
//!
//! Splits an aggregate resource model into per-delegation ADM graphs. The
//! partition key is the `delegation` node property: each distinct tag seeds
//! one ADM. Untagged nodes (ports, links, glue) replicate into every ADM
//! reachable from its tagged seed, carrying the same NodeID, which is what
//! lets the broker later merge the delegations back into one view. An edge
//! lands in an ADM iff both its endpoints did.
//!
//! Every produced ADM is validated before it is considered publishable;
//! an ADM that fails validation is deleted and the failure surfaced.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::db::GraphStore;
use crate::models::prop;

use super::error::ModelError;
use super::validation::{resource_rules, ValidationEngine};

/// One delegation's partition of an ARM.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmGraph {
    /// GraphID of the freshly created ADM.
    pub graph_id: String,
    /// The delegation tag this ADM carries.
    pub delegation: String,
}

/// Partitions ARM graphs into ADMs.
pub struct ArmPartitioner {
    store: Arc<dyn GraphStore>,
}

impl ArmPartitioner {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Partition `arm_id` by delegation tag. Returns one `AdmGraph` per
    /// distinct tag, in tag order. The ARM itself is left untouched. The
    /// step's output is all-or-nothing: if any delegation fails to
    /// materialize or validate, every ADM this call created is deleted
    /// before the error is surfaced.
    pub async fn partition(&self, arm_id: &str) -> Result<Vec<AdmGraph>, ModelError> {
        let mut adms = Vec::new();
        if let Err(e) = self.build_partitions(arm_id, &mut adms).await {
            for adm in &adms {
                self.store.delete_graph(&adm.graph_id).await?;
            }
            return Err(e);
        }
        Ok(adms)
    }

    async fn build_partitions(
        &self,
        arm_id: &str,
        adms: &mut Vec<AdmGraph>,
    ) -> Result<(), ModelError> {
        let nodes = self.store.list_nodes(arm_id).await?;
        let edges = self.store.list_edges(arm_id).await?;

        // tag -> seed NodeIDs, ordered so output is deterministic
        let mut seeds: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &nodes {
            if let Some(tag) = node.property(prop::DELEGATION) {
                seeds.entry(tag.to_string()).or_default().push(node.id.clone());
            }
        }

        let validator = ValidationEngine::new(self.store.clone());
        let rules = resource_rules();

        for (delegation, seed) in seeds {
            // untagged-neighbor closure from this delegation's seed
            let mut member: HashSet<String> = seed.iter().cloned().collect();
            let mut frontier: VecDeque<String> = seed.into_iter().collect();
            while let Some(node_id) = frontier.pop_front() {
                for edge in edges.iter().filter(|e| e.touches(&node_id)) {
                    let other = match edge.other_endpoint(&node_id) {
                        Some(id) => id,
                        None => continue,
                    };
                    if member.contains(other) {
                        continue;
                    }
                    let tagged = nodes
                        .iter()
                        .find(|n| n.id == *other)
                        .and_then(|n| n.property(prop::DELEGATION))
                        .is_some();
                    if !tagged {
                        member.insert(other.to_string());
                        frontier.push_back(other.to_string());
                    }
                }
            }

            let adm_id = format!("adm-{}", Uuid::new_v4());
            self.store.create_graph(&adm_id).await?;
            // registered before any further fallible work so the caller's
            // cleanup sweep covers a half-built ADM too
            adms.push(AdmGraph {
                graph_id: adm_id.clone(),
                delegation,
            });
            self.materialize(&adm_id, &member, &nodes, &edges).await?;
            validator.expect_valid(&adm_id, &rules).await?;

            info!(arm_id, adm_id, nodes = member.len(), "partitioned delegation");
        }
        Ok(())
    }

    async fn materialize(
        &self,
        adm_id: &str,
        member: &HashSet<String>,
        nodes: &[crate::models::GraphNode],
        edges: &[crate::models::GraphEdge],
    ) -> Result<(), ModelError> {
        for node in nodes.iter().filter(|n| member.contains(&n.id)) {
            self.store.add_node(adm_id, node.clone()).await?;
        }
        for edge in edges
            .iter()
            .filter(|e| member.contains(&e.a) && member.contains(&e.b))
        {
            self.store.add_edge(adm_id, edge.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{EdgeKind, GraphEdge, GraphNode, NodeClass};

    /// Two tagged servers sharing an untagged link fabric:
    /// srv-a —has→ nic-a —has→ cp-a —connects— link —connects— cp-b ←has— nic-b ←has— srv-b
    async fn two_delegation_arm() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_graph("arm").await.unwrap();
        for (id, tag) in [("srv-a", "del-a"), ("srv-b", "del-b")] {
            store
                .add_node(
                    "arm",
                    GraphNode::new(id, NodeClass::NetworkNode, "Server", id)
                        .with_property(prop::DELEGATION, tag),
                )
                .await
                .unwrap();
        }
        for (nic, srv, tag) in [("nic-a", "srv-a", "del-a"), ("nic-b", "srv-b", "del-b")] {
            store
                .add_node(
                    "arm",
                    GraphNode::new(nic, NodeClass::Component, "SmartNIC", nic)
                        .with_property(prop::DELEGATION, tag),
                )
                .await
                .unwrap();
            store
                .add_edge("arm", GraphEdge::new(srv, nic, EdgeKind::Has))
                .await
                .unwrap();
        }
        for (cp, nic) in [("cp-a", "nic-a"), ("cp-b", "nic-b")] {
            store
                .add_node(
                    "arm",
                    GraphNode::new(cp, NodeClass::ConnectionPoint, "TrunkPort", cp),
                )
                .await
                .unwrap();
            store
                .add_edge("arm", GraphEdge::new(nic, cp, EdgeKind::Has))
                .await
                .unwrap();
        }
        store
            .add_node("arm", GraphNode::new("link", NodeClass::Link, "DAC", "link"))
            .await
            .unwrap();
        store
            .add_edge("arm", GraphEdge::new("cp-a", "link", EdgeKind::Connects))
            .await
            .unwrap();
        store
            .add_edge("arm", GraphEdge::new("cp-b", "link", EdgeKind::Connects))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_partition_by_delegation_tag() {
        let store = two_delegation_arm().await;
        let partitioner = ArmPartitioner::new(store.clone());
        let adms = partitioner.partition("arm").await.unwrap();

        assert_eq!(adms.len(), 2);
        assert_eq!(adms[0].delegation, "del-a");
        assert_eq!(adms[1].delegation, "del-b");

        // del-a closure: srv-a, nic-a, cp-a plus the untagged link and the
        // far cp (reached through the link). srv-b/nic-b are tagged del-b
        // and stay out.
        let ids = store.list_node_ids(&adms[0].graph_id).await.unwrap();
        let ids: std::collections::HashSet<_> = ids.into_iter().collect();
        assert!(ids.contains("srv-a"));
        assert!(ids.contains("link"));
        assert!(ids.contains("cp-b"));
        assert!(!ids.contains("srv-b"));
        assert!(!ids.contains("nic-b"));
    }

    #[tokio::test]
    async fn test_replicated_nodes_keep_node_ids() {
        let store = two_delegation_arm().await;
        let partitioner = ArmPartitioner::new(store.clone());
        let adms = partitioner.partition("arm").await.unwrap();

        for adm in &adms {
            let ids = store.list_node_ids(&adm.graph_id).await.unwrap();
            assert!(ids.contains(&"link".to_string()));
        }
    }

    #[tokio::test]
    async fn test_edges_need_both_endpoints() {
        let store = two_delegation_arm().await;
        let partitioner = ArmPartitioner::new(store.clone());
        let adms = partitioner.partition("arm").await.unwrap();

        // nic-b never entered del-a's ADM, so neither did its edges
        let edges = store.list_edges(&adms[0].graph_id).await.unwrap();
        assert!(edges
            .iter()
            .all(|e| !(e.a == "srv-b" || e.b == "srv-b")));
    }

    #[tokio::test]
    async fn test_failed_partition_discards_all_output() {
        let store = two_delegation_arm().await;
        // del-a partitions clean; del-b carries an out-of-vocabulary node
        // and fails validation after del-a's ADM already exists
        store
            .add_node(
                "arm",
                GraphNode::new("srv-x", NodeClass::NetworkNode, "Mainframe", "srv-x")
                    .with_property(prop::DELEGATION, "del-b"),
            )
            .await
            .unwrap();

        let partitioner = ArmPartitioner::new(store.clone());
        let err = partitioner.partition("arm").await.unwrap_err();
        assert!(matches!(err, ModelError::ValidationFailed(_)));
        // no ADM survives, not even the one that validated clean
        assert_eq!(store.list_graph_ids().await.unwrap(), vec!["arm".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_partition_is_discarded() {
        let store = two_delegation_arm().await;
        // orphan a component in del-a by tagging its owner into del-b
        store
            .update_node_properties("arm", "srv-a", {
                let mut props = serde_json::Map::new();
                props.insert(
                    prop::DELEGATION.into(),
                    serde_json::Value::String("del-b".into()),
                );
                props
            })
            .await
            .unwrap();

        let partitioner = ArmPartitioner::new(store.clone());
        let err = partitioner.partition("arm").await.unwrap_err();
        assert!(matches!(err, ModelError::ValidationFailed(_)));
    }
}
