//! BQM Projection
//!
//! Answers broker queries by projecting a read-only BQM graph out of the
//! combined broker model. The CBM itself is never handed out: every query
//! materializes a fresh graph, validated before it is returned, that the
//! caller owns and may delete.
//!
//! Reservation state comes from a collaborator behind the
//! [`ReservationProvider`] trait. The contract is capacity subtraction
//! only: the provider reports per-NodeID `CapacityDelta` claims and this
//! module does the arithmetic; scheduling policy lives elsewhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::GraphStore;
use crate::models::{
    prop, Capacities, CapacityDelta, EdgeKind, GraphEdge, GraphNode, NodeClass, NodeSliver,
    TimeWindow,
};

use super::error::ModelError;
use super::sliver::SliverProjector;
use super::validation::{base_rules, ValidationEngine};

/// How much structure a BQM carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailLevel {
    /// One synthesized CompositeNode per site with rolled-up components.
    #[default]
    Aggregate,
    /// Per-node structure: NetworkNodes, Components, ConnectionPoints.
    Full,
}

/// A broker query against a CBM.
#[derive(Debug, Clone, Default)]
pub struct BqmQuery {
    /// `Some` asks about a time range: allocations are summed over
    /// overlapping reservations. `None` asks for the standing picture with
    /// the future reservation calendar attached.
    pub window: Option<TimeWindow>,
    pub detail: DetailLevel,
}

/// Source of reservation claims, keyed by NodeID. External collaborator;
/// the bundled [`NoReservations`] answers for a broker with no calendar.
#[async_trait]
pub trait ReservationProvider: Send + Sync {
    async fn deltas(&self, node_id: &str) -> anyhow::Result<Vec<CapacityDelta>>;
}

/// Provider for deployments without a reservation system.
pub struct NoReservations;

#[async_trait]
impl ReservationProvider for NoReservations {
    async fn deltas(&self, _node_id: &str) -> anyhow::Result<Vec<CapacityDelta>> {
        Ok(Vec::new())
    }
}

/// Projects query-scoped BQM graphs from a CBM.
pub struct BqmProjector {
    store: Arc<dyn GraphStore>,
    reservations: Arc<dyn ReservationProvider>,
}

impl BqmProjector {
    pub fn new(store: Arc<dyn GraphStore>, reservations: Arc<dyn ReservationProvider>) -> Self {
        Self {
            store,
            reservations,
        }
    }

    /// Run a query against `cbm_id`. Returns the GraphID of the freshly
    /// materialized BQM; the caller owns it.
    pub async fn query(&self, cbm_id: &str, query: &BqmQuery) -> Result<String, ModelError> {
        let slivers = SliverProjector::new(self.store.clone())
            .project_all(cbm_id)
            .await?;

        let bqm_id = format!("bqm-{}", Uuid::new_v4());
        self.store.create_graph(&bqm_id).await?;

        let result = match query.detail {
            DetailLevel::Aggregate => self.build_aggregate(&bqm_id, &slivers, query).await,
            DetailLevel::Full => self.build_full(&bqm_id, &slivers, query).await,
        };
        if let Err(e) = result {
            self.store.delete_graph(&bqm_id).await?;
            return Err(e);
        }

        let validator = ValidationEngine::new(self.store.clone());
        if let Err(e) = validator.expect_valid(&bqm_id, &base_rules()).await {
            self.store.delete_graph(&bqm_id).await?;
            return Err(e);
        }

        info!(cbm_id, bqm_id, detail = ?query.detail, "materialized query model");
        Ok(bqm_id)
    }

    /// Allocation picture for one NodeID under this query.
    async fn allocation(
        &self,
        node_id: &str,
        query: &BqmQuery,
    ) -> Result<Allocation, ModelError> {
        let deltas = self
            .reservations
            .deltas(node_id)
            .await
            .map_err(ModelError::Reservation)?;
        match query.window {
            Some(window) => {
                let mut allocated = Capacities::default();
                for delta in deltas.iter().filter(|d| d.window().overlaps(&window)) {
                    allocated = allocated + delta.capacities;
                }
                Ok(Allocation::Claimed(allocated))
            }
            None => {
                let now = Utc::now();
                let mut calendar: Vec<CapacityDelta> =
                    deltas.into_iter().filter(|d| d.end > now).collect();
                calendar.sort_by_key(|d| d.start);
                Ok(Allocation::Calendar(calendar))
            }
        }
    }

    async fn build_full(
        &self,
        bqm_id: &str,
        slivers: &[NodeSliver],
        query: &BqmQuery,
    ) -> Result<(), ModelError> {
        for sliver in slivers {
            let mut node = GraphNode::new(
                &sliver.node_id,
                NodeClass::NetworkNode,
                &sliver.type_name,
                &sliver.name,
            );
            if let Some(site) = &sliver.site {
                node = node.with_property(prop::SITE, site);
            }
            set_json(&mut node, prop::CAPACITIES, &sliver.capacities)?;
            if !sliver.labels.is_empty() {
                set_json(&mut node, prop::LABELS, &sliver.labels)?;
            }
            self.allocation(&sliver.node_id, query)
                .await?
                .attach(&mut node)?;
            self.store.add_node(bqm_id, node).await?;

            for component in &sliver.components {
                let mut cnode = GraphNode::new(
                    &component.node_id,
                    NodeClass::Component,
                    &component.type_name,
                    &component.name,
                );
                if let Some(model) = &component.model {
                    cnode = cnode.with_property(prop::MODEL, model);
                }
                set_json(&mut cnode, prop::CAPACITIES, &component.capacities)?;
                self.store.add_node(bqm_id, cnode).await?;
                self.store
                    .add_edge(
                        bqm_id,
                        GraphEdge::new(&sliver.node_id, &component.node_id, EdgeKind::Has),
                    )
                    .await?;

                for cp in &component.connection_points {
                    let mut pnode = GraphNode::new(
                        &cp.node_id,
                        NodeClass::ConnectionPoint,
                        &cp.type_name,
                        &cp.name,
                    );
                    if !cp.labels.is_empty() {
                        set_json(&mut pnode, prop::LABELS, &cp.labels)?;
                    }
                    self.store.add_node(bqm_id, pnode).await?;
                    self.store
                        .add_edge(
                            bqm_id,
                            GraphEdge::new(&component.node_id, &cp.node_id, EdgeKind::Has),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn build_aggregate(
        &self,
        bqm_id: &str,
        slivers: &[NodeSliver],
        query: &BqmQuery,
    ) -> Result<(), ModelError> {
        // site -> member slivers, ordered for deterministic output
        let mut sites: BTreeMap<String, Vec<&NodeSliver>> = BTreeMap::new();
        for sliver in slivers {
            // a siteless node aggregates alone rather than pooling silently
            let site = sliver.site.clone().unwrap_or_else(|| sliver.node_id.clone());
            sites.entry(site).or_default().push(sliver);
        }

        for (site, members) in sites {
            let mut total = Capacities::default();
            let mut allocated = Capacities::default();
            let mut calendar: Vec<CapacityDelta> = Vec::new();
            // (type, model) -> (count, capacities)
            let mut component_rollup: BTreeMap<(String, String), (i64, Capacities)> =
                BTreeMap::new();

            for sliver in &members {
                total = total + sliver.capacities;
                match self.allocation(&sliver.node_id, query).await? {
                    Allocation::Claimed(claim) => allocated = allocated + claim,
                    Allocation::Calendar(mut deltas) => calendar.append(&mut deltas),
                }
                for component in &sliver.components {
                    let key = (
                        component.type_name.clone(),
                        component.model.clone().unwrap_or_default(),
                    );
                    let entry = component_rollup.entry(key).or_default();
                    entry.0 += 1;
                    entry.1 = entry.1 + component.capacities;
                }
            }

            let site_node_id = Uuid::new_v4().to_string();
            let mut site_node = GraphNode::new(&site_node_id, NodeClass::CompositeNode, "Site", &site)
                .with_property(prop::SITE, &site);
            set_json(&mut site_node, prop::CAPACITIES, &total)?;
            if query.window.is_some() {
                set_json(&mut site_node, prop::CAPACITY_ALLOCATIONS, &allocated)?;
            } else if !calendar.is_empty() {
                calendar.sort_by_key(|d| d.start);
                set_json(&mut site_node, prop::ALLOCATION_CALENDAR, &calendar)?;
            }
            self.store.add_node(bqm_id, site_node).await?;

            for ((type_name, model), (count, capacities)) in component_rollup {
                let component_id = Uuid::new_v4().to_string();
                let name = if model.is_empty() {
                    format!("{site}-{type_name}")
                } else {
                    format!("{site}-{type_name}-{model}")
                };
                let mut cnode =
                    GraphNode::new(&component_id, NodeClass::Component, &type_name, name);
                if !model.is_empty() {
                    cnode = cnode.with_property(prop::MODEL, &model);
                }
                set_json(&mut cnode, prop::CAPACITIES, &capacities.with_unit(count))?;
                self.store.add_node(bqm_id, cnode).await?;
                self.store
                    .add_edge(
                        bqm_id,
                        GraphEdge::new(&site_node_id, &component_id, EdgeKind::Has),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

enum Allocation {
    Claimed(Capacities),
    Calendar(Vec<CapacityDelta>),
}

impl Allocation {
    fn attach(self, node: &mut GraphNode) -> Result<(), ModelError> {
        match self {
            Allocation::Claimed(claim) => set_json(node, prop::CAPACITY_ALLOCATIONS, &claim),
            Allocation::Calendar(calendar) => {
                if calendar.is_empty() {
                    Ok(())
                } else {
                    set_json(node, prop::ALLOCATION_CALENDAR, &calendar)
                }
            }
        }
    }
}

fn set_json<T: serde::Serialize>(
    node: &mut GraphNode,
    key: &str,
    value: &T,
) -> Result<(), ModelError> {
    let id = node.id.clone();
    node.set_json_property(key, value)
        .map_err(|e| ModelError::schema_error(id, key, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    struct FixedReservations(HashMap<String, Vec<CapacityDelta>>);

    #[async_trait]
    impl ReservationProvider for FixedReservations {
        async fn deltas(&self, node_id: &str) -> anyhow::Result<Vec<CapacityDelta>> {
            Ok(self.0.get(node_id).cloned().unwrap_or_default())
        }
    }

    async fn broker_view() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_graph("cbm").await.unwrap();
        for (id, site, cores) in [("srv-1", "RENC", 32), ("srv-2", "RENC", 32), ("srv-3", "UKY", 16)]
        {
            let mut node = GraphNode::new(id, NodeClass::NetworkNode, "Server", id)
                .with_property(prop::SITE, site);
            node.set_json_property(prop::CAPACITIES, &Capacities::new().with_core(cores))
                .unwrap();
            store.add_node("cbm", node).await.unwrap();
        }
        for (nic, srv) in [("nic-1", "srv-1"), ("nic-2", "srv-2")] {
            let mut node = GraphNode::new(nic, NodeClass::Component, "SmartNIC", nic)
                .with_property(prop::MODEL, "ConnectX-6");
            node.set_json_property(prop::CAPACITIES, &Capacities::new().with_bw(100))
                .unwrap();
            store.add_node("cbm", node).await.unwrap();
            store
                .add_edge("cbm", GraphEdge::new(srv, nic, EdgeKind::Has))
                .await
                .unwrap();
        }
        store
    }

    fn jan_window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_aggregate_synthesizes_one_composite_per_site() {
        let store = broker_view().await;
        let projector = BqmProjector::new(store.clone(), Arc::new(NoReservations));
        let bqm_id = projector.query("cbm", &BqmQuery::default()).await.unwrap();

        let sites = store
            .find_nodes(
                &bqm_id,
                &crate::db::NodeFilter::new().with_class(NodeClass::CompositeNode),
            )
            .await
            .unwrap();
        assert_eq!(sites.len(), 2);

        let renc = sites.iter().find(|n| n.name == "RENC").unwrap();
        let caps: Capacities = renc.json_property(prop::CAPACITIES).unwrap().unwrap();
        assert_eq!(caps.core, 64);

        // two identical NICs roll up into one component with unit=2
        let components = store
            .find_nodes(
                &bqm_id,
                &crate::db::NodeFilter::new().with_class(NodeClass::Component),
            )
            .await
            .unwrap();
        assert_eq!(components.len(), 1);
        let caps: Capacities = components[0]
            .json_property(prop::CAPACITIES)
            .unwrap()
            .unwrap();
        assert_eq!(caps.unit, 2);
        assert_eq!(caps.bw, 200);
    }

    #[tokio::test]
    async fn test_timed_query_sums_overlapping_claims() {
        let store = broker_view().await;
        let mut claims = HashMap::new();
        claims.insert(
            "srv-1".to_string(),
            vec![
                CapacityDelta {
                    start: Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap(),
                    capacities: Capacities::new().with_core(8),
                },
                // outside the window, must not count
                CapacityDelta {
                    start: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
                    capacities: Capacities::new().with_core(16),
                },
                // ends exactly at the window start: released before the
                // query range begins, must not count either
                CapacityDelta {
                    start: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                    capacities: Capacities::new().with_core(4),
                },
            ],
        );

        let projector = BqmProjector::new(store.clone(), Arc::new(FixedReservations(claims)));
        let query = BqmQuery {
            window: Some(jan_window()),
            detail: DetailLevel::Full,
        };
        let bqm_id = projector.query("cbm", &query).await.unwrap();

        let node = store.get_node(&bqm_id, "srv-1").await.unwrap();
        let total: Capacities = node.json_property(prop::CAPACITIES).unwrap().unwrap();
        let allocated: Capacities = node
            .json_property(prop::CAPACITY_ALLOCATIONS)
            .unwrap()
            .unwrap();
        assert_eq!(allocated.core, 8);
        assert_eq!(total.saturating_sub(&allocated).core, 24);
    }

    #[tokio::test]
    async fn test_full_detail_preserves_node_ids() {
        let store = broker_view().await;
        let projector = BqmProjector::new(store.clone(), Arc::new(NoReservations));
        let query = BqmQuery {
            window: None,
            detail: DetailLevel::Full,
        };
        let bqm_id = projector.query("cbm", &query).await.unwrap();

        store.get_node(&bqm_id, "srv-1").await.unwrap();
        store.get_node(&bqm_id, "nic-1").await.unwrap();
        let edges = store.list_edges(&bqm_id).await.unwrap();
        assert!(edges
            .iter()
            .any(|e| e.a == "srv-1" && e.b == "nic-1" && e.kind == EdgeKind::Has));
    }

    #[tokio::test]
    async fn test_bqm_is_not_the_cbm() {
        let store = broker_view().await;
        let projector = BqmProjector::new(store.clone(), Arc::new(NoReservations));
        let bqm_id = projector.query("cbm", &BqmQuery::default()).await.unwrap();
        assert_ne!(bqm_id, "cbm");

        // deleting the answer leaves the broker model intact
        store.delete_graph(&bqm_id).await.unwrap();
        assert_eq!(store.list_nodes("cbm").await.unwrap().len(), 5);
    }
}
