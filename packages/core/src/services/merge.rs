//! CBM Merge / Unmerge
//!
//! Maintains a combined broker model by merging ADM graphs into it and
//! unmerging them back out. Merge is keyed by NodeID: an incoming node that
//! already exists in the CBM has its properties overwritten (idempotent),
//! and the broker records which sources contributed each element in a
//! `StructuralInfo` provenance set. Unmerge removes one source's claim and
//! deletes only the elements whose provenance set drains, so infrastructure
//! shared between delegations survives until its last contributor leaves.
//!
//! Mutations are atomic per merge/unmerge call: the CBM is snapshot-cloned
//! first and rolled back wholesale if anything fails partway. Writers to
//! one CBM serialize on the merger's lock; mergers for different CBMs never
//! contend.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::GraphStore;
use crate::models::{prop, GraphEdge, StructuralInfo};

use super::error::ModelError;

/// Merges ADMs into (and out of) one combined broker model.
///
/// The writer lock lives on the merger, so a CBM must have exactly one
/// `CbmMerger` for its lifetime (share it behind an `Arc`); constructing a
/// second merger for the same `cbm_id` would let writers interleave.
pub struct CbmMerger {
    store: Arc<dyn GraphStore>,
    cbm_id: String,
    write_lock: Mutex<()>,
}

impl CbmMerger {
    pub fn new(store: Arc<dyn GraphStore>, cbm_id: impl Into<String>) -> Self {
        Self {
            store,
            cbm_id: cbm_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn cbm_id(&self) -> &str {
        &self.cbm_id
    }

    /// Merge `source_id` into the CBM. Re-merging the same source is a
    /// no-op; merging sources in a different order yields the same CBM.
    pub async fn merge(&self, source_id: &str) -> Result<(), ModelError> {
        let _guard = self.write_lock.lock().await;
        if !self.store.graph_exists(&self.cbm_id).await? {
            self.store.create_graph(&self.cbm_id).await?;
        }

        let snapshot = self.snapshot().await?;
        match self.apply_merge(source_id).await {
            Ok(stats) => {
                self.store.delete_graph(&snapshot).await?;
                info!(
                    cbm_id = %self.cbm_id,
                    source_id,
                    nodes = stats.0,
                    edges = stats.1,
                    "merged source into broker model"
                );
                Ok(())
            }
            Err(e) => {
                warn!(cbm_id = %self.cbm_id, source_id, error = %e, "merge failed, rolling back");
                self.rollback(&snapshot).await?;
                Err(e)
            }
        }
    }

    /// Remove `source_id`'s contribution. Elements still claimed by another
    /// source are kept; elements whose provenance drains are deleted.
    pub async fn unmerge(&self, source_id: &str) -> Result<(), ModelError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot().await?;
        match self.apply_unmerge(source_id).await {
            Ok(()) => {
                self.store.delete_graph(&snapshot).await?;
                info!(cbm_id = %self.cbm_id, source_id, "unmerged source from broker model");
                Ok(())
            }
            Err(e) => {
                warn!(cbm_id = %self.cbm_id, source_id, error = %e, "unmerge failed, rolling back");
                self.rollback(&snapshot).await?;
                Err(e)
            }
        }
    }

    async fn snapshot(&self) -> Result<String, ModelError> {
        let snapshot = format!("snapshot-{}", Uuid::new_v4());
        self.store.clone_graph(&self.cbm_id, &snapshot).await?;
        Ok(snapshot)
    }

    async fn rollback(&self, snapshot: &str) -> Result<(), ModelError> {
        self.store.delete_graph(&self.cbm_id).await?;
        self.store.clone_graph(snapshot, &self.cbm_id).await?;
        self.store.delete_graph(snapshot).await?;
        Ok(())
    }

    async fn apply_merge(&self, source_id: &str) -> Result<(usize, usize), ModelError> {
        let source_nodes = self.store.list_nodes(source_id).await?;
        let source_edges = self.store.list_edges(source_id).await?;
        let cbm_nodes = self.store.list_nodes(&self.cbm_id).await?;

        for incoming in &source_nodes {
            match cbm_nodes.iter().find(|n| n.id == incoming.id) {
                Some(existing) => {
                    if existing.class != incoming.class || existing.type_name != incoming.type_name
                    {
                        return Err(ModelError::merge_conflict(
                            &incoming.id,
                            format!(
                                "sources disagree on Class/Type: {}/{} vs {}/{}",
                                existing.class,
                                existing.type_name,
                                incoming.class,
                                incoming.type_name
                            ),
                        ));
                    }
                    let mut provenance = existing
                        .json_property::<StructuralInfo>(prop::STRUCTURAL_INFO)
                        .map_err(|e| {
                            ModelError::schema_error(&existing.id, prop::STRUCTURAL_INFO, e.to_string())
                        })?
                        .unwrap_or_default();
                    provenance.add(source_id);
                    // wholesale replacement: a property dropped from the
                    // re-submitted source must not survive stale in the CBM
                    let props = payload_with_provenance(&incoming.properties, &provenance)?;
                    self.store
                        .replace_node_properties(&self.cbm_id, &incoming.id, props)
                        .await?;
                }
                None => {
                    let mut node = incoming.clone();
                    node.set_json_property(prop::STRUCTURAL_INFO, &StructuralInfo::single(source_id))
                        .map_err(|e| {
                            ModelError::schema_error(&node.id, prop::STRUCTURAL_INFO, e.to_string())
                        })?;
                    self.store.add_node(&self.cbm_id, node).await?;
                }
            }
        }

        let cbm_edges = self.store.list_edges(&self.cbm_id).await?;
        for incoming in &source_edges {
            let mut provenance = match cbm_edges
                .iter()
                .find(|e| e.same_identity(&incoming.a, &incoming.b, incoming.kind))
            {
                Some(existing) => edge_provenance(existing)?,
                None => StructuralInfo::default(),
            };
            provenance.add(source_id);
            let mut edge = incoming.clone();
            let props = payload_with_provenance(&incoming.properties, &provenance)?;
            edge.properties = props;
            self.store.add_edge(&self.cbm_id, edge).await?;
        }

        Ok((source_nodes.len(), source_edges.len()))
    }

    async fn apply_unmerge(&self, source_id: &str) -> Result<(), ModelError> {
        // edges first, so shared edges drop cleanly before any endpoint goes
        for edge in self.store.list_edges(&self.cbm_id).await? {
            let mut provenance = edge_provenance(&edge)?;
            if !provenance.contains(source_id) {
                continue;
            }
            if provenance.remove(source_id) {
                self.store
                    .delete_edge(&self.cbm_id, &edge.a, &edge.b, edge.kind)
                    .await?;
            } else {
                let mut updated = edge.clone();
                let raw = serde_json::to_string(&provenance)
                    .map_err(|e| ModelError::codec(e.to_string()))?;
                updated
                    .properties
                    .insert(prop::STRUCTURAL_INFO.to_string(), Value::String(raw));
                self.store.add_edge(&self.cbm_id, updated).await?;
            }
        }

        for node in self.store.list_nodes(&self.cbm_id).await? {
            let mut provenance = node
                .json_property::<StructuralInfo>(prop::STRUCTURAL_INFO)
                .map_err(|e| {
                    ModelError::schema_error(&node.id, prop::STRUCTURAL_INFO, e.to_string())
                })?
                .unwrap_or_default();
            if !provenance.contains(source_id) {
                continue;
            }
            if provenance.remove(source_id) {
                self.store.delete_node(&self.cbm_id, &node.id).await?;
            } else {
                let mut props = Map::new();
                let raw = serde_json::to_string(&provenance)
                    .map_err(|e| ModelError::codec(e.to_string()))?;
                props.insert(prop::STRUCTURAL_INFO.to_string(), Value::String(raw));
                self.store
                    .update_node_properties(&self.cbm_id, &node.id, props)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Incoming payload with the broker-maintained provenance substituted in.
/// The source's own StructuralInfo (if any) never reaches the CBM.
fn payload_with_provenance(
    payload: &Map<String, Value>,
    provenance: &StructuralInfo,
) -> Result<Map<String, Value>, ModelError> {
    let mut props = payload.clone();
    let raw = serde_json::to_string(provenance).map_err(|e| ModelError::codec(e.to_string()))?;
    props.insert(prop::STRUCTURAL_INFO.to_string(), Value::String(raw));
    Ok(props)
}

fn edge_provenance(edge: &GraphEdge) -> Result<StructuralInfo, ModelError> {
    match edge.properties.get(prop::STRUCTURAL_INFO).and_then(Value::as_str) {
        None | Some("") => Ok(StructuralInfo::default()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            ModelError::schema_error(
                format!("{}--{}", edge.a, edge.b),
                prop::STRUCTURAL_INFO,
                e.to_string(),
            )
        }),
    }
}
