//! Validation Engine
//!
//! Declarative structural validation of property graphs. Rules are data: a
//! rule file is an ordered list of `{rule, msg}` records where `rule` is a
//! small tagged predicate AST evaluated by this engine against any
//! `GraphStore` backend, and `msg` is the violation text collected when the
//! predicate is false.
//!
//! Execution model: *every* rule is evaluated; a graph is valid iff the
//! collected-violations list is empty. Nothing fails fast; the caller gets
//! the complete defect list in one pass. Topological rules evaluated against
//! a backend that cannot answer neighbor queries are reported as
//! `unchecked`, never as passed.
//!
//! Rule sets are layered: [`base_rules`] applies to every model kind;
//! [`resource_rules`] is the ARM/ADM/CBM superset adding ownership and
//! adjacency shape constraints. A deployment may load its own
//! [`RuleSet`] from JSON instead.
//!
//! # Examples
//!
//! ```rust,no_run
//! use resgraph_core::db::MemoryStore;
//! use resgraph_core::services::validation::{resource_rules, ValidationEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = ValidationEngine::new(Arc::new(MemoryStore::new()));
//! let report = engine.validate("site-arm", &resource_rules()).await?;
//! if !report.is_valid() {
//!     for violation in &report.violations {
//!         eprintln!("violation: {violation}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::GraphStore;
use crate::models::{
    has_pair_allowed, EdgeKind, GraphEdge, GraphNode, NodeClass, JSON_PROPERTY_NAMES,
};

use super::error::ModelError;

/// Structural predicate over a scoped graph. Portable across backends: the
/// engine interprets it against the `GraphStore` contract instead of
/// shipping backend-specific query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicate", rename_all = "snake_case")]
pub enum RulePredicate {
    /// Every node carries a non-empty value for this attribute or property.
    PropertyExists { prop: String },

    /// No two distinct nodes in the graph share a NodeID.
    UniqueNodeIds,

    /// Every node's Class/Type pair is drawn from the closed vocabulary.
    ClassTypeVocabulary,

    /// Where present, this property decodes as JSON.
    JsonProperty { prop: String },

    /// Every `has` edge respects the owner/owned class table.
    OwnershipShape,

    /// All `kind`-neighbors of nodes of `class` belong to `allowed` classes.
    NeighborClass {
        class: NodeClass,
        kind: EdgeKind,
        allowed: Vec<NodeClass>,
    },

    /// Every node of `class` is owned (incoming `has`) by one of `owners`.
    OwnedBy {
        class: NodeClass,
        owners: Vec<NodeClass>,
    },

    /// Nodes of `class` (optionally narrowed by Type) have between `min`
    /// and `max` `connects`-neighbors of `neighbor_class`.
    ConnectsDegree {
        class: NodeClass,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
        neighbor_class: NodeClass,
        min: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<usize>,
    },
}

impl RulePredicate {
    /// Topological predicates need adjacency queries; on a backend without
    /// them they are reported unchecked.
    pub fn is_topological(&self) -> bool {
        matches!(
            self,
            RulePredicate::OwnershipShape
                | RulePredicate::NeighborClass { .. }
                | RulePredicate::OwnedBy { .. }
                | RulePredicate::ConnectsDegree { .. }
        )
    }
}

/// One rule record of a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule: RulePredicate,
    pub msg: String,
}

impl Rule {
    pub fn new(rule: RulePredicate, msg: impl Into<String>) -> Self {
        Self {
            rule,
            msg: msg.into(),
        }
    }
}

/// Ordered rule list for one model kind. Serde round-trippable so rule
/// files remain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Base rules applied to every model kind (ARM, ADM, CBM, BQM, ASM):
/// property existence, NodeID uniqueness, vocabulary closure, JSON
/// property well-formedness.
pub fn base_rules() -> RuleSet {
    let mut rules = vec![
        Rule::new(
            RulePredicate::PropertyExists {
                prop: "NodeID".into(),
            },
            "Every node must have a NodeID property",
        ),
        Rule::new(
            RulePredicate::PropertyExists {
                prop: "Name".into(),
            },
            "Every node must have a Name property",
        ),
        Rule::new(
            RulePredicate::PropertyExists {
                prop: "Type".into(),
            },
            "Every node must have a Type property",
        ),
        Rule::new(
            RulePredicate::UniqueNodeIds,
            "NodeIDs must be unique within a graph",
        ),
        Rule::new(
            RulePredicate::ClassTypeVocabulary,
            "Node Class/Type pairs must be drawn from the model vocabulary",
        ),
    ];
    for prop in JSON_PROPERTY_NAMES {
        rules.push(Rule::new(
            RulePredicate::JsonProperty {
                prop: (*prop).into(),
            },
            format!("{prop} property must be a valid JSON value"),
        ));
    }
    RuleSet {
        name: "base".into(),
        rules,
    }
}

/// ARM/ADM/CBM rule set: base rules first, then ownership and adjacency
/// shape constraints, then service degree constraints.
pub fn resource_rules() -> RuleSet {
    let mut set = base_rules();
    set.name = "resource".into();
    set.rules.extend([
        Rule::new(
            RulePredicate::OwnershipShape,
            "has relationships must respect the ownership table",
        ),
        Rule::new(
            RulePredicate::OwnedBy {
                class: NodeClass::Component,
                owners: vec![NodeClass::NetworkNode, NodeClass::CompositeNode],
            },
            "Components must be owned by a NetworkNode or CompositeNode",
        ),
        Rule::new(
            RulePredicate::NeighborClass {
                class: NodeClass::Link,
                kind: EdgeKind::Connects,
                allowed: vec![NodeClass::ConnectionPoint],
            },
            "Links can only connect to ConnectionPoints",
        ),
        Rule::new(
            RulePredicate::NeighborClass {
                class: NodeClass::NetworkService,
                kind: EdgeKind::Connects,
                allowed: vec![NodeClass::ConnectionPoint],
            },
            "NetworkServices can only connect to ConnectionPoints",
        ),
        Rule::new(
            RulePredicate::NeighborClass {
                class: NodeClass::ConnectionPoint,
                kind: EdgeKind::Connects,
                allowed: vec![NodeClass::Link, NodeClass::NetworkService],
            },
            "ConnectionPoints can only connect to Links and NetworkServices",
        ),
        Rule::new(
            RulePredicate::ConnectsDegree {
                class: NodeClass::NetworkService,
                type_name: Some("L2PTP".into()),
                neighbor_class: NodeClass::ConnectionPoint,
                min: 2,
                max: Some(2),
            },
            "L2PTP services connect exactly two ConnectionPoints",
        ),
        Rule::new(
            RulePredicate::ConnectsDegree {
                class: NodeClass::NetworkService,
                type_name: Some("PortMirror".into()),
                neighbor_class: NodeClass::ConnectionPoint,
                min: 1,
                max: Some(1),
            },
            "PortMirror services connect exactly one ConnectionPoint",
        ),
    ]);
    set
}

/// Outcome of validating one graph against one rule set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub graph_id: String,
    /// Messages of every rule that evaluated false, in rule order.
    pub violations: Vec<String>,
    /// Messages of rules the backend could not evaluate.
    pub unchecked: Vec<String>,
}

impl ValidationReport {
    /// Valid iff no violations were collected. Unchecked rules do not make
    /// a graph invalid, but callers deciding trust should inspect them.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Interprets rule sets against a `GraphStore`.
pub struct ValidationEngine {
    store: Arc<dyn GraphStore>,
}

impl ValidationEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Evaluate every rule of `rules` against the scoped graph, collecting
    /// all violations. Read-only; safe to run concurrently with other
    /// readers.
    pub async fn validate(
        &self,
        graph_id: &str,
        rules: &RuleSet,
    ) -> Result<ValidationReport, ModelError> {
        let nodes = self.store.list_nodes(graph_id).await?;
        let edges = self.store.list_edges(graph_id).await?;
        let caps = self.store.capabilities();

        let mut report = ValidationReport {
            graph_id: graph_id.to_string(),
            ..Default::default()
        };
        for rule in &rules.rules {
            if rule.rule.is_topological() && !caps.neighbor_queries {
                report.unchecked.push(rule.msg.clone());
                continue;
            }
            let holds = evaluate(&rule.rule, &nodes, &edges);
            debug!(graph_id, rule = ?rule.rule, holds, "evaluated rule");
            if !holds {
                report.violations.push(rule.msg.clone());
            }
        }
        Ok(report)
    }

    /// Validate and convert a dirty report into `ValidationFailed`.
    pub async fn expect_valid(&self, graph_id: &str, rules: &RuleSet) -> Result<(), ModelError> {
        let report = self.validate(graph_id, rules).await?;
        if report.is_valid() {
            Ok(())
        } else {
            Err(ModelError::ValidationFailed(report))
        }
    }
}

fn class_of<'a>(nodes: &'a [GraphNode], node_id: &str) -> Option<NodeClass> {
    nodes.iter().find(|n| n.id == node_id).map(|n| n.class)
}

fn evaluate(predicate: &RulePredicate, nodes: &[GraphNode], edges: &[GraphEdge]) -> bool {
    match predicate {
        RulePredicate::PropertyExists { prop } => nodes.iter().all(|n| match prop.as_str() {
            "NodeID" => !n.id.is_empty(),
            "Name" => !n.name.is_empty(),
            "Type" => !n.type_name.is_empty(),
            other => n
                .property(other)
                .map(|v| !v.is_empty())
                .unwrap_or(false),
        }),

        RulePredicate::UniqueNodeIds => {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for node in nodes {
                *seen.entry(node.id.as_str()).or_default() += 1;
            }
            seen.values().all(|&count| count <= 1)
        }

        RulePredicate::ClassTypeVocabulary => nodes
            .iter()
            .all(|n| n.class.type_vocabulary().contains(&n.type_name.as_str())),

        RulePredicate::JsonProperty { prop } => nodes.iter().all(|n| match n.property(prop) {
            None | Some("") => true,
            Some(raw) => serde_json::from_str::<serde_json::Value>(raw).is_ok(),
        }),

        RulePredicate::OwnershipShape => edges.iter().filter(|e| e.kind == EdgeKind::Has).all(|e| {
            match (class_of(nodes, &e.a), class_of(nodes, &e.b)) {
                (Some(owner), Some(owned)) => has_pair_allowed(owner, owned),
                // dangling endpoints are someone else's violation
                _ => true,
            }
        }),

        RulePredicate::NeighborClass {
            class,
            kind,
            allowed,
        } => nodes.iter().filter(|n| n.class == *class).all(|n| {
            edges
                .iter()
                .filter(|e| e.kind == *kind && e.touches(&n.id))
                .all(|e| {
                    e.other_endpoint(&n.id)
                        .and_then(|other| class_of(nodes, other))
                        .map(|c| allowed.contains(&c))
                        .unwrap_or(true)
                })
        }),

        RulePredicate::OwnedBy { class, owners } => {
            nodes.iter().filter(|n| n.class == *class).all(|n| {
                edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Has && e.b == n.id)
                    .any(|e| {
                        class_of(nodes, &e.a)
                            .map(|c| owners.contains(&c))
                            .unwrap_or(false)
                    })
            })
        }

        RulePredicate::ConnectsDegree {
            class,
            type_name,
            neighbor_class,
            min,
            max,
        } => nodes
            .iter()
            .filter(|n| {
                n.class == *class
                    && type_name
                        .as_ref()
                        .map(|t| n.type_name == *t)
                        .unwrap_or(true)
            })
            .all(|n| {
                let degree = edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Connects && e.touches(&n.id))
                    .filter(|e| {
                        e.other_endpoint(&n.id)
                            .and_then(|other| class_of(nodes, other))
                            .map(|c| c == *neighbor_class)
                            .unwrap_or(false)
                    })
                    .count();
                degree >= *min && max.map(|m| degree <= m).unwrap_or(true)
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseError, MemoryStore, NodeFilter, StoreCapabilities};
    use crate::models::GraphNode;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_graph("g").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_duplicate_node_ids_reported() {
        let store = seeded_store().await;
        store
            .add_node(
                "g",
                GraphNode::new("dup", NodeClass::NetworkNode, "Server", "a"),
            )
            .await
            .unwrap();
        store
            .add_node(
                "g",
                GraphNode::new("dup", NodeClass::NetworkNode, "Server", "b"),
            )
            .await
            .unwrap();

        let engine = ValidationEngine::new(store);
        let report = engine.validate("g", &base_rules()).await.unwrap();
        assert_eq!(
            report.violations,
            vec!["NodeIDs must be unique within a graph".to_string()]
        );
    }

    #[tokio::test]
    async fn test_vocabulary_closure() {
        let store = seeded_store().await;
        store
            .add_node(
                "g",
                GraphNode::new("n1", NodeClass::Link, "Server", "bad-link"),
            )
            .await
            .unwrap();

        let engine = ValidationEngine::new(store);
        let report = engine.validate("g", &base_rules()).await.unwrap();
        assert_eq!(
            report.violations,
            vec!["Node Class/Type pairs must be drawn from the model vocabulary".to_string()]
        );
    }

    #[tokio::test]
    async fn test_undecodable_json_property() {
        let store = seeded_store().await;
        store
            .add_node(
                "g",
                GraphNode::new("n1", NodeClass::NetworkNode, "Server", "srv")
                    .with_property("Capacities", "{not json"),
            )
            .await
            .unwrap();

        let engine = ValidationEngine::new(store);
        let report = engine.validate("g", &base_rules()).await.unwrap();
        assert_eq!(
            report.violations,
            vec!["Capacities property must be a valid JSON value".to_string()]
        );
    }

    #[tokio::test]
    async fn test_all_violations_collected_in_one_pass() {
        let store = seeded_store().await;
        // empty name + bad vocabulary on the same node
        store
            .add_node("g", GraphNode::new("n1", NodeClass::Link, "Server", ""))
            .await
            .unwrap();

        let engine = ValidationEngine::new(store);
        let report = engine.validate("g", &base_rules()).await.unwrap();
        assert_eq!(report.violations.len(), 2);
    }

    #[tokio::test]
    async fn test_rule_file_roundtrip() {
        let set = resource_rules();
        let json = set.to_json().unwrap();
        let reloaded = RuleSet::from_json(&json).unwrap();
        assert_eq!(reloaded, set);
    }

    /// Backend that answers node queries but cannot express adjacency.
    struct DegradedStore(MemoryStore);

    #[async_trait]
    impl GraphStore for DegradedStore {
        async fn create_graph(&self, g: &str) -> Result<(), DatabaseError> {
            self.0.create_graph(g).await
        }
        async fn graph_exists(&self, g: &str) -> Result<bool, DatabaseError> {
            self.0.graph_exists(g).await
        }
        async fn list_graph_ids(&self) -> Result<Vec<String>, DatabaseError> {
            self.0.list_graph_ids().await
        }
        async fn delete_graph(&self, g: &str) -> Result<(), DatabaseError> {
            self.0.delete_graph(g).await
        }
        async fn clone_graph(&self, g: &str, n: &str) -> Result<(), DatabaseError> {
            self.0.clone_graph(g, n).await
        }
        async fn add_node(&self, g: &str, node: GraphNode) -> Result<(), DatabaseError> {
            self.0.add_node(g, node).await
        }
        async fn get_node(&self, g: &str, id: &str) -> Result<GraphNode, DatabaseError> {
            self.0.get_node(g, id).await
        }
        async fn delete_node(&self, g: &str, id: &str) -> Result<(), DatabaseError> {
            self.0.delete_node(g, id).await
        }
        async fn update_node_properties(
            &self,
            g: &str,
            id: &str,
            props: Map<String, Value>,
        ) -> Result<(), DatabaseError> {
            self.0.update_node_properties(g, id, props).await
        }
        async fn replace_node_properties(
            &self,
            g: &str,
            id: &str,
            props: Map<String, Value>,
        ) -> Result<(), DatabaseError> {
            self.0.replace_node_properties(g, id, props).await
        }
        async fn find_nodes(
            &self,
            g: &str,
            f: &NodeFilter,
        ) -> Result<Vec<GraphNode>, DatabaseError> {
            self.0.find_nodes(g, f).await
        }
        async fn list_nodes(&self, g: &str) -> Result<Vec<GraphNode>, DatabaseError> {
            self.0.list_nodes(g).await
        }
        async fn list_node_ids(&self, g: &str) -> Result<Vec<String>, DatabaseError> {
            self.0.list_node_ids(g).await
        }
        async fn add_edge(&self, g: &str, e: GraphEdge) -> Result<(), DatabaseError> {
            self.0.add_edge(g, e).await
        }
        async fn list_edges(&self, g: &str) -> Result<Vec<GraphEdge>, DatabaseError> {
            self.0.list_edges(g).await
        }
        async fn delete_edge(
            &self,
            g: &str,
            a: &str,
            b: &str,
            k: EdgeKind,
        ) -> Result<(), DatabaseError> {
            self.0.delete_edge(g, a, b, k).await
        }
        async fn neighbors(
            &self,
            g: &str,
            id: &str,
            k: Option<EdgeKind>,
        ) -> Result<Vec<GraphNode>, DatabaseError> {
            self.0.neighbors(g, id, k).await
        }
        fn capabilities(&self) -> StoreCapabilities {
            StoreCapabilities {
                neighbor_queries: false,
            }
        }
    }

    #[tokio::test]
    async fn test_topological_rules_unchecked_on_degraded_backend() {
        let store = Arc::new(DegradedStore(MemoryStore::new()));
        store.create_graph("g").await.unwrap();
        store
            .add_node(
                "g",
                GraphNode::new("n1", NodeClass::NetworkNode, "Server", "srv"),
            )
            .await
            .unwrap();

        let engine = ValidationEngine::new(store);
        let report = engine.validate("g", &resource_rules()).await.unwrap();
        assert!(report.is_valid());
        assert!(report
            .unchecked
            .contains(&"Links can only connect to ConnectionPoints".to_string()));
    }
}
