//! Graph Node and Edge Data Structures
//!
//! This module defines the typed property-graph elements shared by every
//! model kind (ARM, ADM, CBM, BQM, ASM):
//!
//! - **GraphNode**: typed node with a closed `NodeClass`, a per-class type
//!   vocabulary and an open JSON property bag
//! - **GraphEdge**: `has` (ownership) / `connects` (adjacency) relationship,
//!   identified only by its endpoint pair and kind
//!
//! A node's `id` (NodeID) is a content-free foreign key: the same logical
//! entity carries the same NodeID in every graph it appears in, which is what
//! lets partitioned delegations merge back into one broker view. The GraphID
//! is deliberately *not* a node field: it is the partition key of the store
//! operation that touches the node.
//!
//! # Examples
//!
//! ```rust
//! use resgraph_core::models::{GraphNode, NodeClass};
//!
//! let server = GraphNode::new("node-1", NodeClass::NetworkNode, "Server", "worker-1")
//!     .with_property("Site", "RENC");
//! assert_eq!(server.class, NodeClass::NetworkNode);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known property names carried on nodes and edges.
///
/// Composite properties (capacities, labels, provenance, allocations) are
/// JSON-encoded *strings* under these keys, the encoding the GraphML
/// exchange format carries.
pub mod prop {
    /// Stable cross-graph identity of a node.
    pub const NODE_ID: &str = "NodeID";
    /// Closed node class (NetworkNode, Component, ...).
    pub const CLASS: &str = "Class";
    /// Per-class subtype (Server, SmartNIC, L2PTP, ...).
    pub const TYPE: &str = "Type";
    /// Human-readable label, not unique.
    pub const NAME: &str = "Name";
    /// JSON-encoded `Capacities`.
    pub const CAPACITIES: &str = "Capacities";
    /// JSON-encoded `Labels` (addressing info).
    pub const LABELS: &str = "Labels";
    /// JSON-encoded `Capacities` already claimed by reservations.
    pub const CAPACITY_ALLOCATIONS: &str = "CapacityAllocations";
    /// JSON-encoded list of future `CapacityDelta` entries (non-timed BQM).
    pub const ALLOCATION_CALENDAR: &str = "AllocationCalendar";
    /// JSON-encoded `StructuralInfo` provenance record (CBM bookkeeping).
    pub const STRUCTURAL_INFO: &str = "StructuralInfo";
    /// Partition tag naming the delegation an ARM node belongs to.
    pub const DELEGATION: &str = "delegation";
    /// Site designator used for BQM aggregation.
    pub const SITE: &str = "Site";
    /// Component model designator (e.g. "ConnectX-6").
    pub const MODEL: &str = "Model";
}

/// Properties that are JSON-encoded objects and must decode cleanly
/// whenever a graph is validated.
pub const JSON_PROPERTY_NAMES: &[&str] = &[
    prop::CAPACITIES,
    prop::LABELS,
    prop::CAPACITY_ALLOCATIONS,
    prop::ALLOCATION_CALENDAR,
    prop::STRUCTURAL_INFO,
];

/// Closed vocabulary of node classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    NetworkNode,
    CompositeNode,
    Component,
    ConnectionPoint,
    NetworkService,
    Link,
}

impl NodeClass {
    pub const ALL: &'static [NodeClass] = &[
        NodeClass::NetworkNode,
        NodeClass::CompositeNode,
        NodeClass::Component,
        NodeClass::ConnectionPoint,
        NodeClass::NetworkService,
        NodeClass::Link,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeClass::NetworkNode => "NetworkNode",
            NodeClass::CompositeNode => "CompositeNode",
            NodeClass::Component => "Component",
            NodeClass::ConnectionPoint => "ConnectionPoint",
            NodeClass::NetworkService => "NetworkService",
            NodeClass::Link => "Link",
        }
    }

    pub fn parse(s: &str) -> Option<NodeClass> {
        NodeClass::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    /// Closed per-class type vocabulary (newer NetworkService/CompositeNode
    /// schema; the deprecated SwitchFabric vocabulary is not represented).
    pub fn type_vocabulary(&self) -> &'static [&'static str] {
        match self {
            NodeClass::NetworkNode => {
                &["Server", "Switch", "VM", "Container", "NAS", "Facility"]
            }
            NodeClass::CompositeNode => &["Server", "Switch", "Site"],
            NodeClass::Component => {
                &["GPU", "SmartNIC", "SharedNIC", "FPGA", "NVME", "Storage"]
            }
            NodeClass::ConnectionPoint => {
                &["TrunkPort", "AccessPort", "ServicePort", "FacilityPort"]
            }
            NodeClass::NetworkService => &[
                "MPLS",
                "OVS",
                "L2Bridge",
                "L2STS",
                "L2PTP",
                "FABNetv4",
                "FABNetv6",
                "PortMirror",
            ],
            NodeClass::Link => &["Patch", "DAC", "L1Path", "L2Path"],
        }
    }
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship kinds. `has` is directed ownership (owner first),
/// `connects` is undirected adjacency. Ordered so edge identity tuples
/// sort deterministically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Has,
    Connects,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Has => "has",
            EdgeKind::Connects => "connects",
        }
    }

    pub fn parse(s: &str) -> Option<EdgeKind> {
        match s {
            "has" => Some(EdgeKind::Has),
            "connects" => Some(EdgeKind::Connects),
            _ => None,
        }
    }
}

/// Legal `(owner, owned)` class pairs for `has` edges.
pub const HAS_PAIRS: &[(NodeClass, NodeClass)] = &[
    (NodeClass::NetworkNode, NodeClass::Component),
    (NodeClass::NetworkNode, NodeClass::NetworkService),
    (NodeClass::CompositeNode, NodeClass::Component),
    (NodeClass::CompositeNode, NodeClass::NetworkService),
    (NodeClass::Component, NodeClass::ConnectionPoint),
    (NodeClass::NetworkService, NodeClass::ConnectionPoint),
];

/// Legal endpoint class pairs for `connects` edges (order-insensitive).
pub const CONNECTS_PAIRS: &[(NodeClass, NodeClass)] = &[
    (NodeClass::ConnectionPoint, NodeClass::Link),
    (NodeClass::ConnectionPoint, NodeClass::NetworkService),
];

/// Is a `has` edge from `owner` to `owned` structurally legal?
pub fn has_pair_allowed(owner: NodeClass, owned: NodeClass) -> bool {
    HAS_PAIRS.iter().any(|&(a, b)| a == owner && b == owned)
}

/// Is a `connects` edge between these classes structurally legal?
pub fn connects_pair_allowed(a: NodeClass, b: NodeClass) -> bool {
    CONNECTS_PAIRS
        .iter()
        .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
}

/// Typed node of a property graph.
///
/// The `properties` bag is open: anything beyond the four required
/// attributes (NodeID, Class, Type, Name) lives here, including the
/// JSON-encoded composites named in [`JSON_PROPERTY_NAMES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable cross-graph NodeID.
    pub id: String,

    /// Closed node class.
    pub class: NodeClass,

    /// Subtype drawn from the class vocabulary. Stored as a string because
    /// graphs arrive from external authoring tools; the validation engine
    /// enforces vocabulary closure.
    pub type_name: String,

    /// Human label, not unique.
    pub name: String,

    /// Open property bag.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GraphNode {
    pub fn new(
        id: impl Into<String>,
        class: NodeClass,
        type_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            class,
            type_name: type_name.into(),
            name: name.into(),
            properties: Map::new(),
        }
    }

    /// Builder-style string property setter.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .insert(key.into(), Value::String(value.into()));
        self
    }

    /// String value of a property, if present and a string.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Decode a JSON-encoded string property into `T`. Returns `Ok(None)`
    /// if the property is absent or empty.
    pub fn json_property<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        match self.property(key) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some),
        }
    }

    /// Encode `value` as JSON and store it as a string property.
    pub fn set_json_property<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let raw = serde_json::to_string(value)?;
        self.properties.insert(key.to_string(), Value::String(raw));
        Ok(())
    }
}

/// Typed edge. Carries no identity beyond `(endpoints, kind)`; the property
/// bag exists for broker bookkeeping (edge provenance) and exchange-format
/// round-tripping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub a: String,
    pub b: String,
    pub kind: EdgeKind,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GraphEdge {
    pub fn new(a: impl Into<String>, b: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            kind,
            properties: Map::new(),
        }
    }

    /// Identity comparison: kind plus endpoint pair, order-insensitive for
    /// `connects`, owner-first for `has`.
    pub fn same_identity(&self, a: &str, b: &str, kind: EdgeKind) -> bool {
        if self.kind != kind {
            return false;
        }
        match kind {
            EdgeKind::Has => self.a == a && self.b == b,
            EdgeKind::Connects => {
                (self.a == a && self.b == b) || (self.a == b && self.b == a)
            }
        }
    }

    /// Does this edge touch `node_id`?
    pub fn touches(&self, node_id: &str) -> bool {
        self.a == node_id || self.b == node_id
    }

    /// The endpoint opposite `node_id`, if the edge touches it.
    pub fn other_endpoint(&self, node_id: &str) -> Option<&str> {
        if self.a == node_id {
            Some(&self.b)
        } else if self.b == node_id {
            Some(&self.a)
        } else {
            None
        }
    }
}
