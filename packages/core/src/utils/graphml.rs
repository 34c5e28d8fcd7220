//! GraphML Exchange Codec
//!
//! GraphML is the exchange format: site authoring tools emit ARMs as
//! GraphML, brokers emit ADMs/BQMs as GraphML. The serialized form never
//! carries a GraphID; one is assigned at import (caller-supplied or a
//! fresh v4 UUID), which is how the same ARM file can be loaded twice as
//! two independent graphs.
//!
//! Export is deterministic: keys, nodes (by NodeID) and edges (by
//! endpoints and kind) are emitted sorted, so exporting an unchanged graph
//! byte-reproduces, and `serialize(parse(serialize(G))) == serialize(G)`.
//!
//! ## Import requirements
//!
//! Every `<node>` must carry `NodeID` and a recognized `Class`; everything
//! else is optional and lands in the property bag. `<edge>` elements wire
//! GraphML-local element ids to NodeIDs, and their `Class` data entry is
//! the edge kind (`has` / `connects`).

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::GraphStore;
use crate::models::{prop, EdgeKind, GraphEdge, GraphNode, NodeClass};
use crate::services::ModelError;

/// Loads GraphML documents into a store.
pub struct GraphMlImporter {
    store: Arc<dyn GraphStore>,
}

impl GraphMlImporter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Parse `xml` and load it as a new graph. Returns the assigned
    /// GraphID.
    pub async fn import_graph(
        &self,
        xml: &str,
        graph_id: Option<&str>,
    ) -> Result<String, ModelError> {
        let parsed = parse_graphml(xml)?;
        let graph_id = graph_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.store.create_graph(&graph_id).await?;

        let result = async {
            for node in parsed.nodes {
                self.store.add_node(&graph_id, node).await?;
            }
            for edge in parsed.edges {
                self.store.add_edge(&graph_id, edge).await?;
            }
            Ok::<_, ModelError>(())
        }
        .await;
        if let Err(e) = result {
            self.store.delete_graph(&graph_id).await?;
            return Err(e);
        }

        info!(graph_id, "imported GraphML document");
        Ok(graph_id)
    }

    /// Read a GraphML file and load it as a new graph.
    pub async fn import_graph_from_file(
        &self,
        path: impl AsRef<Path>,
        graph_id: Option<&str>,
    ) -> Result<String, ModelError> {
        let xml = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| ModelError::codec(format!("reading {}: {e}", path.as_ref().display())))?;
        self.import_graph(&xml, graph_id).await
    }
}

/// Serializes stored graphs back to GraphML.
pub struct GraphMlExporter {
    store: Arc<dyn GraphStore>,
}

impl GraphMlExporter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Deterministic GraphML serialization of one graph.
    pub async fn export_graph(&self, graph_id: &str) -> Result<String, ModelError> {
        let mut nodes = self.store.list_nodes(graph_id).await?;
        let mut edges = self.store.list_edges(graph_id).await?;
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        edges.sort_by(|a, b| {
            (a.a.as_str(), a.b.as_str(), a.kind.as_str())
                .cmp(&(b.a.as_str(), b.b.as_str(), b.kind.as_str()))
        });
        serialize_graphml(&nodes, &edges).map_err(|e| ModelError::codec(e.to_string()))
    }

    pub async fn export_graph_to_file(
        &self,
        graph_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<(), ModelError> {
        let xml = self.export_graph(graph_id).await?;
        tokio::fs::write(path.as_ref(), xml)
            .await
            .map_err(|e| ModelError::codec(format!("writing {}: {e}", path.as_ref().display())))
    }
}

struct ParsedGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

fn parse_graphml(xml: &str) -> Result<ParsedGraph, ModelError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // key element id -> attribute name
    let mut keys: HashMap<String, String> = HashMap::new();
    // GraphML-local element id -> NodeID, for edge wiring
    let mut local_ids: HashMap<String, String> = HashMap::new();

    let mut nodes = Vec::new();
    let mut raw_edges: Vec<(String, String, HashMap<String, String>)> = Vec::new();

    // (local id, collected data) of the element being read
    let mut current_node: Option<(String, HashMap<String, String>)> = None;
    let mut current_edge: Option<(String, String, HashMap<String, String>)> = None;
    let mut current_key: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ModelError::codec(format!("malformed GraphML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"key" => {
                        let mut id = None;
                        let mut attr_name = None;
                        for attr in e.attributes() {
                            let attr =
                                attr.map_err(|e| ModelError::codec(format!("bad attribute: {e}")))?;
                            let value = attr
                                .unescape_value()
                                .map_err(|e| ModelError::codec(e.to_string()))?
                                .into_owned();
                            match attr.key.as_ref() {
                                b"id" => id = Some(value),
                                b"attr.name" => attr_name = Some(value),
                                _ => {}
                            }
                        }
                        if let (Some(id), Some(name)) = (id, attr_name) {
                            keys.insert(id, name);
                        }
                    }
                    b"node" => {
                        let local = required_attr(e, b"id")?;
                        if empty {
                            return Err(ModelError::codec(format!(
                                "node {local} carries no data entries"
                            )));
                        }
                        current_node = Some((local, HashMap::new()));
                    }
                    b"edge" => {
                        let source = required_attr(e, b"source")?;
                        let target = required_attr(e, b"target")?;
                        if empty {
                            raw_edges.push((source, target, HashMap::new()));
                        } else {
                            current_edge = Some((source, target, HashMap::new()));
                        }
                    }
                    b"data" if !empty => {
                        let key_id = required_attr(e, b"key")?;
                        current_key = Some(
                            keys.get(&key_id)
                                .cloned()
                                .unwrap_or(key_id),
                        );
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(key) = current_key.as_ref() {
                    let value = t
                        .unescape()
                        .map_err(|e| ModelError::codec(e.to_string()))?
                        .into_owned();
                    if let Some((_, data)) = current_node.as_mut() {
                        data.insert(key.clone(), value);
                    } else if let Some((_, _, data)) = current_edge.as_mut() {
                        data.insert(key.clone(), value);
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"data" => current_key = None,
                b"node" => {
                    let (local, data) = current_node.take().ok_or_else(|| {
                        ModelError::codec("unbalanced node element".to_string())
                    })?;
                    let node = node_from_data(&local, data)?;
                    local_ids.insert(local, node.id.clone());
                    nodes.push(node);
                }
                b"edge" => {
                    if let Some(edge) = current_edge.take() {
                        raw_edges.push(edge);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let mut edges = Vec::with_capacity(raw_edges.len());
    for (source, target, mut data) in raw_edges {
        let a = local_ids
            .get(&source)
            .ok_or_else(|| ModelError::codec(format!("edge source {source} is not a node")))?;
        let b = local_ids
            .get(&target)
            .ok_or_else(|| ModelError::codec(format!("edge target {target} is not a node")))?;
        let kind_raw = data
            .remove(prop::CLASS)
            .ok_or_else(|| ModelError::codec(format!("edge {source}->{target} has no Class")))?;
        let kind = EdgeKind::parse(&kind_raw)
            .ok_or_else(|| ModelError::codec(format!("unknown edge kind {kind_raw}")))?;
        let mut edge = GraphEdge::new(a.clone(), b.clone(), kind);
        for (k, v) in data {
            edge.properties.insert(k, Value::String(v));
        }
        edges.push(edge);
    }

    Ok(ParsedGraph { nodes, edges })
}

fn node_from_data(
    local: &str,
    mut data: HashMap<String, String>,
) -> Result<GraphNode, ModelError> {
    let node_id = data
        .remove(prop::NODE_ID)
        .ok_or_else(|| ModelError::codec(format!("node {local} has no NodeID")))?;
    let class_raw = data
        .remove(prop::CLASS)
        .ok_or_else(|| ModelError::codec(format!("node {local} has no Class")))?;
    let class = NodeClass::parse(&class_raw)
        .ok_or_else(|| ModelError::codec(format!("unknown node class {class_raw}")))?;
    let type_name = data.remove(prop::TYPE).unwrap_or_default();
    let name = data.remove(prop::NAME).unwrap_or_default();
    let mut node = GraphNode::new(node_id, class, type_name, name);
    for (k, v) in data {
        node.properties.insert(k, Value::String(v));
    }
    Ok(node)
}

fn required_attr(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Result<String, ModelError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ModelError::codec(format!("bad attribute: {e}")))?;
        if attr.key.as_ref() == name {
            return attr
                .unescape_value()
                .map(|v| v.into_owned())
                .map_err(|e| ModelError::codec(e.to_string()));
        }
    }
    Err(ModelError::codec(format!(
        "missing attribute {}",
        String::from_utf8_lossy(name)
    )))
}

fn serialize_graphml(nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<String, std::fmt::Error> {
    // sorted union of node/edge data names, attributes first
    let mut node_keys: BTreeSet<&str> = BTreeSet::new();
    for node in nodes {
        node_keys.extend(node.properties.keys().map(String::as_str));
    }
    let mut edge_keys: BTreeSet<&str> = BTreeSet::new();
    for edge in edges {
        edge_keys.extend(edge.properties.keys().map(String::as_str));
    }

    let attributes = [prop::NODE_ID, prop::CLASS, prop::TYPE, prop::NAME];
    let mut node_key_ids: HashMap<&str, String> = HashMap::new();
    let mut edge_key_ids: HashMap<&str, String> = HashMap::new();

    let mut xml = String::new();
    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        xml,
        r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#
    )?;
    for (i, name) in attributes
        .iter()
        .copied()
        .chain(node_keys.iter().copied().filter(|k| !attributes.contains(k)))
        .enumerate()
    {
        let id = format!("nd{i}");
        writeln!(
            xml,
            r#"  <key id="{id}" for="node" attr.name="{}" attr.type="string"/>"#,
            xml_escape(name)
        )?;
        node_key_ids.insert(name, id);
    }
    for (i, name) in [prop::CLASS]
        .iter()
        .copied()
        .chain(edge_keys.iter().copied().filter(|k| *k != prop::CLASS))
        .enumerate()
    {
        let id = format!("ed{i}");
        writeln!(
            xml,
            r#"  <key id="{id}" for="edge" attr.name="{}" attr.type="string"/>"#,
            xml_escape(name)
        )?;
        edge_key_ids.insert(name, id);
    }

    writeln!(xml, r#"  <graph edgedefault="undirected">"#)?;

    let mut local_ids: HashMap<&str, String> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        let local = format!("n{i}");
        writeln!(xml, r#"    <node id="{local}">"#)?;
        write_data(&mut xml, &node_key_ids[prop::NODE_ID], &node.id)?;
        write_data(&mut xml, &node_key_ids[prop::CLASS], node.class.as_str())?;
        write_data(&mut xml, &node_key_ids[prop::TYPE], &node.type_name)?;
        write_data(&mut xml, &node_key_ids[prop::NAME], &node.name)?;
        for key in &node_keys {
            if attributes.contains(key) {
                continue;
            }
            if let Some(value) = node.properties.get(*key) {
                write_data(&mut xml, &node_key_ids[key], &value_text(value))?;
            }
        }
        writeln!(xml, "    </node>")?;
        local_ids.insert(node.id.as_str(), local);
    }

    for edge in edges {
        // endpoints are guaranteed present by the store contract
        let (source, target) = match (local_ids.get(edge.a.as_str()), local_ids.get(edge.b.as_str()))
        {
            (Some(s), Some(t)) => (s, t),
            _ => continue,
        };
        writeln!(xml, r#"    <edge source="{source}" target="{target}">"#)?;
        write_data(&mut xml, &edge_key_ids[prop::CLASS], edge.kind.as_str())?;
        for key in &edge_keys {
            if *key == prop::CLASS {
                continue;
            }
            if let Some(value) = edge.properties.get(*key) {
                write_data(&mut xml, &edge_key_ids[key], &value_text(value))?;
            }
        }
        writeln!(xml, "    </edge>")?;
    }

    writeln!(xml, "  </graph>")?;
    writeln!(xml, "</graphml>")?;
    Ok(xml)
}

fn write_data(xml: &mut String, key_id: &str, value: &str) -> std::fmt::Result {
    writeln!(
        xml,
        r#"      <data key="{key_id}">{}</data>"#,
        xml_escape(value)
    )
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::Capacities;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="NodeID" attr.type="string"/>
  <key id="d1" for="node" attr.name="Class" attr.type="string"/>
  <key id="d2" for="node" attr.name="Type" attr.type="string"/>
  <key id="d3" for="node" attr.name="Name" attr.type="string"/>
  <key id="d4" for="node" attr.name="Site" attr.type="string"/>
  <key id="e0" for="edge" attr.name="Class" attr.type="string"/>
  <graph edgedefault="undirected">
    <node id="n0">
      <data key="d0">srv-1</data>
      <data key="d1">NetworkNode</data>
      <data key="d2">Server</data>
      <data key="d3">worker &amp; friend</data>
      <data key="d4">RENC</data>
    </node>
    <node id="n1">
      <data key="d0">nic-1</data>
      <data key="d1">Component</data>
      <data key="d2">SmartNIC</data>
      <data key="d3">nic0</data>
    </node>
    <edge source="n0" target="n1">
      <data key="e0">has</data>
    </edge>
  </graph>
</graphml>
"#;

    #[tokio::test]
    async fn test_import_sample() {
        let store = Arc::new(MemoryStore::new());
        let importer = GraphMlImporter::new(store.clone());
        let graph_id = importer.import_graph(SAMPLE, Some("arm")).await.unwrap();
        assert_eq!(graph_id, "arm");

        let srv = store.get_node("arm", "srv-1").await.unwrap();
        assert_eq!(srv.class, NodeClass::NetworkNode);
        assert_eq!(srv.name, "worker & friend");
        assert_eq!(srv.property(prop::SITE), Some("RENC"));

        let edges = store.list_edges("arm").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Has);
        assert_eq!(edges[0].a, "srv-1");
    }

    #[tokio::test]
    async fn test_missing_node_id_rejected() {
        let store = Arc::new(MemoryStore::new());
        let importer = GraphMlImporter::new(store.clone());
        let broken = SAMPLE.replace("NodeID", "SomethingElse");
        let err = importer.import_graph(&broken, Some("arm")).await.unwrap_err();
        assert!(matches!(err, ModelError::Codec(_)));
        // nothing half-loaded left behind
        assert!(!store.graph_exists("arm").await.unwrap());
    }

    #[tokio::test]
    async fn test_roundtrip_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let importer = GraphMlImporter::new(store.clone());
        let exporter = GraphMlExporter::new(store.clone());

        importer.import_graph(SAMPLE, Some("g1")).await.unwrap();
        let first = exporter.export_graph("g1").await.unwrap();

        importer.import_graph(&first, Some("g2")).await.unwrap();
        let second = exporter.export_graph("g2").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_graph_id_assigned_at_import() {
        let store = Arc::new(MemoryStore::new());
        let importer = GraphMlImporter::new(store.clone());
        let g1 = importer.import_graph(SAMPLE, None).await.unwrap();
        let g2 = importer.import_graph(SAMPLE, None).await.unwrap();
        assert_ne!(g1, g2);
        // same NodeIDs in both, independent partitions
        store.get_node(&g1, "srv-1").await.unwrap();
        store.get_node(&g2, "srv-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_json_properties_survive_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        store.create_graph("g").await.unwrap();
        let mut node = GraphNode::new("srv", NodeClass::NetworkNode, "Server", "srv");
        node.set_json_property(prop::CAPACITIES, &Capacities::new().with_core(8))
            .unwrap();
        store.add_node("g", node).await.unwrap();

        let exporter = GraphMlExporter::new(store.clone());
        let xml = exporter.export_graph("g").await.unwrap();
        let importer = GraphMlImporter::new(store.clone());
        importer.import_graph(&xml, Some("g2")).await.unwrap();

        let restored = store.get_node("g2", "srv").await.unwrap();
        let caps: Capacities = restored.json_property(prop::CAPACITIES).unwrap().unwrap();
        assert_eq!(caps.core, 8);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arm.graphml");

        let store = Arc::new(MemoryStore::new());
        let importer = GraphMlImporter::new(store.clone());
        let exporter = GraphMlExporter::new(store.clone());
        importer.import_graph(SAMPLE, Some("g1")).await.unwrap();
        exporter.export_graph_to_file("g1", &path).await.unwrap();

        let g2 = importer
            .import_graph_from_file(&path, None)
            .await
            .unwrap();
        assert_eq!(
            exporter.export_graph("g1").await.unwrap(),
            exporter.export_graph(&g2).await.unwrap()
        );
    }
}
