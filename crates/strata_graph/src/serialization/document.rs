// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph documents.
//!
//! Loading is lenient: unknown node types, unusable links and malformed
//! attribute fields are skipped with a warning and counted in a
//! [`LoadSummary`], never aborting the rest of the document.

use super::batch;
use super::{insert_field, DocumentError, DocumentFormat, FieldSerialize};
use crate::config::ConfigOverride;
use crate::graph::Graph;
use crate::link::Link;
use crate::node::{node_type_from_id, Node, NodeFactory, NodeId};
use crate::port::Port;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Version of the document layout written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// What a lenient load kept and skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Nodes created
    pub nodes_loaded: usize,
    /// Nodes whose type or ID could not be used
    pub nodes_skipped: usize,
    /// Nodes created with some fields left at their defaults
    pub nodes_partial: usize,
    /// Links restored
    pub links_loaded: usize,
    /// Links dropped
    pub links_skipped: usize,
}

impl LoadSummary {
    /// Whether everything in the document was restored
    pub fn is_complete(&self) -> bool {
        self.nodes_skipped == 0 && self.nodes_partial == 0 && self.links_skipped == 0
    }
}

impl FieldSerialize for Node {
    fn serialize_field(&self, field: &str, doc: &mut Value) -> bool {
        let mut attr = Value::Object(Map::new());
        let mut ok = true;
        for (key, attribute) in &self.attributes {
            ok &= attribute.serialize_field(key, &mut attr);
        }

        let data = json!({
            "id": self.id,
            "type": self.node_type,
            "label": self.label,
            "auto_update": self.auto_update,
            "attr": attr,
        });
        insert_field(doc, field, data) && ok
    }

    fn deserialize_field(&mut self, field: &str, doc: &Value) -> bool {
        let Some(data) = doc.get(field).and_then(Value::as_object) else {
            tracing::warn!("Node {} has no '{}' object, keeping defaults", self.id, field);
            return false;
        };

        let mut ok = true;
        if let Some(label) = data.get("label").and_then(Value::as_str) {
            self.label = label.to_string();
        }
        match data.get("auto_update").map(Value::as_bool) {
            Some(Some(enabled)) => self.auto_update = enabled,
            Some(None) => {
                tracing::warn!("Node {}: malformed 'auto_update'", self.id);
                ok = false;
            }
            None => {}
        }

        let Some(attr) = data.get("attr").filter(|a| a.is_object()) else {
            tracing::warn!("Node {} has no attributes in document, keeping defaults", self.id);
            return false;
        };
        for (key, attribute) in self.attributes.iter_mut() {
            if !attribute.deserialize_field(key, attr) {
                tracing::warn!("Node {}: attribute '{}' not fully restored", self.id, key);
                ok = false;
            }
        }
        if let Some(stored) = attr.as_object() {
            for key in stored.keys().filter(|k| !self.attributes.contains_key(k.as_str())) {
                tracing::debug!("Node {}: ignoring unknown attribute '{}'", self.id, key);
            }
        }
        ok
    }
}

fn link_to_json(link: &Link) -> Value {
    json!({
        "node_id_from": link.node_id_from,
        "port_id_from": link.port_id_from,
        "port_hash_id_from": link.port_id_from.hash_id(),
        "node_id_to": link.node_id_to,
        "port_id_to": link.port_id_to,
        "port_hash_id_to": link.port_id_to.hash_id(),
    })
}

/// Port named by a link endpoint: by ID first, then by hash ID
fn resolve_port<'a>(
    graph: &'a Graph,
    entry: &Value,
    node_key: &str,
    port_key: &str,
    hash_key: &str,
) -> Option<(&'a NodeId, &'a Port)> {
    let node = graph.node(entry.get(node_key)?.as_str()?)?;
    let by_id = entry
        .get(port_key)
        .and_then(Value::as_str)
        .and_then(|id| node.port(id));
    let port = by_id.or_else(|| {
        let hash = u32::try_from(entry.get(hash_key)?.as_u64()?).ok()?;
        let port = node.port_by_hash(hash)?;
        tracing::debug!("Resolved port {} of {} by hash", port.id, node.id);
        Some(port)
    })?;
    Some((&node.id, port))
}

impl Graph {
    /// Serialize the whole graph to a document tree
    pub fn json_to(&self) -> Value {
        let mut doc = json!({
            "id": self.id,
            "version": FORMAT_VERSION,
            "strata_version": env!("CARGO_PKG_VERSION"),
        });
        batch::write_fields(&self.config, &mut doc);

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            let mut entry = Value::Object(Map::new());
            node.serialize_field("data", &mut entry);
            nodes.push(entry);
        }

        doc["id_counter"] = json!(self.id_counter);
        doc["node_ids"] = json!(self.nodes.keys().collect::<Vec<_>>());
        doc["nodes"] = Value::Array(nodes);
        doc["links"] = Value::Array(self.links().iter().map(link_to_json).collect());
        doc
    }

    /// Replace the graph content with a document tree.
    ///
    /// Only a document that is not an object is rejected as a whole.
    pub fn json_from(
        &mut self,
        doc: &Value,
        factory: &dyn NodeFactory,
    ) -> Result<LoadSummary, DocumentError> {
        self.json_from_with(doc, factory, &ConfigOverride::default())
    }

    /// Like [`Graph::json_from`], replacing parts of the stored config
    /// before any node is created
    pub fn json_from_with(
        &mut self,
        doc: &Value,
        factory: &dyn NodeFactory,
        overrides: &ConfigOverride,
    ) -> Result<LoadSummary, DocumentError> {
        if !doc.is_object() {
            return Err(DocumentError::Malformed(
                "graph document is not an object".to_string(),
            ));
        }
        let mut summary = LoadSummary::default();
        self.clear();

        match doc.get("version").and_then(Value::as_u64) {
            Some(version) if version > u64::from(FORMAT_VERSION) => tracing::warn!(
                "Document version {} is newer than supported version {}, loading what is understood",
                version,
                FORMAT_VERSION
            ),
            Some(_) => {}
            None => tracing::warn!("Document has no version, assuming {}", FORMAT_VERSION),
        }

        if let Some(id) = doc.get("id").and_then(Value::as_str) {
            self.id = id.to_string();
        }

        let mut config = self.config.clone();
        let skipped = batch::read_fields(&mut config, doc);
        if skipped > 0 {
            tracing::warn!("{} config fields missing or malformed", skipped);
        }
        match config.validate() {
            Ok(()) => self.config = config,
            Err(e) => tracing::warn!("Ignoring document config: {}", e),
        }
        if !overrides.is_empty() {
            let config = overrides.apply(&self.config);
            match config.validate() {
                Ok(()) => self.config = config,
                Err(e) => tracing::warn!("Ignoring config override: {}", e),
            }
        }

        // Node bodies, keyed by ID
        let mut bodies: HashMap<&str, &Value> = HashMap::new();
        for entry in doc.get("nodes").and_then(Value::as_array).into_iter().flatten() {
            match entry.get("data").and_then(|d| d.get("id")).and_then(Value::as_str) {
                Some(id) => {
                    bodies.insert(id, entry);
                }
                None => tracing::warn!("Skipping node entry without ID"),
            }
        }

        let declared: Vec<&str> = match doc.get("node_ids").and_then(Value::as_array) {
            Some(ids) => ids.iter().filter_map(Value::as_str).collect(),
            None => {
                tracing::warn!("Document has no 'node_ids', using node entries");
                doc.get("nodes")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|e| e.get("data")?.get("id")?.as_str())
                    .collect()
            }
        };

        for id in declared {
            let body = bodies.get(id).copied();
            let type_name = body
                .and_then(|b| b["data"].get("type"))
                .and_then(Value::as_str)
                .unwrap_or_else(|| node_type_from_id(id));

            let mut node = match factory.create_node(type_name, NodeId::new(id), &self.config) {
                Ok(node) => node,
                Err(e) => {
                    tracing::warn!("Skipping node {}: {}", id, e);
                    summary.nodes_skipped += 1;
                    continue;
                }
            };

            let complete = match body {
                Some(body) => node.deserialize_field("data", body),
                None => {
                    tracing::warn!("Node {} has no body, keeping defaults", id);
                    false
                }
            };
            if let Err(e) = self.add_node(node) {
                tracing::warn!("Skipping node {}: {}", id, e);
                summary.nodes_skipped += 1;
                continue;
            }
            summary.nodes_loaded += 1;
            if !complete {
                summary.nodes_partial += 1;
            }
        }

        if let Some(counter) = doc.get("id_counter").and_then(Value::as_u64) {
            self.id_counter = self.id_counter.max(counter);
        }

        for entry in doc.get("links").and_then(Value::as_array).into_iter().flatten() {
            let endpoints = resolve_port(self, entry, "node_id_from", "port_id_from", "port_hash_id_from")
                .zip(resolve_port(self, entry, "node_id_to", "port_id_to", "port_hash_id_to"))
                .map(|((fn_id, fp), (tn_id, tp))| {
                    (fn_id.clone(), fp.id.clone(), tn_id.clone(), tp.id.clone())
                });
            let Some((from_node, from_port, to_node, to_port)) = endpoints else {
                tracing::warn!("Skipping link with unknown endpoint: {}", entry);
                summary.links_skipped += 1;
                continue;
            };

            match self.connect(
                from_node.as_str(),
                from_port.as_str(),
                to_node.as_str(),
                to_port.as_str(),
            ) {
                Ok(_) => summary.links_loaded += 1,
                Err(e) => {
                    tracing::warn!("Skipping link {}:{} -> {}:{}: {}", from_node, from_port, to_node, to_port, e);
                    summary.links_skipped += 1;
                }
            }
        }

        tracing::info!(
            "Loaded graph {}: {} nodes, {} links",
            self.id,
            summary.nodes_loaded,
            summary.links_loaded
        );
        Ok(summary)
    }

    /// Encode the graph
    pub fn to_bytes(&self, format: DocumentFormat) -> Result<Vec<u8>, DocumentError> {
        format.encode(&self.json_to())
    }

    /// Replace the graph content with an encoded document
    pub fn from_bytes(
        &mut self,
        bytes: &[u8],
        format: DocumentFormat,
        factory: &dyn NodeFactory,
    ) -> Result<LoadSummary, DocumentError> {
        let doc = format.decode(bytes)?;
        self.json_from(&doc, factory)
    }

    /// Save the graph to a file
    pub fn save_to_file(&self, path: &Path, format: DocumentFormat) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_bytes(format)?)?;
        tracing::info!("Saved graph {} to {}", self.id, path.display());
        Ok(())
    }

    /// Replace the graph content with a document file
    pub fn load_from_file(
        &mut self,
        path: &Path,
        format: DocumentFormat,
        factory: &dyn NodeFactory,
    ) -> Result<LoadSummary, DocumentError> {
        self.load_from_file_with(path, format, factory, &ConfigOverride::default())
    }

    /// Like [`Graph::load_from_file`], with a config override
    pub fn load_from_file_with(
        &mut self,
        path: &Path,
        format: DocumentFormat,
        factory: &dyn NodeFactory,
        overrides: &ConfigOverride,
    ) -> Result<LoadSummary, DocumentError> {
        let bytes = std::fs::read(path)?;
        let doc = format.decode(&bytes)?;
        self.json_from_with(&doc, factory, overrides)
    }
}
