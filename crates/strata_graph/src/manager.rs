// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered set of graphs sharing broadcast heightmaps.
//!
//! Graphs are layered in a fixed order. A `Broadcast` node publishes its
//! input under a tag, and `Receive` nodes of every graph placed *after* the
//! publishing one can read it. Values never flow back to an earlier graph,
//! so two graphs broadcasting to each other can not loop.

use crate::attribute::StringAttribute;
use crate::config::ConfigOverride;
use crate::data::Heightmap;
use crate::evaluation::UpdateReport;
use crate::events::{EventBus, ManagerEvent, SubscriptionId};
use crate::graph::Graph;
use crate::node::{NodeFactory, NodeId};
use crate::nodes::{BROADCAST_TYPE, OUTPUT, RECEIVE_TYPE, TAG};
use crate::serialization::{DocumentError, DocumentFormat, LoadSummary, FORMAT_VERSION};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Broadcast values visible to a graph, by tag
pub type BroadcastMap = IndexMap<String, Heightmap>;

/// Tag under which a `Broadcast` node publishes
pub fn broadcast_tag(graph_id: &str, node_id: &NodeId) -> String {
    format!("{}@{}", node_id, graph_id)
}

/// Value published by a `Broadcast` node
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Publishing graph
    pub graph_id: String,
    /// Published heightmap
    pub value: Heightmap,
}

/// What a lenient project load kept and skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSummary {
    /// Per-graph summaries, in graph order
    pub graphs: IndexMap<String, LoadSummary>,
    /// Graphs listed in the order but missing or unusable
    pub graphs_skipped: usize,
}

impl ProjectSummary {
    /// Whether every graph was restored completely
    pub fn is_complete(&self) -> bool {
        self.graphs_skipped == 0 && self.graphs.values().all(LoadSummary::is_complete)
    }
}

/// Graphs evaluated in order, earlier graphs feeding later ones
#[derive(Debug, Default)]
pub struct GraphManager {
    /// Project ID
    pub id: String,
    graphs: IndexMap<String, Graph>,
    /// Counter used to generate graph IDs
    id_counter: u64,
    broadcasts: IndexMap<String, Broadcast>,
    events: EventBus<ManagerEvent>,
}

impl GraphManager {
    /// Create an empty manager
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Append a graph to the order.
    ///
    /// Without an explicit ID, one is generated from the manager's counter.
    pub fn add_graph(&mut self, mut graph: Graph, graph_id: Option<&str>) -> Result<String, ManagerError> {
        let graph_id = match graph_id {
            Some(id) if self.graphs.contains_key(id) => {
                return Err(ManagerError::DuplicateGraph(id.to_string()));
            }
            Some(id) => id.to_string(),
            None => loop {
                let id = self.id_counter.to_string();
                self.id_counter += 1;
                if !self.graphs.contains_key(&id) {
                    break id;
                }
            },
        };

        graph.id = graph_id.clone();
        graph.broadcasts.clear();
        self.graphs.insert(graph_id.clone(), graph);
        tracing::debug!("Added graph {} at position {}", graph_id, self.graphs.len() - 1);

        self.sync_broadcasts();
        self.events.emit(ManagerEvent::GraphAdded(graph_id.clone()));
        Ok(graph_id)
    }

    /// Remove a graph and withdraw what it published
    pub fn remove_graph(&mut self, graph_id: &str) -> Result<Graph, ManagerError> {
        let mut graph = self
            .graphs
            .shift_remove(graph_id)
            .ok_or_else(|| ManagerError::GraphNotFound(graph_id.to_string()))?;
        graph.broadcasts.clear();

        let withdrawn: Vec<String> = self
            .broadcasts
            .iter()
            .filter(|(_, b)| b.graph_id == graph_id)
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in withdrawn {
            self.broadcasts.shift_remove(&tag);
            self.events.emit(ManagerEvent::BroadcastTagRemoved(tag));
        }

        self.sync_broadcasts();
        tracing::debug!("Removed graph {}", graph_id);
        self.events
            .emit(ManagerEvent::GraphRemoved(graph_id.to_string()));
        Ok(graph)
    }

    /// Remove every graph and reset the ID counter
    pub fn clear(&mut self) {
        self.graphs.clear();
        self.broadcasts.clear();
        self.id_counter = 0;
        tracing::debug!("Cleared project {}", self.id);
    }

    /// Get a graph by ID
    pub fn graph(&self, graph_id: &str) -> Option<&Graph> {
        self.graphs.get(graph_id)
    }

    /// Get a mutable graph by ID
    pub fn graph_mut(&mut self, graph_id: &str) -> Option<&mut Graph> {
        self.graphs.get_mut(graph_id)
    }

    /// Graphs in evaluation order
    pub fn graphs(&self) -> impl Iterator<Item = (&str, &Graph)> {
        self.graphs.iter().map(|(id, g)| (id.as_str(), g))
    }

    /// Graph IDs in evaluation order
    pub fn graph_order(&self) -> Vec<&str> {
        self.graphs.keys().map(String::as_str).collect()
    }

    /// Position of a graph in the order
    pub fn graph_order_index(&self, graph_id: &str) -> Option<usize> {
        self.graphs.get_index_of(graph_id)
    }

    /// Number of graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether the manager holds no graph
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Counter used to generate graph IDs
    pub fn id_counter(&self) -> u64 {
        self.id_counter
    }

    /// Reorder the graphs; `order` must list every graph exactly once
    pub fn set_graph_order<S: AsRef<str>>(&mut self, order: &[S]) -> Result<(), ManagerError> {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_ref(), i))
            .collect();
        if position.len() != order.len()
            || order.len() != self.graphs.len()
            || !self.graphs.keys().all(|id| position.contains_key(id.as_str()))
        {
            let listed: Vec<&str> = order.iter().map(AsRef::as_ref).collect();
            return Err(ManagerError::InvalidOrder(listed.join(", ")));
        }

        self.graphs
            .sort_by(|a, _, b, _| position[a.as_str()].cmp(&position[b.as_str()]));
        tracing::debug!("Graph order: {:?}", self.graph_order());
        self.sync_broadcasts();
        Ok(())
    }

    /// Whether `graph_id` comes after `ref_graph_id` in the order, i.e.
    /// receives what `ref_graph_id` broadcasts
    pub fn is_graph_above(&self, graph_id: &str, ref_graph_id: &str) -> bool {
        match (
            self.graphs.get_index_of(graph_id),
            self.graphs.get_index_of(ref_graph_id),
        ) {
            (Some(graph), Some(reference)) => graph > reference,
            _ => false,
        }
    }

    /// Currently published tags
    pub fn broadcast_tags(&self) -> impl Iterator<Item = &str> {
        self.broadcasts.keys().map(String::as_str)
    }

    /// Value published under `tag`
    pub fn broadcast(&self, tag: &str) -> Option<&Broadcast> {
        self.broadcasts.get(tag)
    }

    /// Update every graph in order.
    ///
    /// After each graph, its broadcasts are republished and the `Receive`
    /// nodes of later graphs that see a changed value become dirty, so they
    /// recompute within the same call.
    pub fn update(&mut self) -> IndexMap<String, UpdateReport> {
        let mut reports = IndexMap::with_capacity(self.graphs.len());
        for index in 0..self.graphs.len() {
            let Some((graph_id, graph)) = self.graphs.get_index_mut(index) else {
                continue;
            };
            let graph_id = graph_id.clone();
            tracing::debug!("Updating graph {}", graph_id);
            let report = graph.update();

            self.publish(index);
            reports.insert(graph_id, report);
        }
        reports
    }

    /// Step every seed of every graph; returns the number of reseeded nodes
    pub fn reseed(&mut self, backward: bool) -> usize {
        self.graphs.values_mut().map(|g| g.reseed(backward)).sum()
    }

    /// Register an event callback
    pub fn subscribe(&mut self, callback: impl FnMut(&ManagerEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    /// Remove an event callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Refresh what the graph at `index` publishes
    fn publish(&mut self, index: usize) {
        let Some((graph_id, graph)) = self.graphs.get_index(index) else {
            return;
        };

        let mut live = HashSet::new();
        let mut added = Vec::new();
        for node in graph.nodes().filter(|n| n.node_type == BROADCAST_TYPE) {
            let Some(value) = graph.get_value_ref::<Heightmap>(node.id.as_str(), OUTPUT) else {
                continue;
            };
            let tag = broadcast_tag(graph_id, &node.id);
            live.insert(tag.clone());

            match self.broadcasts.get_mut(&tag) {
                Some(current) if current.graph_id == *graph_id && current.value == *value => {}
                Some(current) => {
                    current.graph_id = graph_id.clone();
                    current.value = value.clone();
                }
                None => {
                    added.push(tag.clone());
                    self.broadcasts.insert(
                        tag,
                        Broadcast {
                            graph_id: graph_id.clone(),
                            value: value.clone(),
                        },
                    );
                }
            }
        }

        let removed: Vec<String> = self
            .broadcasts
            .iter()
            .filter(|(tag, b)| b.graph_id == *graph_id && !live.contains(tag.as_str()))
            .map(|(tag, _)| tag.clone())
            .collect();
        for tag in &removed {
            self.broadcasts.shift_remove(tag);
        }

        for tag in added {
            tracing::debug!("New broadcast tag {}", tag);
            self.events.emit(ManagerEvent::BroadcastTagAdded(tag));
        }
        for tag in removed {
            tracing::debug!("Broadcast tag {} withdrawn", tag);
            self.events.emit(ManagerEvent::BroadcastTagRemoved(tag));
        }
        self.sync_broadcasts();
    }

    /// Hand every graph the broadcasts of the graphs before it
    fn sync_broadcasts(&mut self) {
        let published: Vec<(usize, &str, &Heightmap)> = self
            .broadcasts
            .iter()
            .filter_map(|(tag, b)| {
                let source = self.graphs.get_index_of(&b.graph_id)?;
                Some((source, tag.as_str(), &b.value))
            })
            .collect();

        for (index, graph) in self.graphs.values_mut().enumerate() {
            let visible: Vec<(&str, &Heightmap)> = published
                .iter()
                .filter(|(source, ..)| *source < index)
                .map(|&(_, tag, value)| (tag, value))
                .collect();
            graph.receive_broadcasts(&visible);
        }
    }

    /// Serialize every graph to a project document tree
    pub fn json_to(&self) -> Value {
        let graphs: Map<String, Value> = self
            .graphs
            .iter()
            .map(|(id, graph)| (id.clone(), graph.json_to()))
            .collect();

        // Broadcast values are not stored, they are recomputed on update
        json!({
            "id": self.id,
            "version": FORMAT_VERSION,
            "strata_version": env!("CARGO_PKG_VERSION"),
            "id_counter": self.id_counter,
            "graph_order": self.graph_order(),
            "graphs": graphs,
        })
    }

    /// Replace the content with a project document tree
    pub fn json_from(
        &mut self,
        doc: &Value,
        factory: &dyn NodeFactory,
    ) -> Result<ProjectSummary, DocumentError> {
        self.json_from_with(doc, factory, &ConfigOverride::default())
    }

    /// Like [`GraphManager::json_from`], overriding the config of every graph
    pub fn json_from_with(
        &mut self,
        doc: &Value,
        factory: &dyn NodeFactory,
        overrides: &ConfigOverride,
    ) -> Result<ProjectSummary, DocumentError> {
        if !doc.is_object() {
            return Err(DocumentError::Malformed(
                "project document is not an object".to_string(),
            ));
        }
        self.clear();
        let mut summary = ProjectSummary::default();

        if let Some(version) = doc.get("version").and_then(Value::as_u64) {
            if version > u64::from(FORMAT_VERSION) {
                tracing::warn!(
                    "Project version {} is newer than supported version {}",
                    version,
                    FORMAT_VERSION
                );
            }
        }
        if let Some(id) = doc.get("id").and_then(Value::as_str) {
            self.id = id.to_string();
        }

        let graph_docs = doc.get("graphs").and_then(Value::as_object);
        let order = doc
            .get("graph_order")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for entry in order {
            let Some(graph_id) = entry.as_str() else {
                tracing::warn!("Skipping graph with invalid ID: {}", entry);
                summary.graphs_skipped += 1;
                continue;
            };
            let Some(graph_doc) = graph_docs.and_then(|g| g.get(graph_id)) else {
                tracing::warn!("Graph {} listed in the order but missing", graph_id);
                summary.graphs_skipped += 1;
                continue;
            };

            let mut graph = Graph::default();
            let loaded = match graph.json_from_with(graph_doc, factory, overrides) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!("Skipping graph {}: {}", graph_id, e);
                    summary.graphs_skipped += 1;
                    continue;
                }
            };
            match self.add_graph(graph, Some(graph_id)) {
                Ok(id) => {
                    summary.graphs.insert(id, loaded);
                }
                Err(e) => {
                    tracing::warn!("Skipping graph {}: {}", graph_id, e);
                    summary.graphs_skipped += 1;
                }
            }
        }

        let counter = doc.get("id_counter").and_then(Value::as_u64).unwrap_or(0);
        self.id_counter = self.id_counter.max(counter);

        tracing::info!(
            "Loaded project {}: {} graphs, {} skipped",
            self.id,
            summary.graphs.len(),
            summary.graphs_skipped
        );
        Ok(summary)
    }

    /// Encode the project
    pub fn to_bytes(&self, format: DocumentFormat) -> Result<Vec<u8>, DocumentError> {
        format.encode(&self.json_to())
    }

    /// Replace the content with an encoded project
    pub fn from_bytes(
        &mut self,
        bytes: &[u8],
        format: DocumentFormat,
        factory: &dyn NodeFactory,
    ) -> Result<ProjectSummary, DocumentError> {
        let doc = format.decode(bytes)?;
        self.json_from(&doc, factory)
    }

    /// Save the project to a file
    pub fn save_to_file(&self, path: &Path, format: DocumentFormat) -> Result<(), DocumentError> {
        std::fs::write(path, self.to_bytes(format)?)?;
        tracing::info!("Saved project {} to {}", self.id, path.display());
        Ok(())
    }

    /// Replace the content with a project file
    pub fn load_from_file(
        &mut self,
        path: &Path,
        format: DocumentFormat,
        factory: &dyn NodeFactory,
    ) -> Result<ProjectSummary, DocumentError> {
        self.load_from_file_with(path, format, factory, &ConfigOverride::default())
    }

    /// Like [`GraphManager::load_from_file`], with a config override
    pub fn load_from_file_with(
        &mut self,
        path: &Path,
        format: DocumentFormat,
        factory: &dyn NodeFactory,
        overrides: &ConfigOverride,
    ) -> Result<ProjectSummary, DocumentError> {
        let bytes = std::fs::read(path)?;
        let doc = format.decode(&bytes)?;
        self.json_from_with(&doc, factory, overrides)
    }
}

impl Graph {
    /// Broadcast values visible to this graph
    pub fn broadcasts(&self) -> &BroadcastMap {
        &self.broadcasts
    }

    /// Replace the visible broadcasts; `Receive` nodes listening to a tag
    /// whose value changed become dirty
    pub(crate) fn receive_broadcasts(&mut self, visible: &[(&str, &Heightmap)]) {
        let mut changed: Vec<String> = self
            .broadcasts
            .keys()
            .filter(|tag| !visible.iter().any(|(t, _)| *t == tag.as_str()))
            .cloned()
            .collect();
        for tag in &changed {
            self.broadcasts.shift_remove(tag);
        }

        for &(tag, value) in visible {
            if self.broadcasts.get(tag) != Some(value) {
                self.broadcasts.insert(tag.to_string(), value.clone());
                changed.push(tag.to_string());
            }
        }

        for tag in &changed {
            let receivers: Vec<NodeId> = self
                .nodes
                .values()
                .filter(|n| n.node_type == RECEIVE_TYPE)
                .filter(|n| n.attr::<StringAttribute>(TAG).is_ok_and(|t| t == *tag))
                .map(|n| n.id.clone())
                .collect();
            for id in receivers {
                tracing::debug!("Broadcast {} changed, {} dirty", tag, id);
                self.touch(id.as_str());
            }
        }
    }
}

/// Error when editing the graph set of a manager
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A graph with this ID already exists
    #[error("Graph ID already used: {0}")]
    DuplicateGraph(String),

    /// Graph not found
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    /// Order that is not a permutation of the current graphs
    #[error("Invalid graph order: {0}")]
    InvalidOrder(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::FloatAttribute;
    use crate::config::GraphConfig;
    use crate::nodes::{create_terrain_registry, INPUT};
    use crate::node::{NodeRegistry, NodeState};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Layers {
        manager: GraphManager,
        constant: NodeId,
        broadcaster: NodeId,
        receiver: NodeId,
    }

    /// "base" broadcasts a constant, "layer" receives it on a smaller grid
    fn layers(registry: &NodeRegistry) -> Layers {
        let mut base = Graph::new("base", GraphConfig::new([8, 8], [1, 1], 0.0));
        let constant = base.add_node_of_type(registry, "Constant").unwrap();
        let broadcaster = base.add_node_of_type(registry, BROADCAST_TYPE).unwrap();
        base.connect(constant.as_str(), OUTPUT, broadcaster.as_str(), INPUT)
            .unwrap();
        base.set_attribute::<FloatAttribute>(constant.as_str(), "value", 0.25)
            .unwrap();

        let mut layer = Graph::new("layer", GraphConfig::new([4, 4], [1, 1], 0.0));
        let receiver = layer.add_node_of_type(registry, RECEIVE_TYPE).unwrap();
        layer
            .set_attribute::<StringAttribute>(
                receiver.as_str(),
                TAG,
                broadcast_tag("base", &broadcaster),
            )
            .unwrap();

        let mut manager = GraphManager::new("project");
        manager.add_graph(base, Some("base")).unwrap();
        manager.add_graph(layer, Some("layer")).unwrap();
        Layers {
            manager,
            constant,
            broadcaster,
            receiver,
        }
    }

    fn received(manager: &GraphManager, receiver: &NodeId) -> Option<Heightmap> {
        manager
            .graph("layer")?
            .get_value_ref::<Heightmap>(receiver.as_str(), OUTPUT)
            .cloned()
    }

    #[test]
    fn test_graph_ids_and_order() {
        let mut manager = GraphManager::new("project");
        assert_eq!(manager.add_graph(Graph::default(), None).unwrap(), "0");
        assert_eq!(manager.add_graph(Graph::default(), Some("1")).unwrap(), "1");
        // Generated IDs skip explicit ones
        assert_eq!(manager.add_graph(Graph::default(), None).unwrap(), "2");
        assert!(matches!(
            manager.add_graph(Graph::default(), Some("0")),
            Err(ManagerError::DuplicateGraph(_))
        ));
        assert_eq!(manager.graph("2").map(|g| g.id.as_str()), Some("2"));

        assert!(manager.is_graph_above("2", "0"));
        assert!(!manager.is_graph_above("0", "2"));
        assert!(!manager.is_graph_above("0", "0"));
        assert!(!manager.is_graph_above("missing", "0"));

        assert!(matches!(
            manager.set_graph_order(&["0", "1"]),
            Err(ManagerError::InvalidOrder(_))
        ));
        assert!(matches!(
            manager.set_graph_order(&["0", "0", "1"]),
            Err(ManagerError::InvalidOrder(_))
        ));
        manager.set_graph_order(&["2", "0", "1"]).unwrap();
        assert_eq!(manager.graph_order(), vec!["2", "0", "1"]);
        assert_eq!(manager.graph_order_index("1"), Some(2));

        manager.remove_graph("0").unwrap();
        assert_eq!(manager.graph_order(), vec!["2", "1"]);
        assert!(matches!(
            manager.remove_graph("0"),
            Err(ManagerError::GraphNotFound(_))
        ));
    }

    #[test]
    fn test_broadcast_reaches_later_graph() {
        let registry = create_terrain_registry();
        let Layers {
            mut manager,
            constant,
            broadcaster,
            receiver,
        } = layers(&registry);

        let reports = manager.update();
        assert_eq!(reports["layer"].computed, vec![receiver.clone()]);
        let tag = broadcast_tag("base", &broadcaster);
        assert_eq!(manager.broadcast_tags().collect::<Vec<_>>(), vec![tag.as_str()]);
        assert_eq!(received(&manager, &receiver), Some(Heightmap::filled([4, 4], 0.25)));

        // Nothing changed, nothing recomputed
        let reports = manager.update();
        assert!(reports.values().all(UpdateReport::is_empty));

        manager
            .graph_mut("base")
            .unwrap()
            .set_attribute::<FloatAttribute>(constant.as_str(), "value", 0.5)
            .unwrap();
        let reports = manager.update();
        assert_eq!(reports["layer"].computed, vec![receiver.clone()]);
        assert_eq!(received(&manager, &receiver), Some(Heightmap::filled([4, 4], 0.5)));
    }

    #[test]
    fn test_broadcast_never_flows_backwards() {
        let registry = create_terrain_registry();
        let Layers {
            mut manager,
            receiver,
            ..
        } = layers(&registry);
        manager.set_graph_order(&["layer", "base"]).unwrap();

        manager.update();
        assert_eq!(received(&manager, &receiver), None);
        assert!(manager.graph("layer").unwrap().broadcasts().is_empty());

        manager.set_graph_order(&["base", "layer"]).unwrap();
        assert_eq!(
            manager.graph("layer").unwrap().node_state(receiver.as_str()),
            Some(NodeState::Dirty)
        );
        manager.update();
        assert_eq!(received(&manager, &receiver), Some(Heightmap::filled([4, 4], 0.25)));
    }

    #[test]
    fn test_removed_broadcast_is_withdrawn() {
        let registry = create_terrain_registry();
        let Layers {
            mut manager,
            broadcaster,
            receiver,
            ..
        } = layers(&registry);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        manager.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        manager.update();
        manager
            .graph_mut("base")
            .unwrap()
            .remove_node(broadcaster.as_str())
            .unwrap();
        let reports = manager.update();

        assert_eq!(manager.broadcast_tags().count(), 0);
        assert_eq!(reports["layer"].computed, vec![receiver.clone()]);
        assert_eq!(received(&manager, &receiver), None);

        let tag = broadcast_tag("base", &broadcaster);
        assert_eq!(
            *events.borrow(),
            vec![
                ManagerEvent::BroadcastTagAdded(tag.clone()),
                ManagerEvent::BroadcastTagRemoved(tag),
            ]
        );
    }

    #[test]
    fn test_removing_publisher_graph_dirties_receivers() {
        let registry = create_terrain_registry();
        let Layers {
            mut manager,
            receiver,
            ..
        } = layers(&registry);
        manager.update();

        let base = manager.remove_graph("base").unwrap();
        assert!(base.broadcasts().is_empty());
        assert_eq!(manager.broadcast_tags().count(), 0);
        assert_eq!(
            manager.graph("layer").unwrap().node_state(receiver.as_str()),
            Some(NodeState::Dirty)
        );
    }

    #[test]
    fn test_project_document_round_trip() {
        let registry = create_terrain_registry();
        let Layers {
            mut manager,
            receiver,
            ..
        } = layers(&registry);
        manager.add_graph(Graph::default(), None).unwrap();
        manager.update();

        let doc = manager.json_to();
        assert_eq!(doc["graph_order"], json!(["base", "layer", "0"]));
        assert_eq!(doc["id_counter"], 1);
        assert!(doc["graphs"]["layer"]["nodes"].is_array());

        for format in DocumentFormat::ALL {
            let bytes = manager.to_bytes(format).unwrap();
            let mut loaded = GraphManager::default();
            let summary = loaded.from_bytes(&bytes, format, &registry).unwrap();
            assert!(summary.is_complete(), "{:?}: {:?}", format, summary);
            assert_eq!(loaded.id, "project");
            assert_eq!(loaded.graph_order(), vec!["base", "layer", "0"]);
            assert_eq!(loaded.id_counter(), 1);
            assert_eq!(loaded.broadcast_tags().count(), 0);

            loaded.update();
            assert_eq!(received(&loaded, &receiver), Some(Heightmap::filled([4, 4], 0.25)));
        }
    }

    #[test]
    fn test_lenient_project_load() {
        let registry = create_terrain_registry();
        let doc = json!({
            "id": "partial",
            "graph_order": ["a", 3, "missing", "broken"],
            "graphs": {
                "a": Graph::new("a", GraphConfig::default()).json_to(),
                "broken": [],
            },
        });
        let mut manager = GraphManager::default();
        let summary = manager.json_from(&doc, &registry).unwrap();
        assert_eq!(summary.graphs_skipped, 3);
        assert!(!summary.is_complete());
        assert_eq!(manager.graph_order(), vec!["a"]);

        assert!(matches!(
            manager.json_from(&json!([]), &registry),
            Err(DocumentError::Malformed(_))
        ));
    }

    #[test]
    fn test_reseed_every_graph() {
        let registry = create_terrain_registry();
        let mut manager = GraphManager::new("project");
        for _ in 0..2 {
            let mut graph = Graph::default();
            graph.add_node_of_type(&registry, "WhiteNoise").unwrap();
            manager.add_graph(graph, None).unwrap();
        }
        assert_eq!(manager.reseed(false), 2);
    }
}
