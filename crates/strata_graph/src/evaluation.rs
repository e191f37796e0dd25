// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and scheduling.
//!
//! An update pass orders the dirty nodes with Kahn's algorithm and runs each
//! node's compute function once its producers are done. A failing node is
//! marked [`NodeState::ComputeFailed`] and everything downstream of it is
//! pruned from the pass, while unrelated branches still complete.

use crate::attribute::{Attribute, AttributeError, AttributeKind, AttributeMap};
use crate::config::GraphConfig;
use crate::data::Heightmap;
use crate::events::GraphEvent;
use crate::graph::{Graph, GraphError};
use crate::manager::BroadcastMap;
use crate::node::{Node, NodeId, NodeState};
use crate::port::{DataType, PortData, PortId, PortValue};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};

/// Compute function shared by all nodes of a type
pub type ComputeFn = fn(&ComputeContext<'_>) -> Result<Outputs, ComputeError>;

/// Read-only view handed to a compute function
#[derive(Debug)]
pub struct ComputeContext<'a> {
    node_id: &'a NodeId,
    config: &'a GraphConfig,
    inputs: IndexMap<&'a str, Option<&'a PortValue>>,
    attributes: &'a AttributeMap,
    broadcasts: Option<&'a BroadcastMap>,
}

impl<'a> ComputeContext<'a> {
    /// Create a context without inputs
    pub fn new(node_id: &'a NodeId, config: &'a GraphConfig, attributes: &'a AttributeMap) -> Self {
        Self {
            node_id,
            config,
            inputs: IndexMap::new(),
            attributes,
            broadcasts: None,
        }
    }

    /// Provide the value seen at an input port
    pub fn with_input(mut self, port_id: &'a str, value: Option<&'a PortValue>) -> Self {
        self.inputs.insert(port_id, value);
        self
    }

    /// Provide the broadcast values visible to the graph
    pub fn with_broadcasts(mut self, broadcasts: &'a BroadcastMap) -> Self {
        self.broadcasts = Some(broadcasts);
        self
    }

    /// Node being computed
    pub fn node_id(&self) -> &NodeId {
        self.node_id
    }

    /// Engine configuration
    pub fn config(&self) -> &GraphConfig {
        self.config
    }

    /// Raw value at an input port; `None` when unset or unknown
    pub fn input_value(&self, port_id: &str) -> Option<&'a PortValue> {
        self.inputs.get(port_id).copied().flatten()
    }

    /// Typed value at an optional input port
    pub fn input<T: PortData>(&self, port_id: &str) -> Result<Option<&'a T>, ComputeError> {
        match self.input_value(port_id) {
            None => Ok(None),
            Some(value) => value
                .get::<T>()
                .map(Some)
                .ok_or_else(|| ComputeError::WrongInputType {
                    port: PortId::new(port_id),
                    expected: T::DATA_TYPE,
                    found: value.data_type(),
                }),
        }
    }

    /// Typed value at a required input port
    pub fn required<T: PortData>(&self, port_id: &str) -> Result<&'a T, ComputeError> {
        self.input::<T>(port_id)?
            .ok_or_else(|| ComputeError::MissingInput(PortId::new(port_id)))
    }

    /// Broadcast heightmap published under `tag`
    pub fn broadcast(&self, tag: &str) -> Option<&'a Heightmap> {
        self.broadcasts?.get(tag)
    }

    /// Attribute by key
    pub fn attribute(&self, key: &str) -> Option<&'a Attribute> {
        self.attributes.get(key)
    }

    /// Typed attribute value
    pub fn attr<T: AttributeKind>(&self, key: &str) -> Result<T::Value, ComputeError> {
        let attribute = self
            .attributes
            .get(key)
            .ok_or_else(|| AttributeError::NotFound(key.to_string()))?;
        Ok(attribute.get::<T>()?)
    }
}

/// Values produced by a compute function, by output port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: IndexMap<PortId, PortValue>,
}

impl Outputs {
    /// Create a new empty output set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output value
    pub fn set(&mut self, port_id: impl Into<PortId>, value: impl Into<PortValue>) {
        self.values.insert(port_id.into(), value.into());
    }

    /// Builder form of [`Outputs::set`]
    pub fn with(mut self, port_id: impl Into<PortId>, value: impl Into<PortValue>) -> Self {
        self.set(port_id, value);
        self
    }

    /// Get an output value
    pub fn get(&self, port_id: &str) -> Option<&PortValue> {
        self.values.get(port_id)
    }

    /// Number of values set
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value was set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Error raised by a compute function
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    /// Required input without value
    #[error("Missing required input: {0}")]
    MissingInput(PortId),

    /// Input value of an unexpected type
    #[error("Input {port} holds {found}, expected {expected}")]
    WrongInputType {
        /// Input port
        port: PortId,
        /// Requested type
        expected: DataType,
        /// Stored type
        found: DataType,
    },

    /// Output written to a port the node does not have
    #[error("Unknown output port: {0}")]
    UnknownOutput(PortId),

    /// Output value not accepted by the port type
    #[error("Output {port} expects {expected}, got {found}")]
    OutputTypeMismatch {
        /// Output port
        port: PortId,
        /// Declared port type
        expected: DataType,
        /// Produced type
        found: DataType,
    },

    /// Attribute access failed
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// Node-specific failure
    #[error("{0}")]
    Failed(String),
}

/// Outcome of an update pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Nodes whose compute function succeeded, in evaluation order
    pub computed: Vec<NodeId>,
    /// Nodes with an unset required input; outputs cleared, not computed
    pub skipped: Vec<NodeId>,
    /// Nodes whose compute function failed
    pub failed: Vec<(NodeId, ComputeError)>,
    /// Dirty nodes downstream of a failure, left dirty
    pub pruned: Vec<NodeId>,
}

impl UpdateReport {
    /// Whether no node failed or was pruned
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.pruned.is_empty()
    }

    /// Number of nodes handled by the pass
    pub fn len(&self) -> usize {
        self.computed.len() + self.skipped.len() + self.failed.len() + self.pruned.len()
    }

    /// Whether the pass had nothing to do
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Evaluated {
    Computed,
    Skipped,
}

impl Graph {
    /// Get all nodes in topological order (producers first)
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let all: IndexSet<NodeId> = self.nodes.keys().cloned().collect();
        let order = self.kahn_order(&all);
        if order.len() == all.len() {
            Ok(order)
        } else {
            Err(GraphError::CycleDetected)
        }
    }

    /// Recompute every dirty node.
    ///
    /// Nodes in [`NodeState::ComputeFailed`] are not retried; dirty nodes
    /// downstream of them are pruned.
    pub fn update(&mut self) -> UpdateReport {
        let dirty: IndexSet<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.is_dirty())
            .map(|n| n.id.clone())
            .collect();
        let failed = self.failed_nodes();
        self.run_pass(dirty, failed)
    }

    /// Explicitly recompute one node.
    ///
    /// The node is forced dirty (clearing stale and failed states) and the
    /// pass covers its dirty ancestors, the node itself and its dirty
    /// descendants.
    pub fn update_node(&mut self, node_id: &str) -> Result<UpdateReport, GraphError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(NodeId::new(node_id)))?;
        node.last_error = None;
        self.touch(node_id);

        let mut selected: HashSet<NodeId> = HashSet::new();
        selected.insert(NodeId::new(node_id));
        self.collect_dirty(node_id, &mut selected, |g, id| g.predecessors(id));
        self.collect_dirty(node_id, &mut selected, |g, id| g.successors(id));

        let subset: IndexSet<NodeId> = self
            .nodes
            .keys()
            .filter(|id| selected.contains(*id))
            .cloned()
            .collect();
        let failed = self.failed_nodes();
        Ok(self.run_pass(subset, failed))
    }

    fn failed_nodes(&self) -> HashSet<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.state == NodeState::ComputeFailed)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Walk from `start` through dirty neighbours only
    fn collect_dirty(
        &self,
        start: &str,
        selected: &mut HashSet<NodeId>,
        neighbours: impl Fn(&Graph, &str) -> Vec<NodeId>,
    ) {
        let mut queue: VecDeque<NodeId> = neighbours(self, start).into();
        while let Some(current) = queue.pop_front() {
            if !self.nodes.get(&current).is_some_and(Node::is_dirty) {
                continue;
            }
            if selected.insert(current.clone()) {
                queue.extend(neighbours(self, current.as_str()));
            }
        }
    }

    /// Kahn's algorithm restricted to `subset`; a short result means a cycle
    fn kahn_order(&self, subset: &IndexSet<NodeId>) -> Vec<NodeId> {
        let mut remaining: HashMap<&NodeId, usize> = HashMap::with_capacity(subset.len());
        for id in subset {
            let count = self.nodes.get(id).map_or(0, |node| {
                node.inputs()
                    .filter_map(|p| p.producer())
                    .filter(|p| subset.contains(&p.node))
                    .count()
            });
            remaining.insert(id, count);
        }

        let mut ready: VecDeque<&NodeId> = subset
            .iter()
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(subset.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            for consumer in node.outputs().flat_map(|p| p.consumers()) {
                if let Some(count) = remaining.get_mut(&consumer.node) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(&consumer.node);
                    }
                }
            }
        }
        order
    }

    fn run_pass(&mut self, subset: IndexSet<NodeId>, mut poisoned: HashSet<NodeId>) -> UpdateReport {
        let mut report = UpdateReport::default();
        self.events.emit(GraphEvent::UpdateStarted);

        let order = self.kahn_order(&subset);
        debug_assert_eq!(order.len(), subset.len(), "cycle among dirty nodes");
        if order.len() != subset.len() {
            tracing::error!(
                "Dependency cycle, skipping {} nodes",
                subset.len() - order.len()
            );
        }

        let total = order.len();
        for (index, node_id) in order.into_iter().enumerate() {
            let blocked = self
                .predecessors(node_id.as_str())
                .iter()
                .any(|p| poisoned.contains(p));

            if blocked {
                tracing::debug!("Pruning {} downstream of a failed node", node_id);
                poisoned.insert(node_id.clone());
                report.pruned.push(node_id.clone());
            } else {
                match self.compute_node(&node_id) {
                    Ok(Evaluated::Computed) => report.computed.push(node_id.clone()),
                    Ok(Evaluated::Skipped) => report.skipped.push(node_id.clone()),
                    Err(e) => {
                        poisoned.insert(node_id.clone());
                        report.failed.push((node_id.clone(), e));
                    }
                }
            }

            let progress = 100.0 * (index + 1) as f32 / total as f32;
            self.events
                .emit(GraphEvent::UpdateProgress { node_id, progress });
        }

        self.events.emit(GraphEvent::UpdateFinished);
        tracing::debug!(
            "Update pass: {} computed, {} skipped, {} failed, {} pruned",
            report.computed.len(),
            report.skipped.len(),
            report.failed.len(),
            report.pruned.len()
        );
        report
    }

    /// First required input without a value, if any
    fn missing_input(&self, node: &Node) -> Option<PortId> {
        node.inputs()
            .find(|p| !p.optional && self.get_value(node.id.as_str(), p.id.as_str()).is_none())
            .map(|p| p.id.clone())
    }

    fn compute_node(&mut self, node_id: &NodeId) -> Result<Evaluated, ComputeError> {
        let Some(node) = self.nodes.get(node_id) else {
            return Ok(Evaluated::Skipped);
        };

        if let Some(port) = self.missing_input(node) {
            tracing::debug!(
                "Node {} has no value on required input {}, clearing outputs",
                node_id,
                port
            );
            if let Some(node) = self.nodes.get_mut(node_id) {
                for port in node.ports.values_mut().filter(|p| p.is_output()) {
                    port.value = None;
                }
                node.state = NodeState::Clean;
                node.stale = false;
                node.last_error = None;
            }
            return Ok(Evaluated::Skipped);
        }

        self.events.emit(GraphEvent::ComputeStarted(node_id.clone()));
        tracing::trace!("Computing {}", node_id);

        let result = {
            let nodes = &self.nodes;
            let node = &nodes[node_id];
            let mut ctx = ComputeContext::new(&node.id, &self.config, &node.attributes)
                .with_broadcasts(&self.broadcasts);
            for port in node.inputs() {
                let value = port.producer().and_then(|producer| {
                    nodes
                        .get(&producer.node)
                        .and_then(|n| n.port(producer.port.as_str()))
                        .and_then(|p| p.value())
                });
                ctx = ctx.with_input(port.id.as_str(), value);
            }
            (node.compute)(&ctx).and_then(|outputs| check_outputs(node, outputs))
        };

        let Some(node) = self.nodes.get_mut(node_id) else {
            return Ok(Evaluated::Skipped);
        };
        match result {
            Ok(mut outputs) => {
                for port in node.ports.values_mut().filter(|p| p.is_output()) {
                    port.value = outputs.values.swap_remove(port.id.as_str());
                }
                node.state = NodeState::Clean;
                node.stale = false;
                node.last_error = None;
                tracing::debug!("Computed {}", node_id);
                self.events.emit(GraphEvent::ComputeFinished {
                    node_id: node_id.clone(),
                    success: true,
                });
                Ok(Evaluated::Computed)
            }
            Err(e) => {
                tracing::warn!("Compute failed for {}: {}", node_id, e);
                node.state = NodeState::ComputeFailed;
                node.last_error = Some(e.clone());
                self.events.emit(GraphEvent::ComputeFinished {
                    node_id: node_id.clone(),
                    success: false,
                });
                Err(e)
            }
        }
    }
}

/// Reject outputs the node cannot store, before any of them is written
fn check_outputs(node: &Node, outputs: Outputs) -> Result<Outputs, ComputeError> {
    for (port_id, value) in &outputs.values {
        let port = node
            .port(port_id.as_str())
            .filter(|p| p.is_output())
            .ok_or_else(|| ComputeError::UnknownOutput(port_id.clone()))?;
        if !port.data_type.accepts(value) {
            return Err(ComputeError::OutputTypeMismatch {
                port: port_id.clone(),
                expected: port.data_type,
                found: value.data_type(),
            });
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{FloatAttribute, IntAttribute};
    use crate::data::{Cloud, Heightmap};
    use crate::node::{NodeCategory, NodeType};
    use crate::port::Port;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn source(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
        let value = ctx.attr::<FloatAttribute>("value")?;
        Ok(Outputs::new().with("output", Heightmap::filled([2, 2], value)))
    }

    fn add_one(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
        let mut map = ctx.required::<Heightmap>("input")?.clone();
        map.map_in_place(|v| v + 1.0);
        Ok(Outputs::new().with("output", map))
    }

    fn fail(_: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
        Err(ComputeError::Failed("boom".to_string()))
    }

    fn source_type() -> NodeType {
        NodeType::new("Source", NodeCategory::Primitive, source)
            .with_output(Port::output("output", DataType::Heightmap))
            .with_attribute("value", Attribute::new(FloatAttribute::new(1.0, 0.0, 10.0)))
    }

    fn filter_type(compute: ComputeFn) -> NodeType {
        NodeType::new("Filter", NodeCategory::Filter, compute)
            .with_input(Port::input("input", DataType::Heightmap))
            .with_output(Port::output("output", DataType::Heightmap))
    }

    fn value_at(graph: &Graph, node: &str) -> Option<f32> {
        graph
            .get_value_ref::<Heightmap>(node, "output")
            .and_then(|m| m.get(0, 0))
    }

    #[test]
    fn test_topological_order_respects_links() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("c", &filter_type(add_one))).unwrap();
        graph.add_node(Node::new("b", &filter_type(add_one))).unwrap();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.connect("a", "output", "b", "input").unwrap();
        graph.connect("b", "output", "c", "input").unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")]);
    }

    #[test]
    fn test_update_computes_in_order() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.add_node(Node::new("b", &filter_type(add_one))).unwrap();
        graph.connect("a", "output", "b", "input").unwrap();

        let report = graph.update();
        assert_eq!(report.computed, vec![NodeId::new("a"), NodeId::new("b")]);
        assert!(report.is_success());
        assert_eq!(value_at(&graph, "b"), Some(2.0));
        assert!(graph.nodes().all(|n| n.state() == NodeState::Clean));

        // Nothing dirty, nothing to do
        assert!(graph.update().is_empty());
    }

    #[test]
    fn test_missing_required_input_clears_outputs() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("b", &filter_type(add_one))).unwrap();
        let report = graph.update();
        assert_eq!(report.skipped, vec![NodeId::new("b")]);
        assert_eq!(graph.node_state("b"), Some(NodeState::Clean));
        assert!(graph.get_value("b", "output").is_none());
    }

    #[test]
    fn test_failure_prunes_downstream_only() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.add_node(Node::new("bad", &filter_type(fail))).unwrap();
        graph.add_node(Node::new("after", &filter_type(add_one))).unwrap();
        graph.add_node(Node::new("ok", &filter_type(add_one))).unwrap();
        graph.connect("a", "output", "bad", "input").unwrap();
        graph.connect("bad", "output", "after", "input").unwrap();
        graph.connect("a", "output", "ok", "input").unwrap();

        let report = graph.update();
        assert_eq!(report.computed, vec![NodeId::new("a"), NodeId::new("ok")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, NodeId::new("bad"));
        assert_eq!(report.pruned, vec![NodeId::new("after")]);
        assert_eq!(graph.node_state("bad"), Some(NodeState::ComputeFailed));
        assert_eq!(graph.node_state("after"), Some(NodeState::Dirty));
        assert_eq!(
            graph.node("bad").unwrap().last_error(),
            Some(&ComputeError::Failed("boom".to_string()))
        );

        // Failed nodes are not retried by a global update
        let report = graph.update();
        assert!(report.computed.is_empty());
        assert_eq!(report.pruned, vec![NodeId::new("after")]);
    }

    #[test]
    fn test_update_node_retries_failed() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("bad", &filter_type(fail))).unwrap();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.connect("a", "output", "bad", "input").unwrap();
        graph.update();
        assert_eq!(graph.node_state("bad"), Some(NodeState::ComputeFailed));

        let report = graph.update_node("bad").unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(
            graph.update_node("missing"),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_update_node_includes_dirty_ancestors() {
        let mut graph = Graph::default();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.add_node(Node::new("b", &filter_type(add_one))).unwrap();
        graph.add_node(Node::new("other", &source_type())).unwrap();
        graph.connect("a", "output", "b", "input").unwrap();

        let report = graph.update_node("b").unwrap();
        assert_eq!(report.computed, vec![NodeId::new("a"), NodeId::new("b")]);
        assert_eq!(graph.node_state("other"), Some(NodeState::Dirty));
    }

    #[test]
    fn test_invalid_output_is_atomic() {
        fn wrong_type(_: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
            Ok(Outputs::new().with("output", Cloud::default()))
        }
        fn unknown_port(_: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
            Ok(Outputs::new().with("elsewhere", Heightmap::new([1, 1])))
        }

        let mut graph = Graph::default();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.add_node(Node::new("w", &filter_type(wrong_type))).unwrap();
        graph.add_node(Node::new("u", &filter_type(unknown_port))).unwrap();
        graph.connect("a", "output", "w", "input").unwrap();
        graph.connect("a", "output", "u", "input").unwrap();

        let report = graph.update();
        assert!(matches!(
            report.failed[0].1,
            ComputeError::OutputTypeMismatch { .. }
        ));
        assert!(matches!(report.failed[1].1, ComputeError::UnknownOutput(_)));
        assert!(graph.get_value("w", "output").is_none());
    }

    #[test]
    fn test_context_typed_access() {
        let id = NodeId::new("n");
        let config = GraphConfig::default();
        let mut attributes = AttributeMap::new();
        attributes.insert("count".to_string(), Attribute::new(IntAttribute::new(3, 0, 5)));
        let cloud: PortValue = Cloud::default().into();

        let ctx = ComputeContext::new(&id, &config, &attributes)
            .with_input("points", Some(&cloud))
            .with_input("mask", None);
        assert_eq!(ctx.attr::<IntAttribute>("count"), Ok(3));
        assert!(matches!(
            ctx.attr::<FloatAttribute>("count"),
            Err(ComputeError::Attribute(AttributeError::WrongType { .. }))
        ));
        assert!(ctx.input::<Cloud>("points").unwrap().is_some());
        assert!(matches!(
            ctx.input::<Heightmap>("points"),
            Err(ComputeError::WrongInputType { .. })
        ));
        assert_eq!(ctx.input::<Heightmap>("mask"), Ok(None));
        assert!(matches!(
            ctx.required::<Heightmap>("mask"),
            Err(ComputeError::MissingInput(_))
        ));
    }

    #[test]
    fn test_pass_events() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut graph = Graph::default();
        graph.add_node(Node::new("a", &source_type())).unwrap();
        graph.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        graph.update();

        assert_eq!(
            *seen.borrow(),
            vec![
                GraphEvent::UpdateStarted,
                GraphEvent::ComputeStarted(NodeId::new("a")),
                GraphEvent::ComputeFinished {
                    node_id: NodeId::new("a"),
                    success: true
                },
                GraphEvent::UpdateProgress {
                    node_id: NodeId::new("a"),
                    progress: 100.0
                },
                GraphEvent::UpdateFinished,
            ]
        );
    }
}
