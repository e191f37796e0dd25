// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure owning nodes and their connections.
//!
//! Links are not stored separately: each input port keeps a lookup key to its
//! producer and each output port the keys of its consumers. Every mutation
//! goes through [`Graph`], which keeps both sides consistent and propagates
//! dirtiness downstream.

use crate::attribute::{AttributeError, AttributeKind, SeedAttribute};
use crate::config::{ConfigError, GraphConfig};
use crate::events::{EventBus, GraphChange, GraphEvent, SubscriptionId};
use crate::link::Link;
use crate::manager::BroadcastMap;
use crate::node::{Node, NodeFactory, NodeId, NodeState, NODE_ID_SEPARATOR};
use crate::port::{DataType, Port, PortData, PortRef, PortValue};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A dataflow graph
#[derive(Debug)]
pub struct Graph {
    /// Graph ID
    pub id: String,
    pub(crate) config: GraphConfig,
    /// Nodes in insertion order
    pub(crate) nodes: IndexMap<NodeId, Node>,
    /// Counter used to generate node IDs
    pub(crate) id_counter: u64,
    /// Values published by earlier graphs of a manager
    pub(crate) broadcasts: BroadcastMap,
    pub(crate) events: EventBus,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, config: GraphConfig) -> Self {
        Self {
            id: id.into(),
            config,
            nodes: IndexMap::new(),
            id_counter: 0,
            broadcasts: BroadcastMap::new(),
            events: EventBus::new(),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Replace the engine configuration; every node becomes dirty
    pub fn set_config(&mut self, config: GraphConfig) -> Result<(), GraphError> {
        config.validate()?;
        self.config = config;
        for node in self.nodes.values_mut() {
            node.state = NodeState::Dirty;
            node.stale = false;
        }
        tracing::debug!("Config changed, {} nodes dirty", self.nodes.len());
        self.changed(GraphChange::ConfigChanged);
        Ok(())
    }

    /// Counter used for the next generated node ID
    pub fn id_counter(&self) -> u64 {
        self.id_counter
    }

    /// Add a node to the graph; it starts dirty
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id.to_string()));
        }
        debug_assert!(
            node.ports().all(|p| !p.is_connected()),
            "node {} carries connection state",
            node.id
        );

        // Keep generated IDs unique when nodes are inserted with explicit ones
        if let Some(counter) = node
            .id
            .as_str()
            .rsplit_once(NODE_ID_SEPARATOR)
            .and_then(|(_, counter)| counter.parse::<u64>().ok())
        {
            self.id_counter = self.id_counter.max(counter.saturating_add(1));
        }

        node.state = NodeState::Dirty;
        let id = node.id.clone();
        tracing::debug!("Added node {} ({})", id, node.node_type);
        self.nodes.insert(id.clone(), node);
        self.changed(GraphChange::NodeAdded(id.clone()));
        Ok(id)
    }

    /// Create a node through `factory` with a generated ID
    pub fn add_node_of_type(
        &mut self,
        factory: &dyn NodeFactory,
        type_name: &str,
    ) -> Result<NodeId, GraphError> {
        let id = loop {
            let candidate = NodeId::generated(type_name, self.id_counter);
            self.id_counter += 1;
            if !self.nodes.contains_key(&candidate) {
                break candidate;
            }
        };
        let node = factory.create_node(type_name, id, &self.config)?;
        self.add_node(node)
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, node_id: &str) -> Result<Node, GraphError> {
        let mut node = self
            .nodes
            .shift_remove(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(NodeId::new(node_id)))?;

        let mut removed = Vec::new();
        let mut downstream = Vec::new();
        for port in node.ports.values_mut() {
            let here = PortRef::new(&node.id, port.id.clone());
            if let Some(producer) = port.producer.take() {
                if let Some(source) = self.port_mut(&producer) {
                    source.consumers.retain(|c| *c != here);
                }
                removed.push(Link::between(&producer, &here));
            }
            for consumer in port.consumers.drain(..) {
                if let Some(target) = self.port_mut(&consumer) {
                    target.producer = None;
                }
                downstream.push(consumer.node.clone());
                removed.push(Link::between(&here, &consumer));
            }
        }

        tracing::debug!("Removed node {} and {} links", node.id, removed.len());
        for id in &downstream {
            self.touch(id.as_str());
        }
        for link in removed {
            self.changed(GraphChange::LinkRemoved(link));
        }
        self.changed(GraphChange::NodeRemoved(node.id.clone()));
        Ok(node)
    }

    /// Remove every node and reset the ID counter
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.id_counter = 0;
        tracing::debug!("Cleared graph {}", self.id);
        self.changed(GraphChange::Cleared);
    }

    /// Get a node by ID
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether a node with this ID exists
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Scheduling state of a node
    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.nodes.get(node_id).map(Node::state)
    }

    /// Register a new port on an existing node; the node becomes dirty
    pub fn add_port(&mut self, node_id: &str, port: Port) -> Result<(), GraphError> {
        self.node_mut(node_id)?.add_port(port)?;
        self.touch(node_id);
        Ok(())
    }

    /// Change the display label of a node
    pub fn set_label(&mut self, node_id: &str, label: impl Into<String>) -> Result<(), GraphError> {
        self.node_mut(node_id)?.label = label.into();
        Ok(())
    }

    /// Link an output port to an input port.
    ///
    /// Validation happens before any mutation: on error the graph is left
    /// exactly as it was.
    pub fn connect(
        &mut self,
        from_node: &str,
        from_port: &str,
        to_node: &str,
        to_port: &str,
    ) -> Result<Link, GraphError> {
        let from = PortRef::new(from_node, from_port);
        let to = PortRef::new(to_node, to_port);

        let source = self.port(&from)?;
        let target = self.port(&to)?;
        if !source.is_output() {
            return Err(GraphError::WrongDirection(from));
        }
        if !target.is_input() {
            return Err(GraphError::WrongDirection(to));
        }
        if !source.data_type.can_connect_to(&target.data_type) {
            return Err(GraphError::TypeMismatch {
                from: source.data_type,
                to: target.data_type,
            });
        }
        if target.producer.is_some() {
            return Err(GraphError::AlreadyConnected(to));
        }
        if from.node == to.node || self.is_reachable(to.node.as_str(), from.node.as_str()) {
            return Err(GraphError::CycleDetected);
        }

        if let Some(source) = self.port_mut(&from) {
            source.consumers.push(to.clone());
        }
        if let Some(target) = self.port_mut(&to) {
            target.producer = Some(from.clone());
        }

        let link = Link::between(&from, &to);
        tracing::debug!("Connected {}", link);
        self.touch(to.node.as_str());
        self.changed(GraphChange::LinkAdded(link.clone()));
        Ok(link)
    }

    /// Remove the link feeding an input port
    pub fn disconnect(&mut self, to_node: &str, to_port: &str) -> Result<Link, GraphError> {
        let to = PortRef::new(to_node, to_port);
        let target = self.port(&to)?;
        if !target.is_input() {
            return Err(GraphError::WrongDirection(to));
        }
        let from = target
            .producer
            .clone()
            .ok_or_else(|| GraphError::NotConnected(to.clone()))?;

        if let Some(target) = self.port_mut(&to) {
            target.producer = None;
        }
        let source = self.port_mut(&from);
        debug_assert!(source.is_some(), "link from missing port {}", from);
        match source {
            Some(source) => source.consumers.retain(|c| *c != to),
            None => tracing::error!("Link from missing port {}, dropping it", from),
        }

        let link = Link::between(&from, &to);
        tracing::debug!("Disconnected {}", link);
        self.touch(to.node.as_str());
        self.changed(GraphChange::LinkRemoved(link.clone()));
        Ok(link)
    }

    /// Every link, derived from port connection state
    pub fn links(&self) -> Vec<Link> {
        let mut links = Vec::new();
        for node in self.nodes.values() {
            for port in node.outputs() {
                let here = PortRef::new(&node.id, port.id.clone());
                links.extend(port.consumers.iter().map(|c| Link::between(&here, c)));
            }
        }
        links
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(Node::outputs)
            .map(|p| p.consumers.len())
            .sum()
    }

    /// Distinct nodes fed by the outputs of `node_id`
    pub fn successors(&self, node_id: &str) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = Vec::new();
        if let Some(node) = self.nodes.get(node_id) {
            for consumer in node.outputs().flat_map(Port::consumers) {
                if !result.contains(&consumer.node) {
                    result.push(consumer.node.clone());
                }
            }
        }
        result
    }

    /// Distinct nodes feeding the inputs of `node_id`
    pub fn predecessors(&self, node_id: &str) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = Vec::new();
        if let Some(node) = self.nodes.get(node_id) {
            for producer in node.inputs().filter_map(Port::producer) {
                if !result.contains(&producer.node) {
                    result.push(producer.node.clone());
                }
            }
        }
        result
    }

    /// Whether `target` can be reached from `start` along links
    pub fn is_reachable(&self, start: &str, target: &str) -> bool {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(NodeId::new(start));

        while let Some(current) = queue.pop_front() {
            if current.as_str() == target {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            queue.extend(self.successors(current.as_str()));
        }
        false
    }

    /// Store a new attribute value after bounds validation; the node becomes
    /// dirty
    pub fn set_attribute<T: AttributeKind>(
        &mut self,
        node_id: &str,
        key: &str,
        value: T::Value,
    ) -> Result<(), GraphError> {
        self.node_mut(node_id)?.attribute_mut(key)?.set::<T>(value)?;
        tracing::debug!("Set attribute {}.{}", node_id, key);
        self.attribute_changed(node_id, key);
        Ok(())
    }

    /// Restore an attribute to its default; the node becomes dirty
    pub fn reset_attribute(&mut self, node_id: &str, key: &str) -> Result<(), GraphError> {
        self.node_mut(node_id)?.attribute_mut(key)?.reset();
        self.attribute_changed(node_id, key);
        Ok(())
    }

    /// Step every seed attribute by one (down when `backward`); returns the
    /// number of reseeded nodes
    pub fn reseed(&mut self, backward: bool) -> usize {
        let mut reseeded = Vec::new();
        for node in self.nodes.values_mut() {
            let mut changed = false;
            for attribute in node.attributes.values_mut() {
                if let Ok(seed) = attribute.get_mut::<SeedAttribute>() {
                    seed.value = if backward {
                        seed.value.wrapping_sub(1)
                    } else {
                        seed.value.wrapping_add(1)
                    };
                    changed = true;
                }
            }
            if changed {
                reseeded.push(node.id.clone());
            }
        }

        for id in &reseeded {
            self.touch(id.as_str());
        }
        tracing::debug!("Reseeded {} nodes", reseeded.len());
        reseeded.len()
    }

    /// Enable or disable propagation of upstream changes into a node.
    ///
    /// Re-enabling a stale node makes it dirty.
    pub fn set_auto_update(&mut self, node_id: &str, enabled: bool) -> Result<(), GraphError> {
        let node = self.node_mut(node_id)?;
        node.auto_update = enabled;
        if enabled && node.stale {
            self.touch(node_id);
        }
        Ok(())
    }

    /// Mark a node dirty and propagate to everything downstream
    pub fn mark_dirty(&mut self, node_id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(node_id) {
            return Err(GraphError::NodeNotFound(NodeId::new(node_id)));
        }
        self.touch(node_id);
        Ok(())
    }

    /// Value seen at a port: the cached value of an output, or the value of
    /// the output feeding an input
    pub fn get_value(&self, node_id: &str, port_id: &str) -> Option<&PortValue> {
        let port = self.nodes.get(node_id)?.port(port_id)?;
        if port.is_output() {
            return port.value();
        }

        let producer = port.producer()?;
        let source = self
            .nodes
            .get(&producer.node)
            .and_then(|n| n.port(producer.port.as_str()));
        debug_assert!(source.is_some(), "link from missing port {}", producer);
        source?.value()
    }

    /// Typed value seen at a port; `None` if unset or of another type
    pub fn get_value_ref<T: PortData>(&self, node_id: &str, port_id: &str) -> Option<&T> {
        self.get_value(node_id, port_id)?.get::<T>()
    }

    /// Register an event callback
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&GraphEvent) + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    /// Remove an event callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(NodeId::new(node_id)))
    }

    fn port(&self, port: &PortRef) -> Result<&Port, GraphError> {
        self.nodes
            .get(&port.node)
            .ok_or_else(|| GraphError::NodeNotFound(port.node.clone()))?
            .port(port.port.as_str())
            .ok_or_else(|| GraphError::PortNotFound(port.clone()))
    }

    fn port_mut(&mut self, port: &PortRef) -> Option<&mut Port> {
        self.nodes
            .get_mut(&port.node)?
            .port_mut(port.port.as_str())
    }

    /// Mark `node_id` dirty, then propagate downstream. Nodes with
    /// `auto_update` off become stale and stop the propagation.
    pub(crate) fn touch(&mut self, node_id: &str) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        node.state = NodeState::Dirty;
        node.stale = false;

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(NodeId::new(node_id));
        let mut queue: VecDeque<NodeId> = self.successors(node_id).into();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            if node.auto_update {
                node.state = NodeState::Dirty;
                queue.extend(self.successors(current.as_str()));
            } else {
                node.stale = true;
                tracing::trace!("Node {} is stale", current);
            }
        }
    }

    fn attribute_changed(&mut self, node_id: &str, key: &str) {
        self.touch(node_id);
        self.changed(GraphChange::AttributeChanged {
            node_id: NodeId::new(node_id),
            key: key.to_string(),
        });
    }

    fn changed(&mut self, change: GraphChange) {
        self.events.emit(GraphEvent::GraphChanged(change));
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("graph", GraphConfig::default())
    }
}

/// Error when mutating the graph structure
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The link would close a cycle
    #[error("Connection would create a cycle")]
    CycleDetected,

    /// Port data types are not compatible
    #[error("Type mismatch: {from} cannot feed {to}")]
    TypeMismatch {
        /// Output data type
        from: DataType,
        /// Input data type
        to: DataType,
    },

    /// A node or port with this ID already exists
    #[error("Duplicate ID: {0}")]
    DuplicateId(String),

    /// The input already has a producer
    #[error("Port already connected: {0}")]
    AlreadyConnected(PortRef),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(PortRef),

    /// Output used as input or vice versa
    #[error("Wrong port direction: {0}")]
    WrongDirection(PortRef),

    /// The input has no producer
    #[error("Port not connected: {0}")]
    NotConnected(PortRef),

    /// The factory does not know this node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Attribute access failed
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// Configuration rejected
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
