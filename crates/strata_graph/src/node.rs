// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the graph engine.

use crate::attribute::{Attribute, AttributeError, AttributeKind, AttributeMap};
use crate::config::GraphConfig;
use crate::evaluation::{ComputeError, ComputeFn};
use crate::graph::GraphError;
use crate::port::{Port, PortId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Separator between the type name and the counter in generated node IDs
pub const NODE_ID_SEPARATOR: &str = "##";

/// Unique, stable identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generated ID of the form `<type>##<counter>`
    pub fn generated(type_name: &str, counter: u64) -> Self {
        Self(format!("{}{}{}", type_name, NODE_ID_SEPARATOR, counter))
    }

    /// Borrow the textual ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// Node type encoded in a generated ID, or the whole ID if it has no counter
pub fn node_type_from_id(id: &str) -> &str {
    id.split_once(NODE_ID_SEPARATOR).map_or(id, |(type_name, _)| type_name)
}

/// Scheduling state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Outputs are up to date
    Clean,
    /// Outputs must be recomputed
    Dirty,
    /// Last compute attempt failed; not retried by a global update
    ComputeFailed,
}

/// Node type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Generators without heightmap inputs (noise, constants)
    Primitive,
    /// Single-input heightmap filters
    Filter,
    /// Combination of several inputs
    Operator,
    /// Conversions between data types
    Converter,
    /// Point clouds and paths
    Geometry,
    /// Data exchange between graphs
    Routing,
    /// Custom/user-defined
    Custom,
}

impl NodeCategory {
    /// Every category, in display order
    pub const ALL: [NodeCategory; 7] = [
        Self::Primitive,
        Self::Filter,
        Self::Operator,
        Self::Converter,
        Self::Geometry,
        Self::Routing,
        Self::Custom,
    ];

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Primitive => "Primitive",
            Self::Filter => "Filter",
            Self::Operator => "Operator",
            Self::Converter => "Converter",
            Self::Geometry => "Geometry",
            Self::Routing => "Routing",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Node type definition: port layout, attributes and compute function
#[derive(Debug, Clone)]
pub struct NodeType {
    /// Unique type identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Default input ports
    pub inputs: Vec<Port>,
    /// Default output ports
    pub outputs: Vec<Port>,
    /// Default attributes, in declaration order
    pub attributes: AttributeMap,
    /// Compute function shared by every instance
    pub compute: ComputeFn,
}

impl NodeType {
    /// Create a node type without ports or attributes
    pub fn new(id: impl Into<String>, category: NodeCategory, compute: ComputeFn) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: AttributeMap::new(),
            compute,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an input port
    pub fn with_input(mut self, port: Port) -> Self {
        debug_assert!(port.is_input(), "input declared with an output port");
        self.inputs.push(port);
        self
    }

    /// Declare an output port
    pub fn with_output(mut self, port: Port) -> Self {
        debug_assert!(port.is_output(), "output declared with an input port");
        self.outputs.push(port);
        self
    }

    /// Declare an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(key.into(), attribute);
        self
    }
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node type ID
    pub node_type: String,
    /// Display label (can be customized)
    pub label: String,
    /// Ports in declaration order, inputs first
    pub(crate) ports: IndexMap<PortId, Port>,
    /// Attributes in declaration order
    pub(crate) attributes: AttributeMap,
    pub(crate) state: NodeState,
    /// Upstream changed while `auto_update` was off
    pub(crate) stale: bool,
    pub(crate) auto_update: bool,
    pub(crate) compute: ComputeFn,
    pub(crate) last_error: Option<ComputeError>,
}

impl Node {
    /// Create a new node from a type definition
    pub fn new(id: impl Into<NodeId>, node_type: &NodeType) -> Self {
        let ports = node_type
            .inputs
            .iter()
            .chain(node_type.outputs.iter())
            .map(|p| (p.id.clone(), p.detached()))
            .collect();

        Self {
            id: id.into(),
            node_type: node_type.id.clone(),
            label: node_type.name.clone(),
            ports,
            attributes: node_type.attributes.clone(),
            state: NodeState::Dirty,
            stale: false,
            auto_update: true,
            compute: node_type.compute,
            last_error: None,
        }
    }

    /// Register a new port
    pub fn add_port(&mut self, port: Port) -> Result<&mut Port, GraphError> {
        if self.ports.contains_key(&port.id) {
            return Err(GraphError::DuplicateId(format!("{}:{}", self.id, port.id)));
        }
        let (index, _) = self.ports.insert_full(port.id.clone(), port.detached());
        Ok(&mut self.ports[index])
    }

    /// Get a port by ID
    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.get(port_id)
    }

    pub(crate) fn port_mut(&mut self, port_id: &str) -> Option<&mut Port> {
        self.ports.get_mut(port_id)
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Get input ports
    pub fn inputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.values().filter(|p| p.is_input())
    }

    /// Get output ports
    pub fn outputs(&self) -> impl Iterator<Item = &Port> {
        self.ports.values().filter(|p| p.is_output())
    }

    /// Find a port whose ID hashes to `hash_id`
    pub fn port_by_hash(&self, hash_id: u32) -> Option<&Port> {
        self.ports.values().find(|p| p.id.hash_id() == hash_id)
    }

    /// Get an attribute by key
    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    pub(crate) fn attribute_mut(&mut self, key: &str) -> Result<&mut Attribute, AttributeError> {
        self.attributes
            .get_mut(key)
            .ok_or_else(|| AttributeError::NotFound(key.to_string()))
    }

    /// Get all attributes
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Typed attribute value
    pub fn attr<T: AttributeKind>(&self, key: &str) -> Result<T::Value, AttributeError> {
        self.attributes
            .get(key)
            .ok_or_else(|| AttributeError::NotFound(key.to_string()))?
            .get::<T>()
    }

    /// Scheduling state
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Whether the outputs need recomputing
    pub fn is_dirty(&self) -> bool {
        self.state == NodeState::Dirty
    }

    /// Whether an upstream change was held back by `auto_update = false`
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Whether upstream changes propagate into this node
    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    /// Error of the last failed compute
    pub fn last_error(&self) -> Option<&ComputeError> {
        self.last_error.as_ref()
    }
}

/// Factory boundary used on document load and user-requested creation
pub trait NodeFactory {
    /// Instantiate a node of the named type
    fn create_node(
        &self,
        type_name: &str,
        id: NodeId,
        config: &GraphConfig,
    ) -> Result<Node, GraphError>;

    /// Every type name this factory can create
    fn type_names(&self) -> Vec<String>;

    /// Display name of a type
    fn name_from_type(&self, type_name: &str) -> Option<String>;

    /// Type of a display name
    fn type_from_name(&self, name: &str) -> Option<String>;
}

/// Registry of available node types
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    /// Registered node types by ID
    types: IndexMap<String, NodeType>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register a node type, replacing any previous one with the same ID
    pub fn register(&mut self, node_type: NodeType) {
        if let Some(previous) = self.types.insert(node_type.id.clone(), node_type) {
            tracing::warn!("Node type '{}' registered twice", previous.id);
        }
    }

    /// Get a node type by ID
    pub fn get(&self, id: &str) -> Option<&NodeType> {
        self.types.get(id)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeType> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory for NodeRegistry {
    fn create_node(
        &self,
        type_name: &str,
        id: NodeId,
        config: &GraphConfig,
    ) -> Result<Node, GraphError> {
        config.validate()?;
        let node_type = self
            .get(type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_string()))?;
        tracing::trace!("Creating node {} of type {}", id, type_name);
        Ok(Node::new(id, node_type))
    }

    fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    fn name_from_type(&self, type_name: &str) -> Option<String> {
        self.get(type_name).map(|t| t.name.clone())
    }

    fn type_from_name(&self, name: &str) -> Option<String> {
        self.types
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::FloatAttribute;
    use crate::evaluation::Outputs;
    use crate::port::DataType;

    fn passthrough() -> NodeType {
        NodeType::new("Passthrough", NodeCategory::Filter, |_| Ok(Outputs::new()))
            .with_input(Port::input("input", DataType::Heightmap))
            .with_output(Port::output("output", DataType::Heightmap))
            .with_attribute(
                "gain",
                Attribute::new(FloatAttribute::new(1.0, 0.0, 4.0)).with_label("Gain"),
            )
    }

    #[test]
    fn test_node_from_type() {
        let node = Node::new("p", &passthrough());
        assert_eq!(node.state(), NodeState::Dirty);
        assert!(node.auto_update());
        assert_eq!(node.inputs().count(), 1);
        assert_eq!(node.outputs().count(), 1);
        assert_eq!(node.attr::<FloatAttribute>("gain"), Ok(1.0));
        assert!(matches!(
            node.attr::<FloatAttribute>("missing"),
            Err(AttributeError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_port_rejects_duplicates() {
        let mut node = Node::new("p", &passthrough());
        assert!(matches!(
            node.add_port(Port::input("input", DataType::Mask)),
            Err(GraphError::DuplicateId(_))
        ));
        node.add_port(Port::input("mask", DataType::Mask).optional())
            .unwrap();
        let ids: Vec<_> = node.ports().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["input", "output", "mask"]);
    }

    #[test]
    fn test_port_lookup_by_hash() {
        let node = Node::new("p", &passthrough());
        let hash = PortId::new("output").hash_id();
        assert_eq!(node.port_by_hash(hash).map(|p| p.id.as_str()), Some("output"));
    }

    #[test]
    fn test_type_from_generated_id() {
        let id = NodeId::generated("WhiteNoise", 3);
        assert_eq!(id.as_str(), "WhiteNoise##3");
        assert_eq!(node_type_from_id(id.as_str()), "WhiteNoise");
        assert_eq!(node_type_from_id("custom"), "custom");
    }

    #[test]
    fn test_registry_factory() {
        let mut registry = NodeRegistry::new();
        registry.register(passthrough());
        let config = GraphConfig::default();

        let node = registry
            .create_node("Passthrough", NodeId::new("a"), &config)
            .unwrap();
        assert_eq!(node.node_type, "Passthrough");
        assert!(matches!(
            registry.create_node("Nope", NodeId::new("b"), &config),
            Err(GraphError::UnknownNodeType(_))
        ));
        assert_eq!(registry.type_names(), vec!["Passthrough".to_string()]);
    }

    #[test]
    fn test_type_names_and_display_names() {
        let mut registry = NodeRegistry::new();
        registry.register(passthrough().with_name("Pass Through"));

        assert_eq!(
            registry.name_from_type("Passthrough").as_deref(),
            Some("Pass Through")
        );
        assert_eq!(
            registry.type_from_name("Pass Through").as_deref(),
            Some("Passthrough")
        );
        assert_eq!(registry.type_from_name("Passthrough"), None);
    }
}
