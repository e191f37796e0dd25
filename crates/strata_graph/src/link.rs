// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.
//!
//! Links are never stored: [`crate::Graph::links`] derives them from the
//! connection state of the ports.

use crate::node::NodeId;
use crate::port::{PortId, PortRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A directed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source node ID
    pub node_id_from: NodeId,
    /// Source output port ID
    pub port_id_from: PortId,
    /// Target node ID
    pub node_id_to: NodeId,
    /// Target input port ID
    pub port_id_to: PortId,
}

impl Link {
    /// Create a new link
    pub fn new(
        node_id_from: impl Into<NodeId>,
        port_id_from: impl Into<PortId>,
        node_id_to: impl Into<NodeId>,
        port_id_to: impl Into<PortId>,
    ) -> Self {
        Self {
            node_id_from: node_id_from.into(),
            port_id_from: port_id_from.into(),
            node_id_to: node_id_to.into(),
            port_id_to: port_id_to.into(),
        }
    }

    /// Build a link from both endpoints
    pub fn between(from: &PortRef, to: &PortRef) -> Self {
        Self {
            node_id_from: from.node.clone(),
            port_id_from: from.port.clone(),
            node_id_to: to.node.clone(),
            port_id_to: to.port.clone(),
        }
    }

    /// Producing endpoint
    pub fn source(&self) -> PortRef {
        PortRef::new(&self.node_id_from, self.port_id_from.clone())
    }

    /// Consuming endpoint
    pub fn target(&self) -> PortRef {
        PortRef::new(&self.node_id_to, self.port_id_to.clone())
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: &str) -> bool {
        self.node_id_from.as_str() == node_id || self.node_id_to.as_str() == node_id
    }

    /// Check if this link involves a specific port of a node
    pub fn involves_port(&self, node_id: &str, port_id: &str) -> bool {
        (self.node_id_from.as_str() == node_id && self.port_id_from.as_str() == port_id)
            || (self.node_id_to.as_str() == node_id && self.port_id_to.as_str() == port_id)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.node_id_from, self.port_id_from, self.node_id_to, self.port_id_to
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involves() {
        let link = Link::new("a", "output", "b", "input");
        assert!(link.involves_node("a"));
        assert!(link.involves_node("b"));
        assert!(!link.involves_node("c"));
        assert!(link.involves_port("b", "input"));
        assert!(!link.involves_port("a", "input"));
        assert_eq!(link.target(), PortRef::new("b", "input"));
        assert_eq!(link.to_string(), "a:output -> b:input");
    }
}
