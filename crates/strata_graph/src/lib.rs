// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow graph engine for Strata.
//!
//! This crate provides the engine behind node-based terrain authoring:
//! - Typed ports carrying heightmaps, masks, arrays, clouds and paths
//! - Bounded, typed node attributes
//! - Dirty tracking with incremental recomputation in topological order
//! - Versioned documents in JSON, RON or a compact binary encoding
//! - Projects layering several graphs that share broadcast heightmaps
//!
//! ## Architecture
//!
//! A [`Graph`] owns its [`Node`]s. Links are not stored: each input port
//! records its producer and each output port its consumers, and
//! [`Graph::links`] derives the edge list from that state. Node behavior is
//! a plain compute function registered with a [`NodeType`], so every node
//! shares the same record for ports and attributes.

pub mod attribute;
pub mod config;
pub mod data;
pub mod evaluation;
pub mod events;
pub mod graph;
pub mod link;
pub mod manager;
pub mod node;
pub mod nodes;
pub mod port;
pub mod serialization;

pub use attribute::{Attribute, AttributeData, AttributeError, AttributeKind, AttributeType};
pub use config::{ConfigError, ConfigOverride, GraphConfig};
pub use evaluation::{ComputeContext, ComputeError, ComputeFn, Outputs, UpdateReport};
pub use events::{GraphChange, GraphEvent, ManagerEvent, SubscriptionId};
pub use graph::{Graph, GraphError};
pub use link::Link;
pub use manager::{Broadcast, BroadcastMap, GraphManager, ManagerError, ProjectSummary};
pub use node::{Node, NodeCategory, NodeFactory, NodeId, NodeRegistry, NodeState, NodeType};
pub use nodes::create_terrain_registry;
pub use port::{DataType, Port, PortDirection, PortId, PortRef, PortValue};
pub use serialization::{DocumentError, DocumentFormat, FieldSerialize, LoadSummary};
