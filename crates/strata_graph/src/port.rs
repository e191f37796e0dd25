// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::data::{Array, Cloud, Heightmap, Path};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a port, unique within its node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub String);

impl PortId {
    /// Create a port ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the textual ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable 32-bit FNV-1a hash of the ID, written to documents as
    /// `port_hash_id_*`
    pub fn hash_id(&self) -> u32 {
        self.0.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
        })
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PortId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PortId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Data type that can flow through ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Terrain heightmap
    Heightmap,
    /// Heightmap interpreted as a weight in `[0, 1]`
    Mask,
    /// Generic 2D array
    Array,
    /// Point cloud
    Cloud,
    /// Polyline
    Path,
}

impl DataType {
    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heightmap => "Heightmap",
            Self::Mask => "Mask",
            Self::Array => "Array",
            Self::Cloud => "Cloud",
            Self::Path => "Path",
        }
    }

    /// Check if an output of this type can feed an input of `other`
    pub fn can_connect_to(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }

        // Masks are heightmaps with a convention on the range
        matches!(
            (self, other),
            (Self::Heightmap, Self::Mask) | (Self::Mask, Self::Heightmap)
        )
    }

    /// Check if a cached value may be stored in a port of this type
    pub fn accepts(&self, value: &PortValue) -> bool {
        matches!(
            (self, value),
            (Self::Heightmap | Self::Mask, PortValue::Heightmap(_))
                | (Self::Array, PortValue::Array(_))
                | (Self::Cloud, PortValue::Cloud(_))
                | (Self::Path, PortValue::Path(_))
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lookup key for a port somewhere in the graph.
///
/// This is how ports refer to their peers: never by ownership, always by ID,
/// resolved through the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Owning node
    pub node: NodeId,
    /// Port on that node
    pub port: PortId,
}

impl PortRef {
    /// Create a port reference
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// A port on a node
#[derive(Debug, Clone)]
pub struct Port {
    /// Port ID, unique within the node
    pub id: PortId,
    /// Display name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data type
    pub data_type: DataType,
    /// Whether an input may be left unconnected
    pub optional: bool,
    /// Upstream output feeding this input
    pub(crate) producer: Option<PortRef>,
    /// Downstream inputs fed by this output
    pub(crate) consumers: Vec<PortRef>,
    /// Cached value of an output
    pub(crate) value: Option<PortValue>,
}

impl Port {
    /// Create a new port
    pub fn new(id: impl Into<PortId>, data_type: DataType, direction: PortDirection) -> Self {
        let id = id.into();
        Self {
            name: id.0.clone(),
            id,
            direction,
            data_type,
            optional: false,
            producer: None,
            consumers: Vec::new(),
            value: None,
        }
    }

    /// Create a new input port
    pub fn input(id: impl Into<PortId>, data_type: DataType) -> Self {
        Self::new(id, data_type, PortDirection::Input)
    }

    /// Create a new output port
    pub fn output(id: impl Into<PortId>, data_type: DataType) -> Self {
        Self::new(id, data_type, PortDirection::Output)
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether this is an input port
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    /// Whether this is an output port
    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Upstream output, for inputs
    pub fn producer(&self) -> Option<&PortRef> {
        self.producer.as_ref()
    }

    /// Downstream inputs, for outputs
    pub fn consumers(&self) -> &[PortRef] {
        &self.consumers
    }

    /// Whether at least one link touches this port
    pub fn is_connected(&self) -> bool {
        self.producer.is_some() || !self.consumers.is_empty()
    }

    /// Cached value, for outputs
    pub fn value(&self) -> Option<&PortValue> {
        self.value.as_ref()
    }

    /// Copy of this port without connection state or cached value
    pub(crate) fn detached(&self) -> Self {
        Self {
            producer: None,
            consumers: Vec::new(),
            value: None,
            ..self.clone()
        }
    }
}

/// Value cached in an output port
#[derive(Debug, Clone, PartialEq)]
pub enum PortValue {
    /// Heightmap (also used by mask ports)
    Heightmap(Heightmap),
    /// Generic array
    Array(Array),
    /// Point cloud
    Cloud(Cloud),
    /// Polyline
    Path(Path),
}

impl PortValue {
    /// Get the natural data type for this value
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Heightmap(_) => DataType::Heightmap,
            Self::Array(_) => DataType::Array,
            Self::Cloud(_) => DataType::Cloud,
            Self::Path(_) => DataType::Path,
        }
    }

    /// Typed view of the value
    pub fn get<T: PortData>(&self) -> Option<&T> {
        T::from_value(self)
    }
}

/// Payload types that can be stored in a [`PortValue`]
pub trait PortData: Sized {
    /// Natural data type of the payload
    const DATA_TYPE: DataType;

    /// Borrow the payload if the value holds this type
    fn from_value(value: &PortValue) -> Option<&Self>;

    /// Wrap the payload
    fn into_value(self) -> PortValue;
}

macro_rules! impl_port_data {
    ($($ty:ident),* $(,)?) => {
        $(
            impl PortData for $ty {
                const DATA_TYPE: DataType = DataType::$ty;

                fn from_value(value: &PortValue) -> Option<&Self> {
                    match value {
                        PortValue::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_value(self) -> PortValue {
                    PortValue::$ty(self)
                }
            }

            impl From<$ty> for PortValue {
                fn from(inner: $ty) -> Self {
                    PortValue::$ty(inner)
                }
            }
        )*
    };
}

impl_port_data!(Heightmap, Array, Cloud, Path);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        assert!(DataType::Heightmap.can_connect_to(&DataType::Heightmap));
        assert!(DataType::Heightmap.can_connect_to(&DataType::Mask));
        assert!(DataType::Mask.can_connect_to(&DataType::Heightmap));
        assert!(!DataType::Heightmap.can_connect_to(&DataType::Cloud));
        assert!(!DataType::Path.can_connect_to(&DataType::Cloud));
    }

    #[test]
    fn test_mask_accepts_heightmap_values() {
        let value = PortValue::Heightmap(Heightmap::new([2, 2]));
        assert!(DataType::Mask.accepts(&value));
        assert!(!DataType::Cloud.accepts(&value));
    }

    #[test]
    fn test_hash_id_is_stable() {
        assert_eq!(PortId::new("").hash_id(), 0x811c_9dc5);
        assert_eq!(PortId::new("a").hash_id(), 0xe40c_292c);
        assert_ne!(PortId::new("input").hash_id(), PortId::new("output").hash_id());
    }

    #[test]
    fn test_typed_value_access() {
        let value: PortValue = Cloud::default().into();
        assert!(value.get::<Cloud>().is_some());
        assert!(value.get::<Heightmap>().is_none());
    }
}
