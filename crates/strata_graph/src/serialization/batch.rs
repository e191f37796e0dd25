// SPDX-License-Identifier: MIT OR Apache-2.0
//! Descriptor-driven serialization for flat structs.
//!
//! A type lists its fields once as `(name, accessor, kind)` entries and gets
//! both directions for free:
//!
//! ```
//! use strata_graph::batch_field;
//! use strata_graph::serialization::batch::{self, BatchField, BatchSerialize};
//!
//! #[derive(Default)]
//! struct Shortcut {
//!     key: String,
//!     modifiers: u8,
//! }
//!
//! impl BatchSerialize for Shortcut {
//!     fn batch_fields() -> Vec<BatchField<Self>> {
//!         vec![
//!             batch_field!(Shortcut, "key", String, key),
//!             batch_field!(Shortcut, "modifiers", U8, modifiers),
//!         ]
//!     }
//! }
//!
//! let shortcut = Shortcut { key: "F5".into(), modifiers: 2 };
//! let mut doc = serde_json::Value::Null;
//! assert!(batch::serialize_batch(&shortcut, "shortcut", &mut doc));
//! assert_eq!(doc["shortcut"]["key"], "F5");
//!
//! let mut loaded = Shortcut::default();
//! assert!(batch::deserialize_batch(&mut loaded, "shortcut", &doc));
//! assert_eq!(loaded.modifiers, 2);
//! ```

use super::{insert_field, FieldSerialize};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Accessor pair for one field, tagged with its primitive kind
pub enum FieldAccess<T> {
    /// Boolean
    Bool(fn(&T) -> &bool, fn(&mut T) -> &mut bool),
    /// Unsigned byte
    U8(fn(&T) -> &u8, fn(&mut T) -> &mut u8),
    /// Signed 16-bit integer
    I16(fn(&T) -> &i16, fn(&mut T) -> &mut i16),
    /// Unsigned 16-bit integer
    U16(fn(&T) -> &u16, fn(&mut T) -> &mut u16),
    /// Signed 32-bit integer
    I32(fn(&T) -> &i32, fn(&mut T) -> &mut i32),
    /// Unsigned 32-bit integer
    U32(fn(&T) -> &u32, fn(&mut T) -> &mut u32),
    /// Signed 64-bit integer
    I64(fn(&T) -> &i64, fn(&mut T) -> &mut i64),
    /// Unsigned 64-bit integer
    U64(fn(&T) -> &u64, fn(&mut T) -> &mut u64),
    /// Single precision float
    F32(fn(&T) -> &f32, fn(&mut T) -> &mut f32),
    /// Double precision float
    F64(fn(&T) -> &f64, fn(&mut T) -> &mut f64),
    /// Owned string
    String(fn(&T) -> &String, fn(&mut T) -> &mut String),
    /// Nested object with its own field-keyed contract
    Object(
        fn(&T) -> &dyn FieldSerialize,
        fn(&mut T) -> &mut dyn FieldSerialize,
    ),
}

/// One entry of a batch descriptor
pub struct BatchField<T> {
    /// Key in the document
    pub name: &'static str,
    /// How to reach the field
    pub access: FieldAccess<T>,
}

impl<T> BatchField<T> {
    /// Create a descriptor entry
    pub fn new(name: &'static str, access: FieldAccess<T>) -> Self {
        Self { name, access }
    }
}

/// Build a [`BatchField`] from a field path.
///
/// `batch_field!(Config, "shape.x", U32, shape[0])` reads and writes
/// `config.shape[0]` under the key `"shape.x"`.
#[macro_export]
macro_rules! batch_field {
    ($ty:ty, $name:expr, $kind:ident, $($path:tt)+) => {
        $crate::serialization::batch::BatchField::new(
            $name,
            $crate::serialization::batch::FieldAccess::$kind(
                |s: &$ty| &s.$($path)+,
                |s: &mut $ty| &mut s.$($path)+,
            ),
        )
    };
}

/// Types described by a batch descriptor
pub trait BatchSerialize: Sized {
    /// Ordered field descriptors
    fn batch_fields() -> Vec<BatchField<Self>>;
}

fn put<V: Serialize>(doc: &mut Value, name: &str, value: &V) {
    match serde_json::to_value(value) {
        Ok(json) => {
            insert_field(doc, name, json);
        }
        Err(e) => tracing::error!("Could not serialize field '{}': {}", name, e),
    }
}

fn take<V: DeserializeOwned>(doc: &Value, name: &str, target: &mut V) -> bool {
    let Some(json) = doc.get(name) else {
        tracing::warn!("Missing field '{}', keeping current value", name);
        return false;
    };
    match V::deserialize(json) {
        Ok(value) => {
            *target = value;
            true
        }
        Err(e) => {
            tracing::warn!("Malformed field '{}', keeping current value: {}", name, e);
            false
        }
    }
}

/// Write every described field as a flat key of the object `doc`
pub fn write_fields<T: BatchSerialize>(value: &T, doc: &mut Value) {
    for field in T::batch_fields() {
        let name = field.name;
        match field.access {
            FieldAccess::Bool(get, _) => put(doc, name, get(value)),
            FieldAccess::U8(get, _) => put(doc, name, get(value)),
            FieldAccess::I16(get, _) => put(doc, name, get(value)),
            FieldAccess::U16(get, _) => put(doc, name, get(value)),
            FieldAccess::I32(get, _) => put(doc, name, get(value)),
            FieldAccess::U32(get, _) => put(doc, name, get(value)),
            FieldAccess::I64(get, _) => put(doc, name, get(value)),
            FieldAccess::U64(get, _) => put(doc, name, get(value)),
            FieldAccess::F32(get, _) => put(doc, name, get(value)),
            FieldAccess::F64(get, _) => put(doc, name, get(value)),
            FieldAccess::String(get, _) => put(doc, name, get(value)),
            FieldAccess::Object(get, _) => {
                get(value).serialize_field(name, doc);
            }
        }
    }
}

/// Read every described field from the flat keys of the object `doc`.
///
/// Returns the number of fields that were missing or malformed; those keep
/// their current value.
pub fn read_fields<T: BatchSerialize>(value: &mut T, doc: &Value) -> usize {
    let mut failures = 0;
    for field in T::batch_fields() {
        let name = field.name;
        let ok = match field.access {
            FieldAccess::Bool(_, get) => take(doc, name, get(value)),
            FieldAccess::U8(_, get) => take(doc, name, get(value)),
            FieldAccess::I16(_, get) => take(doc, name, get(value)),
            FieldAccess::U16(_, get) => take(doc, name, get(value)),
            FieldAccess::I32(_, get) => take(doc, name, get(value)),
            FieldAccess::U32(_, get) => take(doc, name, get(value)),
            FieldAccess::I64(_, get) => take(doc, name, get(value)),
            FieldAccess::U64(_, get) => take(doc, name, get(value)),
            FieldAccess::F32(_, get) => take(doc, name, get(value)),
            FieldAccess::F64(_, get) => take(doc, name, get(value)),
            FieldAccess::String(_, get) => take(doc, name, get(value)),
            FieldAccess::Object(_, get) => get(value).deserialize_field(name, doc),
        };
        if !ok {
            failures += 1;
        }
    }
    failures
}

/// Serialize all described fields as a sub-object named `field`
pub fn serialize_batch<T: BatchSerialize>(value: &T, field: &str, doc: &mut Value) -> bool {
    let mut sub = Value::Object(Map::new());
    write_fields(value, &mut sub);
    insert_field(doc, field, sub)
}

/// Deserialize all described fields from the sub-object named `field`.
///
/// Returns `false` if the sub-object is absent or any field had to be
/// skipped.
pub fn deserialize_batch<T: BatchSerialize>(value: &mut T, field: &str, doc: &Value) -> bool {
    match doc.get(field).filter(|sub| sub.is_object()) {
        Some(sub) => read_fields(value, sub) == 0,
        None => {
            tracing::warn!("Missing object '{}', keeping current values", field);
            false
        }
    }
}
