// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialization contracts and physical encodings.
//!
//! The logical document is a `serde_json::Value` tree. Types write themselves
//! into it through [`FieldSerialize`] (or the descriptor-driven helpers in
//! [`batch`]), and the tree is then encoded as JSON, RON or a compact binary
//! form chosen per call with [`DocumentFormat`].

pub mod batch;
mod binary;
mod document;

pub use document::{LoadSummary, FORMAT_VERSION};

use serde_json::{Map, Value};
use std::path::Path;

/// Field-keyed, independently versioned serialization.
///
/// Implementors write or read a named sub-object of `doc`. Readers must
/// tolerate unknown keys and keep their current state for missing ones.
pub trait FieldSerialize {
    /// Write `self` under `doc[field]`; returns `false` if nothing was written
    fn serialize_field(&self, field: &str, doc: &mut Value) -> bool;

    /// Update `self` from `doc[field]`; returns `false` if anything was skipped
    fn deserialize_field(&mut self, field: &str, doc: &Value) -> bool;
}

/// Insert `value` under `field`, turning a null `doc` into an object first
pub fn insert_field(doc: &mut Value, field: &str, value: Value) -> bool {
    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }
    match doc.as_object_mut() {
        Some(obj) => {
            obj.insert(field.to_string(), value);
            true
        }
        None => {
            tracing::error!("Cannot write field '{}' into a non-object document", field);
            false
        }
    }
}

/// Physical encoding of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Pretty-printed JSON text
    Json,
    /// Pretty-printed RON text
    Ron,
    /// Compact bincode-based binary
    Binary,
}

impl DocumentFormat {
    /// Every supported format
    pub const ALL: [DocumentFormat; 3] = [Self::Json, Self::Ron, Self::Binary];

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Ron => "ron",
            Self::Binary => "sgb",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" | "hsd" => Some(Self::Json),
            "ron" => Some(Self::Ron),
            "sgb" | "bin" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Parse a user-facing name (`json`, `ron`, `binary`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "ron" => Some(Self::Ron),
            "binary" | "bin" | "sgb" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Encode a document tree
    pub fn encode(&self, doc: &Value) -> Result<Vec<u8>, DocumentError> {
        match self {
            Self::Json => Ok(serde_json::to_vec_pretty(doc)?),
            Self::Ron => {
                let text = ron::ser::to_string_pretty(doc, ron::ser::PrettyConfig::default())?;
                Ok(text.into_bytes())
            }
            Self::Binary => binary::encode(doc),
        }
    }

    /// Decode a document tree
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, DocumentError> {
        match self {
            Self::Json => Ok(serde_json::from_slice(bytes)?),
            Self::Ron => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| DocumentError::Malformed(e.to_string()))?;
                Ok(ron::from_str(text)?)
            }
            Self::Binary => binary::decode(bytes),
        }
    }
}

/// Error when encoding, decoding or storing a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// RON encoding error
    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// Binary encoding error
    #[error("Binary encoding error: {0}")]
    Binary(#[from] bincode::Error),

    /// Document structure unusable as a whole
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// Format could not be determined
    #[error("Unsupported document format: {0}")]
    Unsupported(String),
}
