// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine-wide configuration shared by every node of a graph.

use crate::batch_field;
use crate::serialization::batch::{BatchField, BatchSerialize};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default heightmap shape
pub const DEFAULT_SHAPE: [u32; 2] = [1024, 1024];

/// Default tiling
pub const DEFAULT_TILING: [u32; 2] = [4, 4];

/// Default tile overlap
pub const DEFAULT_OVERLAP: f32 = 0.25;

/// Heightmap resolution and tiling used by node compute bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Heightmap width and height in cells
    pub shape: [u32; 2],
    /// Number of tiles along x and y
    pub tiling: [u32; 2],
    /// Relative tile overlap in `[0, 1)`
    pub overlap: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            shape: DEFAULT_SHAPE,
            tiling: DEFAULT_TILING,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl GraphConfig {
    /// Create a configuration
    pub fn new(shape: [u32; 2], tiling: [u32; 2], overlap: f32) -> Self {
        Self {
            shape,
            tiling,
            overlap,
        }
    }

    /// Heightmap shape as cell counts
    pub fn shape_usize(&self) -> [usize; 2] {
        [self.shape[0] as usize, self.shape[1] as usize]
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.contains(&0) {
            return Err(ConfigError::InvalidShape(self.shape));
        }
        if self.tiling.contains(&0) {
            return Err(ConfigError::InvalidTiling(self.tiling));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(ConfigError::InvalidOverlap(self.overlap));
        }
        Ok(())
    }

    /// Load a configuration from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GraphConfig = ron::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a RON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Values replacing parts of a stored configuration when a document is loaded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverride {
    /// Replacement shape
    pub shape: Option<[u32; 2]>,
    /// Replacement tiling
    pub tiling: Option<[u32; 2]>,
    /// Replacement overlap
    pub overlap: Option<f32>,
}

impl ConfigOverride {
    /// Whether no value is overridden
    pub fn is_empty(&self) -> bool {
        self.shape.is_none() && self.tiling.is_none() && self.overlap.is_none()
    }

    /// Copy of `config` with the overridden values
    pub fn apply(&self, config: &GraphConfig) -> GraphConfig {
        GraphConfig {
            shape: self.shape.unwrap_or(config.shape),
            tiling: self.tiling.unwrap_or(config.tiling),
            overlap: self.overlap.unwrap_or(config.overlap),
        }
    }
}

impl BatchSerialize for GraphConfig {
    fn batch_fields() -> Vec<BatchField<Self>> {
        vec![
            batch_field!(GraphConfig, "shape.x", U32, shape[0]),
            batch_field!(GraphConfig, "shape.y", U32, shape[1]),
            batch_field!(GraphConfig, "tiling.x", U32, tiling[0]),
            batch_field!(GraphConfig, "tiling.y", U32, tiling[1]),
            batch_field!(GraphConfig, "overlap", F32, overlap),
        ]
    }
}

/// Error when validating, loading or saving a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Zero-sized heightmap
    #[error("Invalid shape: {0:?}")]
    InvalidShape([u32; 2]),

    /// Zero tiles along an axis
    #[error("Invalid tiling: {0:?}")]
    InvalidTiling([u32; 2]),

    /// Overlap outside `[0, 1)`
    #[error("Invalid overlap: {0}")]
    InvalidOverlap(f32),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON encoding error
    #[error("RON error: {0}")]
    Encode(#[from] ron::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::batch;
    use serde_json::json;

    #[test]
    fn test_default_is_valid() {
        let config = GraphConfig::default();
        assert_eq!(config.shape, [1024, 1024]);
        assert_eq!(config.tiling, [4, 4]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            GraphConfig::new([0, 256], [4, 4], 0.25).validate(),
            Err(ConfigError::InvalidShape(_))
        ));
        assert!(matches!(
            GraphConfig::new([256, 256], [4, 0], 0.25).validate(),
            Err(ConfigError::InvalidTiling(_))
        ));
        assert!(matches!(
            GraphConfig::new([256, 256], [4, 4], 1.0).validate(),
            Err(ConfigError::InvalidOverlap(_))
        ));
    }

    #[test]
    fn test_flat_document_keys() {
        let config = GraphConfig::new([512, 256], [2, 1], 0.5);
        let mut doc = json!({});
        batch::write_fields(&config, &mut doc);
        assert_eq!(doc["shape.x"], 512);
        assert_eq!(doc["shape.y"], 256);
        assert_eq!(doc["tiling.x"], 2);
        assert_eq!(doc["overlap"], 0.5);

        let mut loaded = GraphConfig::default();
        assert_eq!(batch::read_fields(&mut loaded, &doc), 0);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        let config = GraphConfig::new([256, 128], [2, 2], 0.1);
        config.save(&path).unwrap();
        assert_eq!(GraphConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_ron_file_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(shape: (64, 64))").unwrap();
        let config = GraphConfig::load(&path).unwrap();
        assert_eq!(config.shape, [64, 64]);
        assert_eq!(config.tiling, DEFAULT_TILING);
    }

    #[test]
    fn test_override() {
        let config = GraphConfig::default();
        assert_eq!(ConfigOverride::default().apply(&config), config);

        let overrides = ConfigOverride {
            shape: Some([256, 256]),
            overlap: Some(0.0),
            ..Default::default()
        };
        assert!(!overrides.is_empty());
        let applied = overrides.apply(&config);
        assert_eq!(applied.shape, [256, 256]);
        assert_eq!(applied.tiling, DEFAULT_TILING);
        assert_eq!(applied.overlap, 0.0);
    }
}
