// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in terrain node types.
//!
//! [`create_terrain_registry`] is the default registry used by the CLI and by
//! documents that do not bring their own factory.

mod converter;
mod filter;
mod operator;
mod primitive;
mod routing;

pub use routing::{BROADCAST_TYPE, RECEIVE_TYPE, TAG};

use crate::data::Heightmap;
use crate::evaluation::ComputeError;
use crate::node::NodeRegistry;

/// Name of the single output port of most built-in nodes
pub const OUTPUT: &str = "output";

/// Name of the main input port of filters
pub const INPUT: &str = "input";

/// Name of the optional mask port
pub const MASK: &str = "mask";

/// Create the terrain node registry
pub fn create_terrain_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    primitive::register(&mut registry);
    filter::register(&mut registry);
    operator::register(&mut registry);
    converter::register(&mut registry);
    routing::register(&mut registry);
    tracing::debug!("Registered {} terrain node types", registry.len());
    registry
}

fn check_shape(a: &Heightmap, b: &Heightmap) -> Result<(), ComputeError> {
    if a.shape != b.shape {
        return Err(ComputeError::Failed(format!(
            "Shape mismatch: {:?} vs {:?}",
            a.shape, b.shape
        )));
    }
    Ok(())
}

/// Mix `filtered` back into `base` where the mask is low
fn apply_mask(base: &Heightmap, filtered: &mut Heightmap, mask: Option<&Heightmap>) -> Result<(), ComputeError> {
    let Some(mask) = mask else {
        return Ok(());
    };
    check_shape(base, mask)?;
    for ((out, &b), &m) in filtered.data.iter_mut().zip(&base.data).zip(&mask.data) {
        let m = m.clamp(0.0, 1.0);
        *out = b + m * (*out - b);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeCategory, NodeFactory};

    #[test]
    fn test_registry_contents() {
        let registry = create_terrain_registry();
        let names = registry.type_names();
        for name in [
            "Constant",
            "WhiteNoise",
            "Wave",
            "Gain",
            "Blend",
            "CloudToHeightmap",
            "Broadcast",
            "Receive",
        ] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
        assert!(registry.types_in_category(NodeCategory::Filter).count() >= 4);
        assert!(registry
            .types()
            .all(|t| !t.description.is_empty() && !t.outputs.is_empty()));
    }

    #[test]
    fn test_mask_mixes_values() {
        let base = Heightmap::filled([2, 1], 0.0);
        let mut filtered = Heightmap::filled([2, 1], 1.0);
        let mask = Heightmap::from_fn([2, 1], |i, _| i as f32);
        apply_mask(&base, &mut filtered, Some(&mask)).unwrap();
        assert_eq!(filtered.data, vec![0.0, 1.0]);

        let wrong = Heightmap::new([3, 3]);
        assert!(apply_mask(&base, &mut filtered, Some(&wrong)).is_err());
    }
}
