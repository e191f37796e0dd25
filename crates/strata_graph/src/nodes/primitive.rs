// SPDX-License-Identifier: MIT OR Apache-2.0
//! Primitives: nodes generating data from attributes only.

use super::OUTPUT;
use crate::attribute::{
    Attribute, FloatAttribute, IntAttribute, RangeAttribute, SeedAttribute, WaveNbAttribute,
};
use crate::data::{Array, Heightmap};
use crate::evaluation::{ComputeContext, ComputeError, Outputs};
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::port::{DataType, Port};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f32::consts::TAU;

pub(super) fn register(registry: &mut NodeRegistry) {
    // Constant value
    registry.register(
        NodeType::new("Constant", NodeCategory::Primitive, constant)
            .with_description("Heightmap filled with a single value")
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(
                "value",
                Attribute::new(FloatAttribute::new(0.0, -1.0, 1.0)).with_label("Value"),
            ),
    );

    // Uniform noise
    registry.register(
        NodeType::new("WhiteNoise", NodeCategory::Primitive, white_noise)
            .with_name("White Noise")
            .with_description("Uncorrelated uniform random values")
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute("seed", Attribute::new(SeedAttribute::default()).with_label("Seed"))
            .with_attribute(
                "range",
                Attribute::new(RangeAttribute::new([0.0, 1.0], -1.0, 2.0)).with_label("Range"),
            ),
    );

    // Directional sine wave
    registry.register(
        NodeType::new("Wave", NodeCategory::Primitive, wave)
            .with_description("Sine wave along a direction")
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(
                "kw",
                Attribute::new(WaveNbAttribute::default()).with_label("Wavenumber"),
            )
            .with_attribute(
                "angle",
                Attribute::new(FloatAttribute::new(0.0, -180.0, 180.0).with_fmt("%.0f"))
                    .with_label("Angle"),
            )
            .with_attribute(
                "phase_shift",
                Attribute::new(FloatAttribute::new(0.0, 0.0, 1.0)).with_label("Phase shift"),
            ),
    );

    // Smoothing kernel
    registry.register(
        NodeType::new("Kernel", NodeCategory::Primitive, kernel)
            .with_description("Normalized Gaussian convolution kernel")
            .with_output(Port::output(OUTPUT, DataType::Array))
            .with_attribute(
                "radius",
                Attribute::new(IntAttribute::new(2, 1, 32)).with_label("Radius"),
            ),
    );
}

fn constant(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let value = ctx.attr::<FloatAttribute>("value")?;
    let hmap = Heightmap::filled(ctx.config().shape_usize(), value);
    Ok(Outputs::new().with(OUTPUT, hmap))
}

fn white_noise(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let seed = ctx.attr::<SeedAttribute>("seed")?;
    let [lo, hi] = ctx.attr::<RangeAttribute>("range")?;

    // Reproducible across rand releases
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(seed));
    let hmap = Heightmap::from_fn(ctx.config().shape_usize(), |_, _| {
        lo + (hi - lo) * rng.gen::<f32>()
    });
    Ok(Outputs::new().with(OUTPUT, hmap))
}

fn wave(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let [kx, ky] = ctx.attr::<WaveNbAttribute>("kw")?;
    let angle = ctx.attr::<FloatAttribute>("angle")?.to_radians();
    let phase = ctx.attr::<FloatAttribute>("phase_shift")?;

    let shape = ctx.config().shape_usize();
    let (ca, sa) = (angle.cos(), angle.sin());
    let hmap = Heightmap::from_fn(shape, |i, j| {
        let x = i as f32 / shape[0] as f32;
        let y = j as f32 / shape[1] as f32;
        (TAU * (kx * ca * x + ky * sa * y + phase)).sin()
    });
    Ok(Outputs::new().with(OUTPUT, hmap))
}

fn kernel(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let radius = usize::try_from(ctx.attr::<IntAttribute>("radius")?)
        .map_err(|_| ComputeError::Failed("Negative kernel radius".to_string()))?;
    let size = 2 * radius + 1;
    let sigma = radius as f32 / 2.0;

    let mut array = Array::new([size, size]);
    for j in 0..size {
        for i in 0..size {
            let dx = i as f32 - radius as f32;
            let dy = j as f32 - radius as f32;
            array.data[j * size + i] = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        }
    }
    let sum: f32 = array.data.iter().sum();
    array.data.iter_mut().for_each(|v| *v /= sum);
    Ok(Outputs::new().with(OUTPUT, array))
}

#[cfg(test)]
mod tests {
    use crate::config::GraphConfig;
    use crate::data::{Array, Heightmap};
    use crate::graph::Graph;
    use crate::nodes::{create_terrain_registry, OUTPUT};
    use crate::attribute::SeedAttribute;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn small_graph() -> Graph {
        Graph::new("test", GraphConfig::new([16, 8], [1, 1], 0.0))
    }

    #[test]
    fn test_constant_uses_config_shape() {
        let registry = create_terrain_registry();
        let mut graph = small_graph();
        let id = graph.add_node_of_type(&registry, "Constant").unwrap();
        graph
            .set_attribute::<crate::attribute::FloatAttribute>(id.as_str(), "value", 0.5)
            .unwrap();
        assert!(graph.update().is_success());

        let hmap = graph.get_value_ref::<Heightmap>(id.as_str(), OUTPUT).unwrap();
        assert_eq!(hmap.shape, [16, 8]);
        assert!(hmap.data.iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_white_noise_is_seeded() {
        let registry = create_terrain_registry();
        let mut graph = small_graph();
        let id = graph.add_node_of_type(&registry, "WhiteNoise").unwrap();
        graph.update();
        let first = graph.get_value_ref::<Heightmap>(id.as_str(), OUTPUT).unwrap().clone();
        assert!(first.data.iter().all(|v| (0.0..=1.0).contains(v)));

        graph.mark_dirty(id.as_str()).unwrap();
        graph.update();
        assert_eq!(graph.get_value_ref::<Heightmap>(id.as_str(), OUTPUT), Some(&first));

        graph.set_attribute::<SeedAttribute>(id.as_str(), "seed", 7).unwrap();
        graph.update();
        assert_ne!(graph.get_value_ref::<Heightmap>(id.as_str(), OUTPUT), Some(&first));
    }

    #[test]
    fn test_white_noise_uses_chacha_stream() {
        let registry = create_terrain_registry();
        let mut graph = small_graph();
        let id = graph.add_node_of_type(&registry, "WhiteNoise").unwrap();
        graph.set_attribute::<SeedAttribute>(id.as_str(), "seed", 42).unwrap();
        graph.update();

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let expected: Vec<f32> = (0..4).map(|_| rng.gen::<f32>()).collect();
        let hmap = graph.get_value_ref::<Heightmap>(id.as_str(), OUTPUT).unwrap();
        assert_eq!(&hmap.data[..4], expected.as_slice());
    }

    #[test]
    fn test_wave_is_bounded() {
        let registry = create_terrain_registry();
        let mut graph = small_graph();
        let id = graph.add_node_of_type(&registry, "Wave").unwrap();
        graph.update();
        let (lo, hi) = graph
            .get_value_ref::<Heightmap>(id.as_str(), OUTPUT)
            .and_then(Heightmap::min_max)
            .unwrap();
        assert!(lo >= -1.0 && hi <= 1.0);
    }

    #[test]
    fn test_kernel_is_normalized() {
        let registry = create_terrain_registry();
        let mut graph = small_graph();
        let id = graph.add_node_of_type(&registry, "Kernel").unwrap();
        graph.update();
        let kernel = graph.get_value_ref::<Array>(id.as_str(), OUTPUT).unwrap();
        assert_eq!(kernel.shape, [5, 5]);
        let sum: f32 = kernel.data.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
