// SPDX-License-Identifier: MIT OR Apache-2.0
//! Geometry sources and converters from geometry to heightmaps.

use super::OUTPUT;
use crate::attribute::{Attribute, BoolAttribute, CloudAttribute, FloatAttribute, PathAttribute};
use crate::data::{Cloud, Heightmap, Path, Point};
use crate::evaluation::{ComputeContext, ComputeError, Outputs};
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::port::{DataType, Port};

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeType::new("Cloud", NodeCategory::Geometry, cloud)
            .with_description("Point cloud edited as an attribute")
            .with_output(Port::output(OUTPUT, DataType::Cloud))
            .with_attribute("cloud", Attribute::new(CloudAttribute::default()).with_label("Points")),
    );

    registry.register(
        NodeType::new("Path", NodeCategory::Geometry, path)
            .with_description("Polyline edited as an attribute")
            .with_output(Port::output(OUTPUT, DataType::Path))
            .with_attribute("path", Attribute::new(PathAttribute::default()).with_label("Path"))
            .with_attribute("closed", Attribute::new(BoolAttribute::new(false)).with_label("Closed")),
    );

    registry.register(
        NodeType::new("CloudToHeightmap", NodeCategory::Converter, cloud_to_heightmap)
            .with_name("Cloud to Heightmap")
            .with_description("Splat cloud points as cones")
            .with_input(Port::input("cloud", DataType::Cloud))
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(
                "radius",
                Attribute::new(FloatAttribute::new(0.05, 0.001, 1.0).with_fmt("%.3f"))
                    .with_label("Radius"),
            ),
    );

    registry.register(
        NodeType::new("PathToHeightmap", NodeCategory::Converter, path_to_heightmap)
            .with_name("Path to Heightmap")
            .with_description("Rasterize a path, interpolating point values along segments")
            .with_input(Port::input("path", DataType::Path))
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(
                "width",
                Attribute::new(FloatAttribute::new(0.02, 0.001, 0.5).with_fmt("%.3f"))
                    .with_label("Width"),
            ),
    );
}

fn cloud(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let cloud = ctx.attr::<CloudAttribute>("cloud")?;
    Ok(Outputs::new().with(OUTPUT, cloud))
}

fn path(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let mut path = ctx.attr::<PathAttribute>("path")?;
    path.closed = ctx.attr::<BoolAttribute>("closed")?;
    Ok(Outputs::new().with(OUTPUT, path))
}

/// Unit-domain coordinates of the center of cell `(i, j)`
fn cell_center(shape: [usize; 2], i: usize, j: usize) -> (f32, f32) {
    (
        (i as f32 + 0.5) / shape[0] as f32,
        (j as f32 + 0.5) / shape[1] as f32,
    )
}

fn cloud_to_heightmap(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let cloud: &Cloud = ctx.required("cloud")?;
    let radius = ctx.attr::<FloatAttribute>("radius")?;

    let shape = ctx.config().shape_usize();
    let hmap = Heightmap::from_fn(shape, |i, j| {
        let (x, y) = cell_center(shape, i, j);
        cloud
            .points
            .iter()
            .map(|p| {
                let d = (p.x - x).hypot(p.y - y);
                p.v * (1.0 - d / radius).max(0.0)
            })
            .fold(0.0, f32::max)
    });
    Ok(Outputs::new().with(OUTPUT, hmap))
}

/// Distance from `(x, y)` to segment `ab` and the value interpolated at the
/// closest point
fn segment_distance(a: Point, b: Point, x: f32, y: f32) -> (f32, f32) {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((x - a.x) * dx + (y - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (px, py) = (a.x + t * dx, a.y + t * dy);
    ((px - x).hypot(py - y), a.v + t * (b.v - a.v))
}

fn path_to_heightmap(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let path: &Path = ctx.required("path")?;
    let width = ctx.attr::<FloatAttribute>("width")?;

    let shape = ctx.config().shape_usize();
    let hmap = Heightmap::from_fn(shape, |i, j| {
        let (x, y) = cell_center(shape, i, j);
        path.segments()
            .map(|(a, b)| segment_distance(a, b, x, y))
            .filter(|(d, _)| *d <= width)
            .map(|(_, v)| v)
            .fold(0.0, f32::max)
    });
    Ok(Outputs::new().with(OUTPUT, hmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::Graph;
    use crate::nodes::create_terrain_registry;

    fn graph() -> Graph {
        Graph::new("geometry", GraphConfig::new([8, 8], [1, 1], 0.0))
    }

    #[test]
    fn test_cloud_splat() {
        let registry = create_terrain_registry();
        let mut graph = graph();
        let source = graph.add_node_of_type(&registry, "Cloud").unwrap();
        let splat = graph.add_node_of_type(&registry, "CloudToHeightmap").unwrap();
        graph
            .set_attribute::<CloudAttribute>(
                source.as_str(),
                "cloud",
                Cloud::new(vec![Point::new(0.5625, 0.5625, 1.0)]),
            )
            .unwrap();
        graph.connect(source.as_str(), OUTPUT, splat.as_str(), "cloud").unwrap();
        assert!(graph.update().is_success());

        let hmap = graph.get_value_ref::<Heightmap>(splat.as_str(), OUTPUT).unwrap();
        assert_eq!(hmap.get(4, 4), Some(1.0));
        assert_eq!(hmap.get(0, 0), Some(0.0));
    }

    #[test]
    fn test_path_rasterization() {
        let registry = create_terrain_registry();
        let mut graph = graph();
        let source = graph.add_node_of_type(&registry, "Path").unwrap();
        let raster = graph.add_node_of_type(&registry, "PathToHeightmap").unwrap();
        let path = Path::new(vec![Point::new(0.0, 0.5625, 0.5), Point::new(1.0, 0.5625, 0.5)]);
        graph
            .set_attribute::<PathAttribute>(source.as_str(), "path", path)
            .unwrap();
        graph.connect(source.as_str(), OUTPUT, raster.as_str(), "path").unwrap();
        graph.update();

        let hmap = graph.get_value_ref::<Heightmap>(raster.as_str(), OUTPUT).unwrap();
        assert!((0..8).all(|i| hmap.get(i, 4) == Some(0.5)));
        assert!((0..8).all(|i| hmap.get(i, 0) == Some(0.0)));
    }

    #[test]
    fn test_segment_distance_interpolates() {
        let (d, v) = segment_distance(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 0.0, 1.0), 0.25, 0.5);
        assert!((d - 0.5).abs() < 1e-6);
        assert!((v - 0.25).abs() < 1e-6);
    }
}
