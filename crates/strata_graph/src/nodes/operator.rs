// SPDX-License-Identifier: MIT OR Apache-2.0
//! Operators: nodes combining several heightmaps.

use super::{check_shape, OUTPUT};
use crate::attribute::{Attribute, FloatAttribute, MapEnumAttribute};
use crate::data::Heightmap;
use crate::evaluation::{ComputeContext, ComputeError, Outputs};
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::port::{DataType, Port};

/// Blending methods, by choice value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlendMethod {
    Add,
    Maximum,
    Minimum,
    Multiply,
    Subtract,
    Mix,
}

impl BlendMethod {
    const ALL: [(&'static str, BlendMethod); 6] = [
        ("add", Self::Add),
        ("maximum", Self::Maximum),
        ("minimum", Self::Minimum),
        ("multiply", Self::Multiply),
        ("subtract", Self::Subtract),
        ("mix", Self::Mix),
    ];

    fn from_value(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .map(|(_, method)| *method)
    }

    fn apply(self, a: f32, b: f32, k: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Maximum => a.max(b),
            Self::Minimum => a.min(b),
            Self::Multiply => a * b,
            Self::Subtract => a - b,
            Self::Mix => a + k * (b - a),
        }
    }
}

pub(super) fn register(registry: &mut NodeRegistry) {
    let choices = BlendMethod::ALL
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (*name, i as i32));

    registry.register(
        NodeType::new("Blend", NodeCategory::Operator, blend)
            .with_description("Combine two heightmaps")
            .with_input(Port::input("input 1", DataType::Heightmap))
            .with_input(Port::input("input 2", DataType::Heightmap))
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(
                "blending_method",
                Attribute::new(MapEnumAttribute::new(choices)).with_label("Method"),
            )
            .with_attribute(
                "k",
                Attribute::new(FloatAttribute::new(0.5, 0.0, 1.0)).with_label("Mix factor"),
            ),
    );
}

fn blend(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let a = ctx.required::<Heightmap>("input 1")?;
    let b = ctx.required::<Heightmap>("input 2")?;
    check_shape(a, b)?;

    let choice = ctx.attr::<MapEnumAttribute>("blending_method")?;
    let method = ctx
        .attribute("blending_method")
        .and_then(|attr| attr.get_ref::<MapEnumAttribute>().ok())
        .and_then(MapEnumAttribute::value)
        .and_then(BlendMethod::from_value)
        .ok_or_else(|| ComputeError::Failed(format!("Unknown blending method: {}", choice)))?;
    let k = ctx.attr::<FloatAttribute>("k")?;

    let data = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&va, &vb)| method.apply(va, vb, k))
        .collect();
    let out = Heightmap {
        shape: a.shape,
        data,
    };
    Ok(Outputs::new().with(OUTPUT, out))
}

#[cfg(test)]
mod tests {
    use crate::attribute::MapEnumAttribute;
    use crate::config::GraphConfig;
    use crate::data::Heightmap;
    use crate::graph::Graph;
    use crate::node::NodeState;
    use crate::nodes::{create_terrain_registry, OUTPUT};

    fn blend_graph(method: &str) -> (Graph, String) {
        let registry = create_terrain_registry();
        let mut graph = Graph::new("blend", GraphConfig::new([4, 4], [1, 1], 0.0));
        let a = graph.add_node_of_type(&registry, "Constant").unwrap();
        let b = graph.add_node_of_type(&registry, "Constant").unwrap();
        let blend = graph.add_node_of_type(&registry, "Blend").unwrap();
        graph
            .set_attribute::<crate::attribute::FloatAttribute>(a.as_str(), "value", 0.25)
            .unwrap();
        graph
            .set_attribute::<crate::attribute::FloatAttribute>(b.as_str(), "value", 0.75)
            .unwrap();
        graph.connect(a.as_str(), OUTPUT, blend.as_str(), "input 1").unwrap();
        graph.connect(b.as_str(), OUTPUT, blend.as_str(), "input 2").unwrap();
        graph
            .set_attribute::<MapEnumAttribute>(blend.as_str(), "blending_method", method.to_string())
            .unwrap();
        (graph, blend.to_string())
    }

    #[test]
    fn test_blend_methods() {
        for (method, expected) in [("add", 1.0), ("maximum", 0.75), ("minimum", 0.25), ("mix", 0.5)] {
            let (mut graph, blend) = blend_graph(method);
            assert!(graph.update().is_success());
            let out = graph.get_value_ref::<Heightmap>(&blend, OUTPUT).unwrap();
            assert!(out.data.iter().all(|&v| v == expected), "method {}", method);
        }
    }

    #[test]
    fn test_blend_waits_for_both_inputs() {
        let (mut graph, blend) = blend_graph("add");
        graph.disconnect(&blend, "input 2").unwrap();
        let report = graph.update();
        assert!(report.is_success());
        assert_eq!(graph.node_state(&blend), Some(NodeState::Clean));
        assert!(graph.get_value(&blend, OUTPUT).is_none());
    }
}
