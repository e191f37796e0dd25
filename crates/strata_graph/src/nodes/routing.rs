// SPDX-License-Identifier: MIT OR Apache-2.0
//! Routing: heightmaps shared between the graphs of a manager.

use super::{INPUT, OUTPUT};
use crate::attribute::{Attribute, StringAttribute};
use crate::data::Heightmap;
use crate::evaluation::{ComputeContext, ComputeError, Outputs};
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::port::{DataType, Port};

/// Type of the node publishing its input to later graphs
pub const BROADCAST_TYPE: &str = "Broadcast";

/// Type of the node reading a broadcast value
pub const RECEIVE_TYPE: &str = "Receive";

/// Attribute holding the tag a `Receive` node listens to
pub const TAG: &str = "tag";

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register(
        NodeType::new(BROADCAST_TYPE, NodeCategory::Routing, broadcast)
            .with_description("Publish a heightmap to the graphs placed after this one")
            .with_input(Port::input(INPUT, DataType::Heightmap))
            .with_output(Port::output(OUTPUT, DataType::Heightmap)),
    );

    registry.register(
        NodeType::new(RECEIVE_TYPE, NodeCategory::Routing, receive)
            .with_description("Heightmap broadcast by an earlier graph, resampled to this one")
            .with_output(Port::output(OUTPUT, DataType::Heightmap))
            .with_attribute(TAG, Attribute::new(StringAttribute::new("")).with_label("Tag")),
    );
}

fn broadcast(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let input = ctx.required::<Heightmap>(INPUT)?;
    Ok(Outputs::new().with(OUTPUT, input.clone()))
}

fn receive(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let tag = ctx.attr::<StringAttribute>(TAG)?;
    match ctx.broadcast(&tag) {
        Some(hmap) => {
            let hmap = hmap.resampled(ctx.config().shape_usize());
            Ok(Outputs::new().with(OUTPUT, hmap))
        }
        None => {
            tracing::debug!("Node {}: tag '{}' not available", ctx.node_id(), tag);
            Ok(Outputs::new())
        }
    }
}
