// SPDX-License-Identifier: MIT OR Apache-2.0
//! Filters: nodes transforming a single heightmap.

use super::{apply_mask, INPUT, MASK, OUTPUT};
use crate::attribute::{Attribute, BoolAttribute, FloatAttribute, IntAttribute, RangeAttribute};
use crate::data::{Array, Heightmap};
use crate::evaluation::{ComputeContext, ComputeError, Outputs};
use crate::node::{NodeCategory, NodeRegistry, NodeType};
use crate::port::{DataType, Port};

fn filter_type(id: &str, compute: crate::evaluation::ComputeFn) -> NodeType {
    NodeType::new(id, NodeCategory::Filter, compute)
        .with_input(Port::input(INPUT, DataType::Heightmap))
        .with_input(Port::input(MASK, DataType::Mask).optional())
        .with_output(Port::output(OUTPUT, DataType::Heightmap))
}

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register(
        filter_type("Gain", gain)
            .with_description("Contrast curve around 0.5 for values in [0, 1]")
            .with_attribute(
                "gain",
                Attribute::new(FloatAttribute::new(1.0, 0.01, 10.0)).with_label("Gain"),
            ),
    );

    registry.register(
        filter_type("Clamp", clamp)
            .with_description("Clamp values to a range")
            .with_attribute("clamp", Attribute::new(RangeAttribute::default()).with_label("Range")),
    );

    registry.register(
        filter_type("Remap", remap)
            .with_description("Rescale values to span a range")
            .with_attribute("remap", Attribute::new(RangeAttribute::default()).with_label("Range")),
    );

    registry.register(
        filter_type("Inverse", inverse)
            .with_description("Negate values, optionally keeping the input range")
            .with_attribute(
                "keep_range",
                Attribute::new(BoolAttribute::new(true)).with_label("Keep range"),
            ),
    );

    registry.register(
        filter_type("Smooth", smooth)
            .with_description("Box blur")
            .with_attribute(
                "radius",
                Attribute::new(IntAttribute::new(1, 0, 64)).with_label("Radius"),
            ),
    );

    registry.register(
        filter_type("Convolve", convolve)
            .with_description("Convolution with a kernel array")
            .with_input(Port::input("kernel", DataType::Array)),
    );
}

/// Input heightmap and optional mask of a filter
fn filter_inputs<'a>(
    ctx: &ComputeContext<'a>,
) -> Result<(&'a Heightmap, Option<&'a Heightmap>), ComputeError> {
    Ok((ctx.required::<Heightmap>(INPUT)?, ctx.input::<Heightmap>(MASK)?))
}

/// Run `f` on a copy of the input and mix the result back through the mask
fn masked(
    ctx: &ComputeContext<'_>,
    f: impl FnOnce(&mut Heightmap) -> Result<(), ComputeError>,
) -> Result<Outputs, ComputeError> {
    let (input, mask) = filter_inputs(ctx)?;
    let mut out = input.clone();
    f(&mut out)?;
    apply_mask(input, &mut out, mask)?;
    Ok(Outputs::new().with(OUTPUT, out))
}

fn gain(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let g = ctx.attr::<FloatAttribute>("gain")?;
    masked(ctx, |h| {
        h.map_in_place(|v| {
            let v = v.clamp(0.0, 1.0);
            if v < 0.5 {
                0.5 * (2.0 * v).powf(g)
            } else {
                1.0 - 0.5 * (2.0 * (1.0 - v)).powf(g)
            }
        });
        Ok(())
    })
}

fn clamp(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let [lo, hi] = ctx.attr::<RangeAttribute>("clamp")?;
    let (lo, hi) = (lo.min(hi), lo.max(hi));
    masked(ctx, |h| {
        h.map_in_place(|v| v.clamp(lo, hi));
        Ok(())
    })
}

fn remap(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let [lo, hi] = ctx.attr::<RangeAttribute>("remap")?;
    masked(ctx, |h| {
        h.remap(lo, hi);
        Ok(())
    })
}

fn inverse(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let keep_range = ctx.attr::<BoolAttribute>("keep_range")?;
    masked(ctx, |h| {
        let range = h.min_max();
        h.map_in_place(|v| -v);
        if let (true, Some((lo, hi))) = (keep_range, range) {
            h.remap(lo, hi);
        }
        Ok(())
    })
}

fn smooth(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let radius = usize::try_from(ctx.attr::<IntAttribute>("radius")?)
        .map_err(|_| ComputeError::Failed("Negative smoothing radius".to_string()))?;
    if radius == 0 {
        return masked(ctx, |_| Ok(()));
    }

    let size = 2 * radius + 1;
    let weight = 1.0 / (size * size) as f32;
    let kernel = Array {
        shape: [size, size],
        data: vec![weight; size * size],
    };
    masked(ctx, |h| {
        *h = convolve_with(h, &kernel);
        Ok(())
    })
}

fn convolve(ctx: &ComputeContext<'_>) -> Result<Outputs, ComputeError> {
    let kernel = ctx.required::<Array>("kernel")?;
    if kernel.shape[0] % 2 == 0 || kernel.shape[1] % 2 == 0 {
        return Err(ComputeError::Failed(format!(
            "Kernel shape must be odd, got {:?}",
            kernel.shape
        )));
    }
    masked(ctx, |h| {
        *h = convolve_with(h, kernel);
        Ok(())
    })
}

/// Convolution with clamped borders
fn convolve_with(h: &Heightmap, kernel: &Array) -> Heightmap {
    let [w, ht] = h.shape;
    let [kw, kh] = kernel.shape;
    let (rx, ry) = ((kw / 2) as isize, (kh / 2) as isize);

    Heightmap::from_fn(h.shape, |i, j| {
        let mut sum = 0.0;
        for q in 0..kh {
            for p in 0..kw {
                let x = (i as isize + p as isize - rx).clamp(0, w as isize - 1) as usize;
                let y = (j as isize + q as isize - ry).clamp(0, ht as isize - 1) as usize;
                sum += kernel.data[q * kw + p] * h.data[y * w + x];
            }
        }
        sum
    })
}
