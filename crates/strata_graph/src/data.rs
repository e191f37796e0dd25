// SPDX-License-Identifier: MIT OR Apache-2.0
//! Payload types carried by ports.
//!
//! The engine moves and stores these values but never interprets them; only
//! node compute bodies look inside.

use serde::{Deserialize, Serialize};

/// A 2D scalar field stored row-major (`j * width + i`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heightmap {
    /// Width and height in cells
    pub shape: [usize; 2],
    /// Cell values
    pub data: Vec<f32>,
}

impl Heightmap {
    /// Create a heightmap filled with zeros
    pub fn new(shape: [usize; 2]) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Create a heightmap filled with a constant value
    pub fn filled(shape: [usize; 2], value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape[0] * shape[1]],
        }
    }

    /// Create a heightmap by evaluating `f(i, j)` on every cell
    pub fn from_fn(shape: [usize; 2], mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(shape[0] * shape[1]);
        for j in 0..shape[1] {
            for i in 0..shape[0] {
                data.push(f(i, j));
            }
        }
        Self { shape, data }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the heightmap has no cells
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at cell `(i, j)`
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i >= self.shape[0] || j >= self.shape[1] {
            return None;
        }
        self.data.get(j * self.shape[0] + i).copied()
    }

    /// Overwrite the value at cell `(i, j)`, ignoring out-of-bounds indices
    pub fn set(&mut self, i: usize, j: usize, value: f32) {
        if i < self.shape[0] && j < self.shape[1] {
            self.data[j * self.shape[0] + i] = value;
        }
    }

    /// Minimum and maximum values, `None` when empty
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Apply `f` to every cell in place
    pub fn map_in_place(&mut self, f: impl Fn(f32) -> f32) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }

    /// Linearly rescale values so that they span `[vmin, vmax]`
    pub fn remap(&mut self, vmin: f32, vmax: f32) {
        let Some((lo, hi)) = self.min_max() else {
            return;
        };
        if hi - lo <= f32::EPSILON {
            self.data.fill(vmin);
            return;
        }
        let scale = (vmax - vmin) / (hi - lo);
        self.map_in_place(|v| vmin + (v - lo) * scale);
    }

    /// Bilinear resampling onto another grid covering the same domain
    pub fn resampled(&self, shape: [usize; 2]) -> Heightmap {
        if shape == self.shape {
            return self.clone();
        }
        if self.is_empty() {
            return Heightmap::new(shape);
        }
        let [w, h] = self.shape;
        let axis = |dst: usize, src: usize, k: usize| -> (usize, usize, f32) {
            if dst <= 1 || src <= 1 {
                return (0, 0, 0.0);
            }
            let x = k as f32 * (src - 1) as f32 / (dst - 1) as f32;
            let lo = (x.floor() as usize).min(src - 1);
            let hi = (lo + 1).min(src - 1);
            (lo, hi, x - lo as f32)
        };
        Heightmap::from_fn(shape, |i, j| {
            let (i0, i1, u) = axis(shape[0], w, i);
            let (j0, j1, v) = axis(shape[1], h, j);
            let at = |i: usize, j: usize| self.data[j * w + i];
            let top = at(i0, j0) + u * (at(i1, j0) - at(i0, j0));
            let bottom = at(i0, j1) + u * (at(i1, j1) - at(i0, j1));
            top + v * (bottom - top)
        })
    }
}

/// A 2D array of values that is not a terrain (kernels, weights)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    /// Width and height in cells
    pub shape: [usize; 2],
    /// Cell values, row-major
    pub data: Vec<f32>,
}

impl Array {
    /// Create a zero-filled array
    pub fn new(shape: [usize; 2]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape[0] * shape[1]],
        }
    }
}

/// A point with an attached scalar value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in unit domain
    pub x: f32,
    /// Y coordinate in unit domain
    pub y: f32,
    /// Attached value
    pub v: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32, v: f32) -> Self {
        Self { x, y, v }
    }
}

/// An unordered set of points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cloud {
    /// Points
    pub points: Vec<Point>,
}

impl Cloud {
    /// Create a cloud from points
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }
}

/// An ordered polyline, optionally closed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Vertices in order
    pub points: Vec<Point>,
    /// Whether the last vertex connects back to the first
    pub closed: bool,
}

impl Path {
    /// Create an open path
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    /// Iterate over segments, including the closing one when `closed`
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        let count = match (n, self.closed) {
            (0 | 1, _) => 0,
            (_, true) => n,
            (_, false) => n - 1,
        };
        (0..count).map(move |k| (self.points[k], self.points[(k + 1) % n]))
    }
}
