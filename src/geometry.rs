//! Bounding boxes, box scaling, and coordinate-based vertex deduplication.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::datatypes::Vertex;
use crate::error::{Result, ShellmeshError};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Creates a box from two corners, ordering each axis.
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Aabb {
        Aabb {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::from((self.min.coords + self.max.coords) * 0.5)
    }

    /// Grows every face outward by `margin`
    pub fn inflated(&self, margin: f64) -> Aabb {
        let offset = Vector3::repeat(margin);
        Aabb {
            min: self.min - offset,
            max: self.max + offset,
        }
    }

    pub fn contains_point(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        (0..3).all(|axis| {
            point[axis] >= self.min[axis] - tolerance && point[axis] <= self.max[axis] + tolerance
        })
    }

    /// True when `other` lies inside this box with a positive gap on every face.
    pub fn strictly_contains(&self, other: &Aabb) -> bool {
        (0..3).all(|axis| self.min[axis] < other.min[axis] && other.max[axis] < self.max[axis])
    }

    pub fn approx_eq(&self, other: &Aabb, tolerance: f64) -> bool {
        (self.min - other.min).amax() <= tolerance && (self.max - other.max).amax() <= tolerance
    }
}

/// Computes the bounding box of a vertex set.
///
/// # Errors
/// `EmptyGeometry` when `vertices` is empty.
pub fn bounding_box(vertices: &[Vertex]) -> Result<Aabb> {
    let first = vertices.first().ok_or(ShellmeshError::EmptyGeometry)?;
    let mut aabb = Aabb {
        min: *first,
        max: *first,
    };
    for vertex in &vertices[1..] {
        for axis in 0..3 {
            aabb.min[axis] = aabb.min[axis].min(vertex[axis]);
            aabb.max[axis] = aabb.max[axis].max(vertex[axis]);
        }
    }
    Ok(aabb)
}

/// Scales a box uniformly about `anchor` (its center when `None`).
///
/// Only outward growth is allowed.
///
/// # Errors
/// `InvalidScale` when `factor` is not finite or not greater than one.
pub fn scale_box(aabb: &Aabb, factor: f64, anchor: Option<Point3<f64>>) -> Result<Aabb> {
    if !factor.is_finite() || factor <= 1.0 {
        return Err(ShellmeshError::InvalidScale {
            factor,
            minimum: 1.0,
        });
    }
    let anchor = anchor.unwrap_or_else(|| aabb.center());
    let min = anchor + (aabb.min - anchor) * factor;
    let max = anchor + (aabb.max - anchor) * factor;
    Ok(Aabb::new(min, max))
}

fn pos_to_cell(pos: &Point3<f64>, cell_size: f64) -> (i64, i64, i64) {
    (
        (pos.x / cell_size).floor() as i64,
        (pos.y / cell_size).floor() as i64,
        (pos.z / cell_size).floor() as i64,
    )
}

/// Merges `b` into a copy of `a`, identifying points of `b` that lie within
/// `tolerance` of an already merged point.
///
/// The vertices of `a` keep their indices. The returned table maps every
/// index of `b` to its index in the merged list.
///
/// # Errors
/// `InvalidParameter` when `tolerance` is negative or not finite.
pub fn dedupe_vertices(
    a: &[Vertex],
    b: &[Vertex],
    tolerance: f64,
) -> Result<(Vec<Vertex>, Vec<usize>)> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ShellmeshError::invalid_parameter(format!(
            "merge tolerance must be a non-negative number, got {tolerance}"
        )));
    }

    // a cell at least as wide as the tolerance keeps matches within the 3x3x3 neighbourhood
    let cell_size = if tolerance > 0.0 { tolerance * 2.0 } else { 1.0 };

    let mut merged: Vec<Vertex> = Vec::with_capacity(a.len() + b.len());
    merged.extend_from_slice(a);

    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
    for (idx, vertex) in a.iter().enumerate() {
        spatial_hash
            .entry(pos_to_cell(vertex, cell_size))
            .or_default()
            .push(idx);
    }

    let mut remap = Vec::with_capacity(b.len());
    for vertex in b {
        let cell = pos_to_cell(vertex, cell_size);
        let mut found: Option<(usize, f64)> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = spatial_hash.get(&(cell.0 + dx, cell.1 + dy, cell.2 + dz))
                    else {
                        continue;
                    };
                    for &candidate in candidates {
                        let dist = (merged[candidate] - *vertex).norm();
                        if dist <= tolerance && found.map_or(true, |(_, best)| dist < best) {
                            found = Some((candidate, dist));
                        }
                    }
                }
            }
        }

        match found {
            Some((idx, _)) => remap.push(idx),
            None => {
                let idx = merged.len();
                merged.push(*vertex);
                spatial_hash.entry(cell).or_default().push(idx);
                remap.push(idx);
            }
        }
    }

    Ok((merged, remap))
}
