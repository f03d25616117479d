//! Edge sets of the five Platonic solids.
//!
//! Vertices come from the classical golden-ratio constructions, scaled so
//! every solid is inscribed in the radius-0.5 sphere. Edges are recovered as
//! the vertex pairs at the minimum pairwise distance, which is unique per
//! solid, so no per-solid edge tables are needed.

use glam::Vec3;

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

pub struct Polyhedron;

impl ShapeSource for Polyhedron {
    fn name(&self) -> &'static str {
        "polyhedron"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let kind = params.str_or("kind", "tetra");
        let vertices = match kind {
            "tetra" | "tetrahedron" => tetrahedron(),
            "cube" | "hexa" | "hexahedron" => cube(),
            "octa" | "octahedron" => octahedron(),
            "dodeca" | "dodecahedron" => dodecahedron(),
            "icosa" | "icosahedron" => icosahedron(),
            other => {
                return Err(ShapeError::InvalidParameter {
                    shape: "polyhedron",
                    name: "kind",
                    reason: format!("`{other}` is not one of tetra, cube, octa, dodeca, icosa"),
                });
            }
        };
        Ok(Geometry::from_polylines(edges_of(&vertices)))
    }
}

fn normalized(raw: &[[f32; 3]]) -> Vec<Vec3> {
    raw.iter()
        .map(|&p| Vec3::from_array(p).normalize() * 0.5)
        .collect()
}

fn tetrahedron() -> Vec<Vec3> {
    normalized(&[
        [1.0, 1.0, 1.0],
        [1.0, -1.0, -1.0],
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, 1.0],
    ])
}

fn cube() -> Vec<Vec3> {
    let mut raw = Vec::with_capacity(8);
    for &x in &[-1.0f32, 1.0] {
        for &y in &[-1.0f32, 1.0] {
            for &z in &[-1.0f32, 1.0] {
                raw.push([x, y, z]);
            }
        }
    }
    normalized(&raw)
}

fn octahedron() -> Vec<Vec3> {
    normalized(&[
        [1.0, 0.0, 0.0],
        [-1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
    ])
}

fn dodecahedron() -> Vec<Vec3> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let inv = 1.0 / phi;
    let mut raw = Vec::with_capacity(20);
    for &x in &[-1.0f32, 1.0] {
        for &y in &[-1.0f32, 1.0] {
            for &z in &[-1.0f32, 1.0] {
                raw.push([x, y, z]);
            }
        }
    }
    for &a in &[-1.0f32, 1.0] {
        for &b in &[-1.0f32, 1.0] {
            raw.push([0.0, a * inv, b * phi]);
            raw.push([a * inv, b * phi, 0.0]);
            raw.push([a * phi, 0.0, b * inv]);
        }
    }
    normalized(&raw)
}

fn icosahedron() -> Vec<Vec3> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut raw = Vec::with_capacity(12);
    for &a in &[-1.0f32, 1.0] {
        for &b in &[-1.0f32, 1.0] {
            raw.push([0.0, a, b * phi]);
            raw.push([a, b * phi, 0.0]);
            raw.push([a * phi, 0.0, b]);
        }
    }
    normalized(&raw)
}

/// Recover edges as the pairs at minimum pairwise distance (within a small
/// relative tolerance), emitted in `(i, j)` index order for determinism.
fn edges_of(vertices: &[Vec3]) -> Vec<Vec<[f32; 3]>> {
    let mut min_dist = f32::INFINITY;
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let d = vertices[i].distance(vertices[j]);
            if d > 1e-6 && d < min_dist {
                min_dist = d;
            }
        }
    }
    let mut lines = Vec::new();
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let d = vertices[i].distance(vertices[j]);
            if (d - min_dist).abs() < min_dist * 1e-3 {
                lines.push(vec![vertices[i].to_array(), vertices[j].to_array()]);
            }
        }
    }
    lines
}
