//! Unit-sphere line approximations in five drawing styles.
//!
//! All styles emit polylines on the radius-0.5 sphere. `subdivisions` is
//! clamped to `0..=5`; segment counts grow as `8 · 2^s`, so level 5 is
//! already plotter-hostile and anything past it is pointless.

use std::collections::HashSet;

use glam::Vec3;

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

const MAX_SUBDIVISIONS: i64 = 5;

pub struct Sphere;

impl ShapeSource for Sphere {
    fn name(&self) -> &'static str {
        "sphere"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let subdivisions = params.i64_or("subdivisions", 2).clamp(0, MAX_SUBDIVISIONS) as u32;
        let style = params.str_or("style", "latlon");
        let lines = match style {
            "latlon" => latlon(subdivisions),
            "wireframe" => wireframe(subdivisions),
            "zigzag" => zigzag(subdivisions),
            "icosphere" => icosphere(subdivisions),
            "rings" => rings(subdivisions),
            other => {
                return Err(ShapeError::InvalidParameter {
                    shape: "sphere",
                    name: "style",
                    reason: format!(
                        "`{other}` is not one of latlon, wireframe, zigzag, icosphere, rings"
                    ),
                });
            }
        };
        Ok(Geometry::from_polylines(lines))
    }
}

fn unit_point(lat: f32, lon: f32) -> [f32; 3] {
    [
        lat.sin() * lon.cos() * 0.5,
        lat.sin() * lon.sin() * 0.5,
        lat.cos() * 0.5,
    ]
}

/// Default style: one zigzag band per latitude ring pair, alternating
/// between the two latitudes at each longitude step.
fn latlon(subdivisions: u32) -> Vec<Vec<[f32; 3]>> {
    let segments = 8 * (1usize << subdivisions);
    let ring_count = segments / 2;
    let mut lines = Vec::with_capacity(ring_count);
    for i in 0..ring_count {
        let lat1 = std::f32::consts::PI * i as f32 / ring_count as f32;
        let lat2 = std::f32::consts::PI * (i + 1) as f32 / ring_count as f32;
        let mut band = Vec::with_capacity(2 * (segments + 1));
        for j in 0..=segments {
            let lon = std::f32::consts::TAU * j as f32 / segments as f32;
            band.push(unit_point(lat1, lon));
            band.push(unit_point(lat2, lon));
        }
        lines.push(band);
    }
    lines
}

/// Meridians plus parallels (poles skipped on the parallels).
fn wireframe(subdivisions: u32) -> Vec<Vec<[f32; 3]>> {
    let segments = 8 * (1usize << subdivisions);
    let ring_count = segments / 2;
    let mut lines = Vec::with_capacity(segments + ring_count - 1);
    for j in 0..segments {
        let lon = std::f32::consts::TAU * j as f32 / segments as f32;
        lines.push(
            (0..=ring_count)
                .map(|i| unit_point(std::f32::consts::PI * i as f32 / ring_count as f32, lon))
                .collect(),
        );
    }
    for i in 1..ring_count {
        let lat = std::f32::consts::PI * i as f32 / ring_count as f32;
        lines.push(
            (0..=segments)
                .map(|j| unit_point(lat, std::f32::consts::TAU * j as f32 / segments as f32))
                .collect(),
        );
    }
    lines
}

/// Golden-angle spiral sampled into short two-point segments.
fn zigzag(subdivisions: u32) -> Vec<Vec<[f32; 3]>> {
    let points = 200 * (1usize << subdivisions);
    let golden_angle = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    let samples: Vec<[f32; 3]> = (0..points)
        .map(|i| {
            let y = 1.0 - (i as f32 / (points - 1) as f32) * 2.0;
            let radius = (1.0 - y * y).sqrt();
            let theta = golden_angle * i as f32;
            [theta.cos() * radius * 0.5, y * 0.5, theta.sin() * radius * 0.5]
        })
        .collect();
    samples.windows(2).map(|w| vec![w[0], w[1]]).collect()
}

/// Icosahedron edges subdivided toward the sphere, deduplicated so shared
/// triangle edges plot once.
fn icosphere(subdivisions: u32) -> Vec<Vec<[f32; 3]>> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let base: Vec<Vec3> = [
        [-1.0, phi, 0.0],
        [1.0, phi, 0.0],
        [-1.0, -phi, 0.0],
        [1.0, -phi, 0.0],
        [0.0, -1.0, phi],
        [0.0, 1.0, phi],
        [0.0, -1.0, -phi],
        [0.0, 1.0, -phi],
        [phi, 0.0, -1.0],
        [phi, 0.0, 1.0],
        [-phi, 0.0, -1.0],
        [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|&p| Vec3::from_array(p).normalize() * 0.5)
    .collect();

    const FACES: [(usize, usize, usize); 20] = [
        (0, 11, 5),
        (0, 5, 1),
        (0, 1, 7),
        (0, 7, 10),
        (0, 10, 11),
        (3, 9, 4),
        (3, 4, 2),
        (3, 2, 6),
        (3, 6, 8),
        (3, 8, 9),
        (1, 5, 9),
        (5, 11, 4),
        (11, 10, 2),
        (10, 7, 6),
        (7, 1, 8),
        (9, 5, 4),
        (4, 11, 2),
        (2, 10, 6),
        (6, 7, 8),
        (8, 1, 9),
    ];

    fn midpoint_on_sphere(a: Vec3, b: Vec3) -> Vec3 {
        ((a + b) / 2.0).normalize() * 0.5
    }

    fn subdivide(a: Vec3, b: Vec3, c: Vec3, level: u32, edges: &mut Vec<(Vec3, Vec3)>) {
        if level == 0 {
            edges.push((a, b));
            edges.push((b, c));
            edges.push((c, a));
            return;
        }
        let m1 = midpoint_on_sphere(a, b);
        let m2 = midpoint_on_sphere(b, c);
        let m3 = midpoint_on_sphere(c, a);
        subdivide(a, m1, m3, level - 1, edges);
        subdivide(m1, b, m2, level - 1, edges);
        subdivide(m3, m2, c, level - 1, edges);
        subdivide(m1, m2, m3, level - 1, edges);
    }

    let mut edges = Vec::new();
    for &(a, b, c) in &FACES {
        subdivide(base[a], base[b], base[c], subdivisions, &mut edges);
    }

    // Dedup on exact bit patterns; subdivision reproduces shared-edge floats
    // exactly, so bitwise keys are sufficient.
    fn key(p: Vec3) -> [u32; 3] {
        [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
    }

    let mut seen: HashSet<([u32; 3], [u32; 3])> = HashSet::new();
    let mut lines = Vec::new();
    for (a, b) in edges {
        let (ka, kb) = (key(a), key(b));
        let edge_key = if ka <= kb { (ka, kb) } else { (kb, ka) };
        if seen.insert(edge_key) {
            lines.push(vec![a.to_array(), b.to_array()]);
        }
    }
    lines
}

/// Closed circular slices perpendicular to each of the three axes.
fn rings(subdivisions: u32) -> Vec<Vec<[f32; 3]>> {
    let ring_count = 5 + 12 * subdivisions as usize;
    let segments = 64usize;
    let mut lines = Vec::with_capacity(3 * ring_count);
    for axis in 0..3 {
        for i in 0..ring_count {
            let h = -0.5 + i as f32 / (ring_count - 1) as f32;
            let radius_sq = 0.25 - h * h;
            if radius_sq < 0.0 {
                continue;
            }
            let radius = radius_sq.sqrt();
            let ring: Vec<[f32; 3]> = (0..=segments)
                .map(|j| {
                    let angle = std::f32::consts::TAU * j as f32 / segments as f32;
                    let (u, v) = (radius * angle.cos(), radius * angle.sin());
                    match axis {
                        0 => [h, u, v],
                        1 => [u, h, v],
                        _ => [u, v, h],
                    }
                })
                .collect();
            lines.push(ring);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_radius_error(g: &Geometry) -> f32 {
        g.coords()
            .iter()
            .map(|&[x, y, z]| ((x * x + y * y + z * z).sqrt() - 0.5).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn all_styles_lie_on_the_sphere() {
        for style in ["latlon", "wireframe", "icosphere", "rings"] {
            let g = Sphere
                .produce(&ParamSet::new().with("subdivisions", 1).with("style", style))
                .unwrap();
            assert!(!g.is_empty(), "{style} produced nothing");
            assert!(
                max_radius_error(&g) < 1e-5,
                "{style} points stray from radius 0.5"
            );
        }
    }

    #[test]
    fn zigzag_segments_are_pairs() {
        let g = Sphere
            .produce(&ParamSet::new().with("subdivisions", 0).with("style", "zigzag"))
            .unwrap();
        assert_eq!(g.line_count(), 199, "200 samples chain into 199 segments");
        assert!(g.polylines().all(|l| l.len() == 2));
    }

    #[test]
    fn wireframe_line_count() {
        // subdivisions 0 → 8 segments, 4 rings: 8 meridians + 3 parallels.
        let g = Sphere
            .produce(&ParamSet::new().with("subdivisions", 0).with("style", "wireframe"))
            .unwrap();
        assert_eq!(g.line_count(), 11);
    }

    #[test]
    fn icosphere_base_has_30_edges() {
        let g = Sphere
            .produce(&ParamSet::new().with("subdivisions", 0).with("style", "icosphere"))
            .unwrap();
        assert_eq!(g.line_count(), 30, "icosahedron has 30 unique edges");
    }

    #[test]
    fn subdivisions_clamp() {
        let low = Sphere
            .produce(&ParamSet::new().with("subdivisions", -3).with("style", "wireframe"))
            .unwrap();
        let zero = Sphere
            .produce(&ParamSet::new().with("subdivisions", 0).with("style", "wireframe"))
            .unwrap();
        assert_eq!(low.line_count(), zero.line_count());
    }

    #[test]
    fn unknown_style_is_invalid_parameter() {
        let err = Sphere
            .produce(&ParamSet::new().with("style", "dotted"))
            .unwrap_err();
        assert!(matches!(err, ShapeError::InvalidParameter { name: "style", .. }));
    }
}
