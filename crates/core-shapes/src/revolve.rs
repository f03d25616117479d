//! Wireframes of revolution solids: torus, cylinder, cone, capsule.

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

fn check_segments(shape: &'static str, segments: i64) -> Result<usize, ShapeError> {
    if segments < 3 {
        return Err(ShapeError::InvalidParameter {
            shape,
            name: "segments",
            reason: format!("need at least 3 segments, got {segments}"),
        });
    }
    Ok(segments as usize)
}

/// Closed circle of `segments + 1` points (last repeats the first) in the
/// plane `z = const`, centered on the z axis.
fn circle_z(radius: f32, z: f32, segments: usize) -> Vec<[f32; 3]> {
    (0..=segments)
        .map(|i| {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            [radius * angle.cos(), radius * angle.sin(), z]
        })
        .collect()
}

/// Torus wireframe: meridian circles around the tube plus parallel circles
/// around the major axis.
pub struct Torus;

impl ShapeSource for Torus {
    fn name(&self) -> &'static str {
        "torus"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let major_radius = params.f64_or("major_radius", 0.25) as f32;
        let minor_radius = params.f64_or("minor_radius", 0.125) as f32;
        let major_segments = check_segments("torus", params.i64_or("major_segments", 32))?;
        let minor_segments = check_segments("torus", params.i64_or("minor_segments", 16))?;

        let mut lines = Vec::with_capacity(major_segments + minor_segments);
        for i in 0..major_segments {
            let theta = std::f32::consts::TAU * i as f32 / major_segments as f32;
            let (cos_t, sin_t) = (theta.cos(), theta.sin());
            lines.push(
                (0..=minor_segments)
                    .map(|j| {
                        let phi = std::f32::consts::TAU * j as f32 / minor_segments as f32;
                        let r = major_radius + minor_radius * phi.cos();
                        [r * cos_t, r * sin_t, minor_radius * phi.sin()]
                    })
                    .collect::<Vec<_>>(),
            );
        }
        for j in 0..minor_segments {
            let phi = std::f32::consts::TAU * j as f32 / minor_segments as f32;
            let r = major_radius + minor_radius * phi.cos();
            let z = minor_radius * phi.sin();
            lines.push(circle_z(r, z, major_segments));
        }
        Ok(Geometry::from_polylines(lines))
    }
}

/// Cylinder wireframe: two cap circles plus vertical rules.
pub struct Cylinder;

impl ShapeSource for Cylinder {
    fn name(&self) -> &'static str {
        "cylinder"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let radius = params.f64_or("radius", 0.3) as f32;
        let height = params.f64_or("height", 0.6) as f32;
        let segments = check_segments("cylinder", params.i64_or("segments", 32))?;
        let half = height / 2.0;

        let mut lines = Vec::with_capacity(segments + 2);
        lines.push(circle_z(radius, half, segments));
        lines.push(circle_z(radius, -half, segments));
        for i in 0..segments {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            let (x, y) = (radius * angle.cos(), radius * angle.sin());
            lines.push(vec![[x, y, -half], [x, y, half]]);
        }
        Ok(Geometry::from_polylines(lines))
    }
}

/// Cone wireframe: base circle plus rules from the apex.
pub struct Cone;

impl ShapeSource for Cone {
    fn name(&self) -> &'static str {
        "cone"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let radius = params.f64_or("radius", 0.3) as f32;
        let height = params.f64_or("height", 0.6) as f32;
        let segments = check_segments("cone", params.i64_or("segments", 32))?;
        let half = height / 2.0;
        let apex = [0.0, 0.0, half];

        let mut lines = Vec::with_capacity(segments + 1);
        lines.push(circle_z(radius, -half, segments));
        for i in 0..segments {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            lines.push(vec![apex, [radius * angle.cos(), radius * angle.sin(), -half]]);
        }
        Ok(Geometry::from_polylines(lines))
    }
}

/// Capsule wireframe: cylindrical barrel with hemispherical caps. `height`
/// is the barrel length (cap-center to cap-center); total extent along z is
/// `height + 2 · radius`.
pub struct Capsule;

impl ShapeSource for Capsule {
    fn name(&self) -> &'static str {
        "capsule"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let radius = params.f64_or("radius", 0.15) as f32;
        let height = params.f64_or("height", 0.3) as f32;
        let segments = check_segments("capsule", params.i64_or("segments", 32))?;
        let rings = params.i64_or("rings", 4).max(1) as usize;
        let half = height / 2.0;

        let mut lines = Vec::new();
        // Barrel rules and seam circles.
        for i in 0..segments {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            let (x, y) = (radius * angle.cos(), radius * angle.sin());
            lines.push(vec![[x, y, -half], [x, y, half]]);
        }
        lines.push(circle_z(radius, half, segments));
        lines.push(circle_z(radius, -half, segments));
        // Latitude circles on each hemisphere (pole row excluded; it is a point).
        for cap in [1.0f32, -1.0] {
            for lat in 1..rings {
                let phi = std::f32::consts::FRAC_PI_2 * lat as f32 / rings as f32;
                let z = cap * (half + radius * phi.cos());
                lines.push(circle_z(radius * phi.sin(), z, segments));
            }
        }
        // Meridian arcs closing over both poles.
        for i in 0..segments {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            let (cos_a, sin_a) = (angle.cos(), angle.sin());
            let mut arc = Vec::with_capacity(2 * rings + 2);
            for lat in 0..=rings {
                let phi = std::f32::consts::FRAC_PI_2 * lat as f32 / rings as f32;
                // Walk top pole → top seam.
                let r = radius * phi.sin();
                arc.push([r * cos_a, r * sin_a, half + radius * phi.cos()]);
            }
            for lat in (0..=rings).rev() {
                let phi = std::f32::consts::FRAC_PI_2 * lat as f32 / rings as f32;
                let r = radius * phi.sin();
                arc.push([r * cos_a, r * sin_a, -half - radius * phi.cos()]);
            }
            lines.push(arc);
        }
        Ok(Geometry::from_polylines(lines))
    }
}
