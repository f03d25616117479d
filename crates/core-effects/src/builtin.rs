//! Built-in effect kernels.
//!
//! Affine kernels (`translate`, `scale`, `rotate`, `transform`) delegate to
//! the geometry transform helpers; the rest rebuild polylines. All kernels
//! are pure: equal input buffer content and equal params produce equal
//! output coords, and any randomness is derived from an explicit `seed`
//! parameter.

use glam::{Vec2, Vec3};
use noise::{NoiseFn, Perlin};

use core_geometry::Geometry;
use core_geometry::params::{Param, ParamSet};

use crate::{EffectError, Effects, FnEffect};

pub(crate) fn register(effects: &Effects) {
    effects.register(FnEffect::new("translate", translate));
    effects.register(FnEffect::new("scale", scale));
    effects.register(FnEffect::new("rotate", rotate));
    effects.register(FnEffect::new("transform", transform));
    effects.register(FnEffect::new("noise", noise_displace));
    effects.register(FnEffect::new("subdivide", subdivide));
    effects.register(FnEffect::new("extrude", extrude));
    effects.register(FnEffect::new("offset", offset));
    effects.register(FnEffect::new("array", array));
    effects.register(FnEffect::new("hatch", hatch));
}

fn vec3_param(params: &ParamSet, key: &str, default: [f64; 3]) -> Vec3 {
    let [x, y, z] = params.vec3_or(key, default);
    Vec3::new(x as f32, y as f32, z as f32)
}

fn translate(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    Ok(g.translated(vec3_param(params, "offset", [0.0; 3])))
}

fn scale(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let factors = vec3_param(params, "factors", [1.0; 3]);
    let center = vec3_param(params, "center", [0.0; 3]);
    Ok(g.scaled(factors, center))
}

fn rotate(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let angles = vec3_param(params, "angles", [0.0; 3]);
    let center = vec3_param(params, "center", [0.0; 3]);
    Ok(g.rotated(angles, center))
}

/// Compound transform: scale about the origin, rotate about the origin,
/// then translate into place.
fn transform(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let factors = vec3_param(params, "scale", [1.0; 3]);
    let angles = vec3_param(params, "rotate", [0.0; 3]);
    let offset = vec3_param(params, "translate", [0.0; 3]);
    Ok(g.scaled(factors, Vec3::ZERO).rotated(angles, Vec3::ZERO).translated(offset))
}

/// Per-vertex gradient-noise displacement. Three decorrelated channels of
/// one seeded Perlin field drive x/y/z; `t` slides the sample position so a
/// sketch can animate the field over frames.
fn noise_displace(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let intensity = params.f64_or("intensity", 0.5) as f32;
    let t = params.f64_or("t", 0.0);
    let seed = params.i64_or("seed", 0) as u32;
    let frequency = match params.get("frequency") {
        Some(Param::List(_)) => vec3_param(params, "frequency", [0.5; 3]),
        Some(p) => Vec3::splat(p.as_f64().unwrap_or(0.5) as f32),
        None => Vec3::splat(0.5),
    };
    let perlin = Perlin::new(seed);
    // Channel offsets decorrelate the three output axes.
    const CHANNEL: [f64; 3] = [0.0, 31.7, 67.3];
    let coords: Vec<[f32; 3]> = g
        .coords()
        .iter()
        .map(|&[x, y, z]| {
            let sx = (x * frequency.x) as f64 + t;
            let sy = (y * frequency.y) as f64 + t;
            let sz = (z * frequency.z) as f64 + t;
            let dx = perlin.get([sx + CHANNEL[0], sy, sz]) as f32;
            let dy = perlin.get([sx + CHANNEL[1], sy, sz]) as f32;
            let dz = perlin.get([sx + CHANNEL[2], sy, sz]) as f32;
            [x + intensity * dx, y + intensity * dy, z + intensity * dz]
        })
        .collect();
    Geometry::from_raw_parts(coords, g.offsets().to_vec())
        .map_err(|e| EffectError::Kernel(e.to_string()))
}

/// Midpoint insertion: each round doubles segment counts; `divisions`
/// rounds, clamped to 10 (2^10 points per segment is plotter overkill).
fn subdivide(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let divisions = params.i64_or("divisions", 1).clamp(0, 10) as u32;
    let mut lines: Vec<Vec<[f32; 3]>> = g.polylines().map(|l| l.to_vec()).collect();
    for _ in 0..divisions {
        for line in &mut lines {
            if line.len() < 2 {
                continue;
            }
            let mut refined = Vec::with_capacity(line.len() * 2 - 1);
            for w in line.windows(2) {
                let a = Vec3::from_array(w[0]);
                let b = Vec3::from_array(w[1]);
                refined.push(w[0]);
                refined.push(((a + b) * 0.5).to_array());
            }
            refined.push(*line.last().unwrap());
            *line = refined;
        }
    }
    Ok(Geometry::from_polylines(lines))
}

/// Wireframe extrusion: each polyline is joined to an offset copy (scaled
/// about its own centroid) by per-vertex connector segments.
fn extrude(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let direction = vec3_param(params, "direction", [0.0, 0.0, 1.0]);
    let distance = params.f64_or("distance", 0.5) as f32;
    let cap_scale = params.f64_or("scale", 1.0) as f32;
    if direction.length_squared() < 1e-12 {
        return Err(EffectError::InvalidParameter {
            effect: "extrude",
            name: "direction",
            reason: "direction must be non-zero".into(),
        });
    }
    let shift = direction.normalize() * distance;

    let mut lines: Vec<Vec<[f32; 3]>> = Vec::new();
    for line in g.polylines() {
        if line.is_empty() {
            lines.push(line.to_vec());
            continue;
        }
        let centroid = line
            .iter()
            .fold(Vec3::ZERO, |acc, &p| acc + Vec3::from_array(p))
            / line.len() as f32;
        let cap: Vec<[f32; 3]> = line
            .iter()
            .map(|&p| (((Vec3::from_array(p) - centroid) * cap_scale) + centroid + shift).to_array())
            .collect();
        lines.push(line.to_vec());
        for (&a, &b) in line.iter().zip(&cap) {
            lines.push(vec![a, b]);
        }
        lines.push(cap);
    }
    Ok(Geometry::from_polylines(lines))
}

/// 2-D perpendicular offset: each polyline becomes two parallel outlines at
/// ±`distance` along miter normals in the XY plane. z rides along
/// unchanged; degenerate (sub-2-point) lines pass through.
fn offset(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let distance = params.f64_or("distance", 0.1) as f32;
    const MITER_LIMIT: f32 = 4.0;

    let mut lines: Vec<Vec<[f32; 3]>> = Vec::new();
    for line in g.polylines() {
        if line.len() < 2 {
            lines.push(line.to_vec());
            continue;
        }
        for side in [1.0f32, -1.0] {
            let mut out = Vec::with_capacity(line.len());
            for i in 0..line.len() {
                let p = Vec2::new(line[i][0], line[i][1]);
                let before = i.checked_sub(1).map(|j| Vec2::new(line[j][0], line[j][1]));
                let after = line.get(i + 1).map(|q| Vec2::new(q[0], q[1]));
                let normal = miter_normal(before, p, after);
                let n = (normal * side * distance).clamp_length_max(distance * MITER_LIMIT);
                out.push([p.x + n.x, p.y + n.y, line[i][2]]);
            }
            lines.push(out);
        }
    }
    Ok(Geometry::from_polylines(lines))
}

fn miter_normal(before: Option<Vec2>, p: Vec2, after: Option<Vec2>) -> Vec2 {
    let seg_normal = |a: Vec2, b: Vec2| -> Vec2 {
        let d = b - a;
        if d.length_squared() < 1e-12 {
            Vec2::ZERO
        } else {
            Vec2::new(-d.y, d.x).normalize()
        }
    };
    match (before, after) {
        (Some(b), Some(a)) => {
            let n = seg_normal(b, p) + seg_normal(p, a);
            if n.length_squared() < 1e-12 {
                seg_normal(b, p)
            } else {
                // Miter length grows with the corner sharpness.
                let unit = n.normalize();
                let half = seg_normal(b, p);
                let cos_half = unit.dot(half).abs().max(0.25);
                unit / cos_half
            }
        }
        (None, Some(a)) => seg_normal(p, a),
        (Some(b), None) => seg_normal(b, p),
        (None, None) => Vec2::ZERO,
    }
}

/// N-copy instancing: copy `i` gets the per-step transform applied `i`
/// times (scale powers, rotation multiples, offset multiples).
fn array(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let count = params.i64_or("count", 3);
    if count < 1 {
        return Err(EffectError::InvalidParameter {
            effect: "array",
            name: "count",
            reason: format!("need at least 1 copy, got {count}"),
        });
    }
    let step_offset = vec3_param(params, "offset", [0.0; 3]);
    let step_angles = vec3_param(params, "rotate", [0.0; 3]);
    let step_factors = vec3_param(params, "scale", [1.0; 3]);
    let center = vec3_param(params, "center", [0.0; 3]);

    let mut out = Geometry::empty();
    for i in 0..count {
        let i = i as f32;
        let copy = g
            .scaled(step_factors.powf(i), center)
            .rotated(step_angles * i, center)
            .translated(step_offset * i);
        out = out.concat(&copy);
    }
    Ok(out)
}

/// Even-odd scanline hatching of closed planar polylines, appended to the
/// input. Open polylines are left unfilled. The region is assumed planar in
/// XY (constant z per polyline).
fn hatch(g: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
    let density = params.f64_or("density", 0.5).clamp(0.0, 1.0) as f32;
    let angle = params.f64_or("angle", 0.0) as f32;
    if density == 0.0 {
        return Ok(g.clone());
    }
    let max_lines = (density * 50.0).ceil() as usize;
    let (sin_a, cos_a) = angle.sin_cos();
    let unrotate = |p: Vec2| Vec2::new(p.x * cos_a - p.y * sin_a, p.x * sin_a + p.y * cos_a);
    let rotate_in = |p: Vec2| Vec2::new(p.x * cos_a + p.y * sin_a, -p.x * sin_a + p.y * cos_a);

    let mut fill: Vec<Vec<[f32; 3]>> = Vec::new();
    for line in g.polylines() {
        if line.len() < 4 {
            continue;
        }
        let first = Vec2::new(line[0][0], line[0][1]);
        let last = Vec2::new(line[line.len() - 1][0], line[line.len() - 1][1]);
        if first.distance(last) > 1e-6 {
            continue;
        }
        let z = line[0][2];
        let ring: Vec<Vec2> = line
            .iter()
            .map(|&[x, y, _]| rotate_in(Vec2::new(x, y)))
            .collect();
        let (min_y, max_y) = ring
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.y), hi.max(p.y))
            });
        if max_y - min_y < 1e-9 {
            continue;
        }
        for k in 1..=max_lines {
            let y = min_y + (max_y - min_y) * k as f32 / (max_lines + 1) as f32;
            let mut xs: Vec<f32> = Vec::new();
            for w in ring.windows(2) {
                let (p, q) = (w[0], w[1]);
                if (p.y <= y && y < q.y) || (q.y <= y && y < p.y) {
                    xs.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
                }
            }
            xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for pair in xs.chunks_exact(2) {
                let a = unrotate(Vec2::new(pair[0], y));
                let b = unrotate(Vec2::new(pair[1], y));
                fill.push(vec![[a.x, a.y, z], [b.x, b.y, z]]);
            }
        }
    }
    Ok(g.concat(&Geometry::from_polylines(fill)))
}
