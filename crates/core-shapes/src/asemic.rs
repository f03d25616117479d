//! Emergent script-like glyphs.
//!
//! Pipeline: place nodes in a rectangular region (one of six placement
//! modes) → build the relative neighborhood graph → consume its edges with
//! random walks to form strokes → snap each stroke segment to the nearest
//! multiple of the snap angle → round interior corners with quadratic
//! Béziers → occasionally attach a diacritic near a used node.
//!
//! Everything downstream of the seed is deterministic: the RNG is a
//! `ChaCha8Rng` seeded from the `seed` parameter, every collection iterated
//! while drawing from it is index-ordered, and no global RNG state exists.
//! Identical `(region, seed, params)` → identical output, which the shape
//! cache depends on.

use std::collections::BTreeSet;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

struct Config {
    min_distance: f32,
    snap_angle_degrees: f32,
    smoothing_points: usize,
    walk_min_steps: usize,
    walk_max_steps: usize,
    poisson_radius_divisor: f32,
    poisson_trials: usize,
}

pub struct AsemicGlyph;

impl ShapeSource for AsemicGlyph {
    fn name(&self) -> &'static str {
        "asemic_glyph"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let [x0, y0, x1, y1] = params.vec4_or("region", [-0.5, -0.5, 0.5, 0.5]);
        let region = Region {
            x0: x0 as f32,
            y0: y0 as f32,
            x1: x1 as f32,
            y1: y1 as f32,
        };
        if region.x1 <= region.x0 || region.y1 <= region.y0 {
            return Err(ShapeError::InvalidParameter {
                shape: "asemic_glyph",
                name: "region",
                reason: format!("degenerate region [{x0}, {y0}, {x1}, {y1}]"),
            });
        }
        let seed = params.i64_or("seed", 42) as u64;
        let smoothing_radius = params.f64_or("smoothing_radius", 0.05) as f32;
        let diacritic_probability = params.f64_or("diacritic_probability", 0.3);
        let diacritic_radius = params.f64_or("diacritic_radius", 0.04) as f32;
        let placement = params.str_or("placement", "poisson");
        let config = Config {
            min_distance: params.f64_or("min_distance", 0.1) as f32,
            snap_angle_degrees: params.f64_or("snap_angle", 60.0) as f32,
            smoothing_points: params.usize_or("smoothing_points", 5),
            walk_min_steps: params.usize_or("walk_min_steps", 2),
            walk_max_steps: params.usize_or("walk_max_steps", 4).max(params.usize_or("walk_min_steps", 2)),
            poisson_radius_divisor: params.f64_or("poisson_divisor", 8.0) as f32,
            poisson_trials: params.usize_or("poisson_trials", 30),
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let margin = (0.025f32).min(region.width() / 8.0).min(region.height() / 8.0);

        let nodes = place_nodes(region, margin, placement, &config, &mut rng)?;
        let adjacency = relative_neighborhood_graph(&nodes, &config);
        let strokes = random_walk_strokes(adjacency, &config, &mut rng);
        let used: BTreeSet<usize> = strokes.iter().flatten().copied().collect();

        let mut lines: Vec<Vec<[f32; 3]>> = Vec::new();
        for stroke in &strokes {
            let original: Vec<Vec2> = stroke.iter().map(|&i| nodes[i]).collect();
            let snapped = snap_stroke(&original, config.snap_angle_degrees);
            let smoothed = smooth_polyline(&snapped, smoothing_radius, config.smoothing_points);
            lines.push(smoothed.iter().map(|p| [p.x, p.y, 0.0]).collect());
        }

        add_diacritic(
            &mut lines,
            &nodes,
            &used,
            diacritic_probability,
            diacritic_radius,
            &mut rng,
        );

        Ok(Geometry::from_polylines(lines))
    }
}

#[derive(Clone, Copy)]
struct Region {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl Region {
    fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    fn center(&self) -> Vec2 {
        Vec2::new((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

// ---------------------------------------------------------------------------
// Node placement
// ---------------------------------------------------------------------------

fn place_nodes(
    region: Region,
    margin: f32,
    mode: &str,
    config: &Config,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Vec2>, ShapeError> {
    let mut nodes = Vec::new();
    match mode {
        "grid" => {
            let n = 2 + rng.gen_range(0..=1usize);
            let xs = axis_positions(region.x0 + margin, region.x1 - margin, n);
            let ys = axis_positions(region.y0 + margin, region.y1 - margin, n);
            for &y in &ys {
                for &x in &xs {
                    nodes.push(Vec2::new(x, y));
                }
            }
        }
        "hexagon" => {
            let (cols, rows) = (3usize, 3usize);
            let spacing_x = (region.width() - 2.0 * margin) / (cols - 1) as f32;
            let spacing_y = (region.height() - 2.0 * margin) / (rows - 1) as f32;
            for row in 0..rows {
                for col in 0..cols {
                    let offset = if row % 2 == 1 { spacing_x / 2.0 } else { 0.0 };
                    nodes.push(Vec2::new(
                        region.x0 + margin + col as f32 * spacing_x + offset,
                        region.y0 + margin + row as f32 * spacing_y * 0.866,
                    ));
                }
            }
        }
        "poisson" => {
            nodes = poisson_disk(region, margin, config, rng);
        }
        "spiral" => {
            let center = region.center();
            let max_radius = region.width().min(region.height()) / 2.0 - margin;
            let count = 12usize;
            let delta = std::f32::consts::TAU / 12.0;
            for i in 0..count {
                let angle = i as f32 * delta;
                let radius = max_radius * i as f32 / (count - 1) as f32;
                nodes.push(center + radius * Vec2::new(angle.cos(), angle.sin()));
            }
        }
        "radial" => {
            let center = region.center();
            let max_radius = region.width().min(region.height()) / 2.0 - margin;
            let (rays, per_ray) = (3usize, 3usize);
            for ray in 0..rays {
                let angle = ray as f32 * std::f32::consts::TAU / rays as f32;
                for i in 1..=per_ray {
                    let r = max_radius * i as f32 / (per_ray + 1) as f32;
                    nodes.push(center + r * Vec2::new(angle.cos(), angle.sin()));
                }
            }
        }
        "concentric" => {
            let center = region.center();
            let max_radius = region.width().min(region.height()) / 2.0 - margin;
            let (circles, per_circle) = (1usize, 5usize);
            for circle in 1..=circles {
                let r = max_radius * circle as f32 / circles as f32;
                for j in 0..per_circle {
                    let angle = j as f32 * std::f32::consts::TAU / per_circle as f32;
                    nodes.push(center + r * Vec2::new(angle.cos(), angle.sin()));
                }
            }
            nodes.push(center);
        }
        other => {
            return Err(ShapeError::InvalidParameter {
                shape: "asemic_glyph",
                name: "placement",
                reason: format!(
                    "`{other}` is not one of grid, hexagon, poisson, spiral, radial, concentric"
                ),
            });
        }
    }
    Ok(nodes)
}

fn axis_positions(start: f32, end: f32, n: usize) -> Vec<f32> {
    crate::primitives::linspace(start, end, n)
}

/// Bridson-style dart throwing: grow from active points, up to `trials`
/// candidates in the annulus `[r, 2r]`, reject anything closer than `r` to
/// an existing sample.
fn poisson_disk(region: Region, margin: f32, config: &Config, rng: &mut ChaCha8Rng) -> Vec<Vec2> {
    let x_min = region.x0 + margin;
    let x_max = region.x1 - margin;
    let y_min = region.y0 + margin;
    let y_max = region.y1 - margin;
    let r = (x_max - x_min).min(y_max - y_min) / config.poisson_radius_divisor;

    let first = Vec2::new(rng.gen_range(x_min..=x_max), rng.gen_range(y_min..=y_max));
    let mut samples = vec![first];
    let mut active = vec![first];

    while !active.is_empty() {
        let idx = rng.gen_range(0..active.len());
        let point = active[idx];
        let mut found = false;
        for _ in 0..config.poisson_trials {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = rng.gen_range(r..(2.0 * r));
            let candidate = point + radius * Vec2::new(angle.cos(), angle.sin());
            if candidate.x < x_min || candidate.x > x_max || candidate.y < y_min || candidate.y > y_max {
                continue;
            }
            if samples.iter().all(|p| p.distance(candidate) >= r) {
                samples.push(candidate);
                active.push(candidate);
                found = true;
                break;
            }
        }
        if !found {
            active.swap_remove(idx);
        }
    }
    samples
}

// ---------------------------------------------------------------------------
// Relative neighborhood graph
// ---------------------------------------------------------------------------

/// Uniform grid over the node set for radius queries; keeps the RNG
/// construction near O(n² log n) instead of the naive O(n³).
struct GridIndex {
    cell: f32,
    origin: Vec2,
    cols: i32,
    buckets: Vec<Vec<usize>>,
}

impl GridIndex {
    fn build(points: &[Vec2], cell: f32) -> Self {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for &p in points {
            min = min.min(p);
            max = max.max(p);
        }
        if points.is_empty() {
            min = Vec2::ZERO;
            max = Vec2::ZERO;
        }
        let cell = cell.max(1e-6);
        let cols = ((max.x - min.x) / cell).floor() as i32 + 1;
        let rows = ((max.y - min.y) / cell).floor() as i32 + 1;
        let mut index = GridIndex {
            cell,
            origin: min,
            cols,
            buckets: vec![Vec::new(); (cols * rows) as usize],
        };
        for (i, &p) in points.iter().enumerate() {
            let b = index.bucket_of(p);
            index.buckets[b].push(i);
        }
        index
    }

    fn bucket_of(&self, p: Vec2) -> usize {
        let cx = ((p.x - self.origin.x) / self.cell).floor() as i32;
        let cy = ((p.y - self.origin.y) / self.cell).floor() as i32;
        (cy * self.cols + cx) as usize
    }

    /// Indices of all points within `radius` of `center`, ascending.
    fn query(&self, points: &[Vec2], center: Vec2, radius: f32) -> Vec<usize> {
        let rows = self.buckets.len() as i32 / self.cols;
        let c0x = (((center.x - radius - self.origin.x) / self.cell).floor() as i32).max(0);
        let c1x = (((center.x + radius - self.origin.x) / self.cell).floor() as i32).min(self.cols - 1);
        let c0y = (((center.y - radius - self.origin.y) / self.cell).floor() as i32).max(0);
        let c1y = (((center.y + radius - self.origin.y) / self.cell).floor() as i32).min(rows - 1);
        let mut out = Vec::new();
        for cy in c0y..=c1y {
            for cx in c0x..=c1x {
                for &i in &self.buckets[(cy * self.cols + cx) as usize] {
                    if points[i].distance(center) <= radius {
                        out.push(i);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

/// Edge `(i, j)` survives iff no third node `k` is strictly closer to both
/// endpoints than they are to each other.
fn relative_neighborhood_graph(nodes: &[Vec2], config: &Config) -> Vec<BTreeSet<usize>> {
    let n = nodes.len();
    let mut adjacency = vec![BTreeSet::new(); n];
    if n < 2 {
        return adjacency;
    }
    let mut min = Vec2::splat(f32::INFINITY);
    let mut max = Vec2::splat(f32::NEG_INFINITY);
    for &p in nodes {
        min = min.min(p);
        max = max.max(p);
    }
    let extent = (max - min).max_element().max(1e-6);
    let index = GridIndex::build(nodes, extent / 8.0);

    for i in 0..n {
        for j in (i + 1)..n {
            let dij = nodes[i].distance(nodes[j]);
            if dij < config.min_distance {
                continue;
            }
            let blockers = index.query(nodes, nodes[i], dij);
            let blocked = blockers.iter().any(|&k| {
                k != i
                    && k != j
                    && nodes[i].distance(nodes[k]) < dij
                    && nodes[j].distance(nodes[k]) < dij
            });
            if !blocked {
                adjacency[i].insert(j);
                adjacency[j].insert(i);
            }
        }
    }
    adjacency
}

// ---------------------------------------------------------------------------
// Strokes
// ---------------------------------------------------------------------------

/// Random walks over the graph, consuming each traversed edge, until no
/// edges remain. Walks shorter than two nodes are discarded.
fn random_walk_strokes(
    mut adjacency: Vec<BTreeSet<usize>>,
    config: &Config,
    rng: &mut ChaCha8Rng,
) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut strokes = Vec::new();
    loop {
        let candidates: Vec<usize> = (0..n).filter(|&i| !adjacency[i].is_empty()).collect();
        if candidates.is_empty() {
            break;
        }
        let start = candidates[rng.gen_range(0..candidates.len())];
        let mut stroke = vec![start];
        let mut current = start;
        let steps = rng.gen_range(config.walk_min_steps..=config.walk_max_steps);
        for _ in 0..steps {
            if adjacency[current].is_empty() {
                break;
            }
            let neighbors: Vec<usize> = adjacency[current].iter().copied().collect();
            let next = neighbors[rng.gen_range(0..neighbors.len())];
            adjacency[current].remove(&next);
            adjacency[next].remove(&current);
            stroke.push(next);
            current = next;
        }
        if stroke.len() >= 2 {
            strokes.push(stroke);
        }
    }
    strokes
}

/// Snap each segment direction to the nearest multiple of `snap_angle`
/// degrees while preserving segment length. Collapsed points are dropped.
fn snap_stroke(original: &[Vec2], snap_angle: f32) -> Vec<Vec2> {
    if original.len() < 2 {
        return original.to_vec();
    }
    let mut snapped = vec![original[0]];
    for &point in &original[1..] {
        let last = *snapped.last().unwrap();
        let delta = point - last;
        let len = delta.length();
        if len < 1e-10 {
            continue;
        }
        let theta_deg = delta.y.atan2(delta.x).to_degrees();
        let snapped_theta = ((theta_deg / snap_angle).round() * snap_angle).to_radians();
        let next = last + len * Vec2::new(snapped_theta.cos(), snapped_theta.sin());
        if next.distance(last) < 1e-10 {
            continue;
        }
        snapped.push(next);
    }
    snapped
}

/// Replace each interior corner B with a quadratic Bézier clamped to
/// `min(radius, |BA|/2, |BC|/2)`, sampled at `arc_points` interior
/// t-values.
fn smooth_polyline(polyline: &[Vec2], radius: f32, arc_points: usize) -> Vec<Vec2> {
    if polyline.len() < 3 {
        return polyline.to_vec();
    }
    let mut out = vec![polyline[0]];
    for i in 1..polyline.len() - 1 {
        let (a, b, c) = (polyline[i - 1], polyline[i], polyline[i + 1]);
        let ba = a - b;
        let bc = c - b;
        let (dab, dbc) = (ba.length(), bc.length());
        if dab < 1e-10 || dbc < 1e-10 {
            continue;
        }
        let d = radius.min(dab / 2.0).min(dbc / 2.0);
        let a_prime = b + ba / dab * d;
        let c_prime = b + bc / dbc * d;
        if out.last().unwrap().distance(a_prime) > 0.1 {
            out.push(a_prime);
        }
        for k in 1..=arc_points {
            let t = k as f32 / (arc_points + 1) as f32;
            let mt = 1.0 - t;
            out.push(mt * mt * a_prime + 2.0 * mt * t * b + t * t * c_prime);
        }
        out.push(c_prime);
    }
    out.push(*polyline.last().unwrap());
    out
}

// ---------------------------------------------------------------------------
// Diacritics
// ---------------------------------------------------------------------------

const DIACRITIC_KINDS: [&str; 8] = [
    "circle",
    "tilde",
    "grave",
    "umlaut",
    "acute",
    "circumflex",
    "caron",
    "cedilla",
];

fn diacritic_lines(kind: &str, center: Vec2, radius: f32) -> Vec<Vec<[f32; 3]>> {
    let line = |points: Vec<Vec2>| points.iter().map(|p| [p.x, p.y, 0.0]).collect::<Vec<_>>();
    match kind {
        "circle" => vec![line(circle_points(center, radius, 20))],
        "tilde" => {
            let n = 10;
            vec![line(
                (0..n)
                    .map(|i| {
                        let t = i as f32 / (n - 1) as f32;
                        Vec2::new(
                            center.x - radius + t * radius * 2.0,
                            center.y + radius / 2.0 * (std::f32::consts::PI * t).sin(),
                        )
                    })
                    .collect(),
            )]
        }
        "grave" => vec![line(vec![
            center,
            center + Vec2::new(-radius * 0.8, radius * 0.4),
        ])],
        "umlaut" => {
            let dot = radius * 0.3;
            vec![
                line(circle_points(center + Vec2::new(-radius * 0.5, 0.0), dot, 20)),
                line(circle_points(center + Vec2::new(radius * 0.5, 0.0), dot, 20)),
            ]
        }
        "acute" => vec![line(vec![
            center + Vec2::new(-radius * 0.3, radius * 0.2),
            center + Vec2::new(radius * 0.3, radius * 0.7),
        ])],
        "circumflex" => vec![line(vec![
            center + Vec2::new(-radius, 0.0),
            center + Vec2::new(0.0, radius),
            center + Vec2::new(radius, 0.0),
        ])],
        "caron" => vec![line(vec![
            center + Vec2::new(-radius, radius * 0.2),
            center + Vec2::new(0.0, -radius * 0.2),
            center + Vec2::new(radius, radius * 0.2),
        ])],
        "cedilla" => {
            let n = 8;
            let start = center + Vec2::new(-radius * 0.5, -radius * 0.2);
            let end = center + Vec2::new(radius * 0.5, -radius * 0.2);
            let control = center + Vec2::new(0.0, -radius * 0.8);
            vec![line(
                (0..n)
                    .map(|i| {
                        let t = i as f32 / (n - 1) as f32;
                        let mt = 1.0 - t;
                        mt * mt * start + 2.0 * mt * t * control + t * t * end
                    })
                    .collect(),
            )]
        }
        _ => unreachable!("kind comes from DIACRITIC_KINDS"),
    }
}

fn circle_points(center: Vec2, radius: f32, sides: usize) -> Vec<Vec2> {
    let mut points: Vec<Vec2> = (0..sides)
        .map(|i| {
            let angle = std::f32::consts::TAU * i as f32 / sides as f32;
            center + radius * Vec2::new(angle.cos(), angle.sin())
        })
        .collect();
    points.push(points[0]);
    points
}

/// Attach at most one diacritic: walk the used nodes in index order and stop
/// after the first success.
fn add_diacritic(
    lines: &mut Vec<Vec<[f32; 3]>>,
    nodes: &[Vec2],
    used: &BTreeSet<usize>,
    probability: f64,
    radius: f32,
    rng: &mut ChaCha8Rng,
) {
    for &i in used {
        if rng.gen_range(0.0..1.0) < probability {
            let offset = Vec2::new(
                rng.gen_range(-radius..=radius),
                rng.gen_range(-radius..=radius),
            );
            let kind = DIACRITIC_KINDS[rng.gen_range(0..DIACRITIC_KINDS.len())];
            lines.extend(diacritic_lines(kind, nodes[i] + offset, radius));
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produce(params: ParamSet) -> Geometry {
        AsemicGlyph.produce(&params).unwrap()
    }

    #[test]
    fn identical_seed_identical_output() {
        let params = ParamSet::new().with("seed", 1234).with("placement", "poisson");
        let a = produce(params.clone());
        let b = produce(params);
        assert_eq!(a.coords(), b.coords());
        assert_eq!(a.offsets(), b.offsets());
    }

    #[test]
    fn different_seeds_differ() {
        let a = produce(ParamSet::new().with("seed", 1));
        let b = produce(ParamSet::new().with("seed", 2));
        assert_ne!(a.coords(), b.coords());
    }

    #[test]
    fn output_stays_near_region() {
        let g = produce(ParamSet::new().with("seed", 9));
        if let Some((min, max)) = g.bounds() {
            // Snap drift and diacritics may poke past the region, but never
            // anywhere near a full region-width away.
            assert!(min.x > -1.0 && min.y > -1.0);
            assert!(max.x < 1.0 && max.y < 1.0);
        }
    }

    #[test]
    fn all_placement_modes_produce() {
        for mode in ["grid", "hexagon", "poisson", "spiral", "radial", "concentric"] {
            let g = produce(ParamSet::new().with("seed", 5).with("placement", mode));
            assert!(g.line_count() > 0, "{mode} produced no strokes");
        }
    }

    #[test]
    fn unknown_placement_is_invalid() {
        let err = AsemicGlyph
            .produce(&ParamSet::new().with("placement", "scatter"))
            .unwrap_err();
        assert!(matches!(err, ShapeError::InvalidParameter { name: "placement", .. }));
    }

    #[test]
    fn degenerate_region_is_invalid() {
        let err = AsemicGlyph
            .produce(&ParamSet::new().with("region", vec![0.5, 0.0, -0.5, 1.0]))
            .unwrap_err();
        assert!(matches!(err, ShapeError::InvalidParameter { name: "region", .. }));
    }

    #[test]
    fn rng_graph_blocks_dominated_edges() {
        // Three collinear points: the outer pair is dominated by the middle
        // node, so only the two short edges survive.
        let nodes = vec![Vec2::new(0.0, 0.0), Vec2::new(0.3, 0.0), Vec2::new(0.6, 0.0)];
        let config = Config {
            min_distance: 0.0,
            snap_angle_degrees: 60.0,
            smoothing_points: 5,
            walk_min_steps: 2,
            walk_max_steps: 4,
            poisson_radius_divisor: 8.0,
            poisson_trials: 30,
        };
        let adjacency = relative_neighborhood_graph(&nodes, &config);
        assert!(adjacency[0].contains(&1));
        assert!(adjacency[1].contains(&2));
        assert!(!adjacency[0].contains(&2), "long edge must be blocked");
    }

    #[test]
    fn snap_quantizes_directions_and_keeps_reach() {
        let stroke = vec![Vec2::new(0.0, 0.0), Vec2::new(0.3, 0.1), Vec2::new(0.5, 0.4)];
        let snapped = snap_stroke(&stroke, 60.0);
        assert_eq!(snapped.len(), 3);
        for w in snapped.windows(2) {
            let angle = (w[1] - w[0]).y.atan2((w[1] - w[0]).x).to_degrees();
            let remainder = (angle / 60.0).round() * 60.0 - angle;
            assert!(remainder.abs() < 1e-3, "angle {angle} not snapped");
        }
        // Each snapped segment keeps the distance from the running endpoint
        // to the next original point.
        let l0 = snapped[0].distance(snapped[1]);
        assert!((l0 - stroke[0].distance(stroke[1])).abs() < 1e-5);
        let l1 = snapped[1].distance(snapped[2]);
        assert!((l1 - snapped[1].distance(stroke[2])).abs() < 1e-5);
    }

    #[test]
    fn smoothing_inserts_arc_points() {
        let corner = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)];
        let smoothed = smooth_polyline(&corner, 0.2, 5);
        assert!(smoothed.len() > corner.len());
        assert_eq!(smoothed[0], corner[0]);
        assert_eq!(*smoothed.last().unwrap(), corner[2]);
    }
}
