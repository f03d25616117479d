//! Planar primitives: regular polygon, grid, lissajous curve.

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

/// numpy-style inclusive linspace; `n == 1` yields `[start]`.
pub(crate) fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f32;
            (0..n).map(|i| start + step * i as f32).collect()
        }
    }
}

/// Closed regular polygon inscribed in a unit-diameter circle; the closing
/// vertex repeats the first, so `n_sides` sides yield `n_sides + 1` points.
pub struct Polygon;

impl Polygon {
    const MIN_SIDES: i64 = 3;
}

impl ShapeSource for Polygon {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let n_sides = params.i64_or("n_sides", 3).max(Self::MIN_SIDES) as usize;
        let mut line = Vec::with_capacity(n_sides + 1);
        for i in 0..n_sides {
            let theta = std::f32::consts::TAU * i as f32 / n_sides as f32;
            line.push([theta.cos() * 0.5, theta.sin() * 0.5, 0.0]);
        }
        line.push(line[0]);
        Ok(Geometry::from_polylines([line]))
    }
}

/// `nx` vertical + `ny` horizontal two-point lines spanning the unit square
/// `[-0.5, 0.5]²` at z = 0.
pub struct Grid;

impl ShapeSource for Grid {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let nx = params.i64_or("nx", 10).max(0) as usize;
        let ny = params.i64_or("ny", 10).max(0) as usize;
        let mut lines = Vec::with_capacity(nx + ny);
        for x in linspace(-0.5, 0.5, nx) {
            lines.push(vec![[x, -0.5, 0.0], [x, 0.5, 0.0]]);
        }
        for y in linspace(-0.5, 0.5, ny) {
            lines.push(vec![[-0.5, y, 0.0], [0.5, y, 0.0]]);
        }
        Ok(Geometry::from_polylines(lines))
    }
}

/// One open polyline sampling `(sin(fx·t + φ), sin(fy·t))` over `t ∈ [0, 2π]`.
pub struct Lissajous;

impl ShapeSource for Lissajous {
    fn name(&self) -> &'static str {
        "lissajous"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let freq_x = params.f64_or("freq_x", 3.0) as f32;
        let freq_y = params.f64_or("freq_y", 2.0) as f32;
        let phase = params.f64_or("phase", 0.0) as f32;
        let samples = params.i64_or("samples", 1000);
        if samples < 2 {
            return Err(ShapeError::InvalidParameter {
                shape: "lissajous",
                name: "samples",
                reason: format!("need at least 2 samples, got {samples}"),
            });
        }
        let line: Vec<[f32; 3]> = linspace(0.0, std::f32::consts::TAU, samples as usize)
            .into_iter()
            .map(|t| [(freq_x * t + phase).sin() * 0.5, (freq_y * t).sin() * 0.5, 0.0])
            .collect();
        Ok(Geometry::from_polylines([line]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn produce(shape: &dyn ShapeSource, params: ParamSet) -> Geometry {
        shape.produce(&params).unwrap()
    }

    #[test]
    fn triangle_closes_on_unit_circle() {
        let g = produce(&Polygon, ParamSet::new().with("n_sides", 3));
        assert_eq!(g.line_count(), 1);
        let line = g.polyline(0).unwrap();
        assert_eq!(line.len(), 4);
        assert_eq!(line[0], line[3], "closing vertex equals the first");
        for p in &line[..3] {
            let r = (p[0] * p[0] + p[1] * p[1]).sqrt();
            assert!((r - 0.5).abs() < 1e-6, "vertex radius {r} not on diameter-1 circle");
        }
    }

    #[test]
    fn polygon_clamps_small_side_counts() {
        let g = produce(&Polygon, ParamSet::new().with("n_sides", 1));
        assert_eq!(g.polyline(0).unwrap().len(), 4, "n_sides < 3 clamps to a triangle");
    }

    #[test]
    fn grid_counts_match_divisions() {
        let g = produce(&Grid, ParamSet::new().with("nx", 3).with("ny", 5));
        assert_eq!(g.line_count(), 8);
        for line in g.polylines() {
            assert_eq!(line.len(), 2);
            assert!(line.iter().all(|p| p[2] == 0.0));
        }
    }

    #[test]
    fn grid_zero_divisions_is_empty() {
        let g = produce(&Grid, ParamSet::new().with("nx", 0).with("ny", 0));
        assert!(g.is_empty());
    }

    #[test]
    fn lissajous_is_one_open_polyline() {
        let g = produce(&Lissajous, ParamSet::new().with("samples", 64));
        assert_eq!(g.line_count(), 1);
        assert_eq!(g.point_count(), 64);
        let line = g.polyline(0).unwrap();
        assert!(line.iter().all(|p| p[0].abs() <= 0.5 + 1e-6 && p[1].abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn lissajous_rejects_degenerate_sampling() {
        let err = Lissajous.produce(&ParamSet::new().with("samples", 1)).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidParameter { name: "samples", .. }));
    }
}
