//! Strange-attractor trajectories as single polylines.
//!
//! The continuous systems (lorenz, rossler, aizawa, three_scroll) integrate
//! with fixed-step RK4, `state += (k1 + 2k2 + 2k3 + k4) · dt / 6`; dejong is
//! an iterated map with the step index ramped onto z. When `scale == 1.0`
//! the trajectory is recentered and fit to the unit cube, which is what a
//! sketch almost always wants; any other scale is taken literally.

use glam::Vec3;

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

pub struct Attractor;

impl ShapeSource for Attractor {
    fn name(&self) -> &'static str {
        "attractor"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let steps = params.i64_or("steps", 10_000);
        if steps < 2 {
            return Err(ShapeError::InvalidParameter {
                shape: "attractor",
                name: "steps",
                reason: format!("need at least 2 steps, got {steps}"),
            });
        }
        let steps = steps as usize;
        let dt = params.f64_or("dt", 0.01) as f32;
        let scale = params.f64_or("scale", 1.0) as f32;
        let system = params.str_or("system", "aizawa");

        let mut trajectory = match system {
            "lorenz" => integrate_rk4(System::Lorenz, Vec3::new(1.0, 1.0, 1.0), steps, dt, scale),
            "rossler" => integrate_rk4(System::Rossler, Vec3::ZERO, steps, dt, scale),
            "aizawa" => integrate_rk4(System::Aizawa, Vec3::new(0.1, 0.0, 0.0), steps, dt, scale),
            "three_scroll" => {
                integrate_rk4(System::ThreeScroll, Vec3::new(0.1, 0.0, 0.0), steps, dt, scale)
            }
            "dejong" => dejong(steps, scale),
            other => {
                return Err(ShapeError::InvalidParameter {
                    shape: "attractor",
                    name: "system",
                    reason: format!(
                        "`{other}` is not one of lorenz, rossler, aizawa, three_scroll, dejong"
                    ),
                });
            }
        };

        if scale == 1.0 {
            normalize_to_unit_cube(&mut trajectory);
        }
        Ok(Geometry::from_polylines([trajectory]))
    }
}

enum System {
    Lorenz,
    Rossler,
    Aizawa,
    ThreeScroll,
}

impl System {
    fn derivatives(&self, s: Vec3) -> Vec3 {
        match self {
            System::Lorenz => {
                let (sigma, rho, beta) = (10.0, 28.0, 8.0 / 3.0);
                Vec3::new(
                    sigma * (s.y - s.x),
                    s.x * (rho - s.z) - s.y,
                    s.x * s.y - beta * s.z,
                )
            }
            System::Rossler => {
                let (a, b, c) = (0.2, 0.2, 5.7);
                Vec3::new(-s.y - s.z, s.x + a * s.y, b + s.z * (s.x - c))
            }
            System::Aizawa => {
                let (a, b, c, d) = (0.95, 0.7, 0.6, 3.5);
                Vec3::new(
                    (s.z - b) * s.x - d * s.y,
                    d * s.x + (s.z - b) * s.y,
                    c - a * s.z - s.z * (s.x * s.x + s.y * s.y),
                )
            }
            System::ThreeScroll => {
                let (a, b, c, d, e) = (40.0, 0.833, 0.5, 0.5, 0.65);
                Vec3::new(
                    a * (s.y - s.x) + d * s.x * s.z,
                    b * s.x - s.x * s.z + c * s.y,
                    e * s.z + s.x * s.y,
                )
            }
        }
    }
}

fn integrate_rk4(system: System, mut state: Vec3, steps: usize, dt: f32, scale: f32) -> Vec<[f32; 3]> {
    let mut trajectory = Vec::with_capacity(steps);
    for _ in 0..steps {
        trajectory.push((state * scale).to_array());
        let k1 = system.derivatives(state);
        let k2 = system.derivatives(state + 0.5 * dt * k1);
        let k3 = system.derivatives(state + 0.5 * dt * k2);
        let k4 = system.derivatives(state + dt * k3);
        state += (dt / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
    }
    trajectory
}

fn dejong(steps: usize, scale: f32) -> Vec<[f32; 3]> {
    let (a, b, c, d) = (1.4f32, -2.3, 2.4, -2.1);
    let (mut x, mut y) = (0.0f32, 0.0f32);
    let mut trajectory = Vec::with_capacity(steps);
    for i in 0..steps {
        trajectory.push([x * scale, y * scale, i as f32 * scale * 0.001]);
        let nx = (a * y).sin() - (b * x).cos();
        let ny = (c * x).sin() - (d * y).cos();
        (x, y) = (nx, ny);
    }
    trajectory
}

fn normalize_to_unit_cube(points: &mut [[f32; 3]]) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for &p in points.iter() {
        let v = Vec3::from_array(p);
        min = min.min(v);
        max = max.max(v);
    }
    let center = (min + max) * 0.5;
    let extent = (max - min).max_element();
    let inv = if extent > 0.0 { 1.0 / extent } else { 1.0 };
    for p in points.iter_mut() {
        *p = ((Vec3::from_array(*p) - center) * inv).to_array();
    }
}
