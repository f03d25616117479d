//! Named deterministic shape producers with content-addressed memoization.
//!
//! A shape is any value implementing [`ShapeSource`]: a stable name plus a
//! pure `produce(params) -> Geometry` function. Producers are registered
//! explicitly in an init routine ([`register_builtins`]) before the frame
//! clock starts; the registry is sealed at that point and later mutation is
//! a contract violation (debug-asserted).
//!
//! Determinism is a correctness requirement, not a nicety: the
//! [`cache::ShapeCache`] memoizes by `(name, canonicalized params)`, so a
//! producer consulting hidden state would poison every downstream consumer.
//! Stochastic shapes take their seed as an explicit parameter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

pub mod asemic;
pub mod attractor;
pub mod cache;
pub mod polyhedron;
pub mod primitives;
pub mod revolve;
pub mod sphere;
pub mod text;

pub use cache::{CacheStatsSnapshot, ShapeCache};
pub use text::{GlyphSource, TextShape};

/// Errors surfaced by shape lookup and production.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("unknown shape `{0}`")]
    UnknownShape(String),
    #[error("invalid parameter `{name}` for shape `{shape}`: {reason}")]
    InvalidParameter {
        shape: &'static str,
        name: &'static str,
        reason: String,
    },
}

/// Capability set satisfied by every shape producer: a stable name and a
/// deterministic production function. Built-ins are unit structs; user
/// producers can use [`FnShape`] instead of implementing the trait.
pub trait ShapeSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError>;
}

/// Function-pointer shape for user-supplied producers.
pub struct FnShape {
    name: &'static str,
    f: Box<dyn Fn(&ParamSet) -> Result<Geometry, ShapeError> + Send + Sync>,
}

impl FnShape {
    pub fn new(
        name: &'static str,
        f: impl Fn(&ParamSet) -> Result<Geometry, ShapeError> + Send + Sync + 'static,
    ) -> Self {
        Self { name, f: Box::new(f) }
    }
}

impl ShapeSource for FnShape {
    fn name(&self) -> &'static str {
        self.name
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        (self.f)(params)
    }
}

/// Central name → producer table. Read-mostly after init; reads come from
/// worker threads concurrently, so the table sits behind an `RwLock`.
#[derive(Default)]
pub struct ShapeRegistry {
    table: RwLock<HashMap<String, Arc<dyn ShapeSource>, ahash::RandomState>>,
    sealed: AtomicBool,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer under its own name. Replaces any previous entry.
    pub fn register(&self, source: impl ShapeSource + 'static) {
        self.register_arc(Arc::new(source));
    }

    pub fn register_arc(&self, source: Arc<dyn ShapeSource>) {
        debug_assert!(
            !self.sealed.load(Ordering::Relaxed),
            "shape registry mutated after seal()"
        );
        let name = source.name().to_owned();
        tracing::debug!(target: "shapes.registry", shape = name.as_str(), "register_shape");
        self.table.write().unwrap().insert(name, source);
    }

    /// Mark init complete. Registration afterwards trips a debug assertion;
    /// release builds still accept it (contract violation, not UB).
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Relaxed);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ShapeSource>, ShapeError> {
        self.table
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ShapeError::UnknownShape(name.to_owned()))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.read().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Produce directly, bypassing the cache. Prefer [`ShapeCache::produce`].
    pub fn produce(&self, name: &str, params: &ParamSet) -> Result<Geometry, ShapeError> {
        self.get(name)?.produce(params)
    }
}

/// Register the built-in shape family. The `text` shape needs a glyph source
/// and is registered separately via [`TextShape::new`].
pub fn register_builtins(registry: &ShapeRegistry) {
    registry.register(primitives::Polygon);
    registry.register(primitives::Grid);
    registry.register(primitives::Lissajous);
    registry.register(sphere::Sphere);
    registry.register(polyhedron::Polyhedron);
    registry.register(revolve::Torus);
    registry.register(revolve::Cylinder);
    registry.register(revolve::Cone);
    registry.register(revolve::Capsule);
    registry.register(attractor::Attractor);
    registry.register(asemic::AsemicGlyph);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = ShapeRegistry::new();
        register_builtins(&registry);
        registry.seal();
        for name in [
            "polygon",
            "grid",
            "lissajous",
            "sphere",
            "polyhedron",
            "torus",
            "cylinder",
            "cone",
            "capsule",
            "attractor",
            "asemic_glyph",
        ] {
            assert!(registry.is_registered(name), "missing builtin {name}");
        }
    }

    #[test]
    fn unknown_shape_is_an_error() {
        let registry = ShapeRegistry::new();
        let err = registry.produce("nope", &ParamSet::new()).unwrap_err();
        assert!(matches!(err, ShapeError::UnknownShape(name) if name == "nope"));
    }

    #[test]
    fn fn_shape_produces() {
        let registry = ShapeRegistry::new();
        registry.register(FnShape::new("dot", |_p| {
            Ok(Geometry::from_polylines([vec![[0.0, 0.0, 0.0]]]))
        }));
        let g = registry.produce("dot", &ParamSet::new()).unwrap();
        assert_eq!(g.point_count(), 1);
    }

    #[test]
    fn shape_determinism_across_builtins() {
        let registry = ShapeRegistry::new();
        register_builtins(&registry);
        let cases = [
            ("polygon", ParamSet::new().with("n_sides", 7)),
            ("grid", ParamSet::new().with("nx", 4).with("ny", 2)),
            ("sphere", ParamSet::new().with("subdivisions", 1).with("style", "wireframe")),
            ("torus", ParamSet::new()),
            ("attractor", ParamSet::new().with("system", "lorenz").with("steps", 200)),
            ("asemic_glyph", ParamSet::new().with("seed", 7)),
        ];
        for (name, params) in cases {
            let a = registry.produce(name, &params).unwrap();
            let b = registry.produce(name, &params).unwrap();
            assert_eq!(a.coords(), b.coords(), "{name} must be deterministic");
            assert_eq!(a.offsets(), b.offsets(), "{name} must be deterministic");
        }
    }
}
