//! Named deterministic geometry effects, chains, and reusable pipelines.
//!
//! An effect is a pure `(Geometry, params) -> Geometry` kernel registered
//! under a name. Chains apply an ordered step list to one base buffer and
//! memoize the final result by `(base id, step hashes)`; pipelines are the
//! reusable form of the same step list, applicable to many inputs, with an
//! optional deterministic fusion pass and a serializable document form.
//!
//! Unlike the shape registry, effect registration stays open at runtime: a
//! sketch may register custom kernels before the first chain that names
//! them executes. Re-registering a name replaces the kernel and drops every
//! cached chain result that flowed through it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

pub mod builtin;
pub mod chain;
pub mod pipeline;
pub mod step;

pub use chain::{ChainKey, EffectChain};
pub use pipeline::{BatchPolicy, EffectPipeline, MemoryPressure, Optimization};
pub use step::EffectStep;

/// Errors surfaced by effect lookup, kernels, and chain execution.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("unknown effect `{0}`")]
    UnknownEffect(String),
    #[error("invalid parameter `{name}` for effect `{effect}`: {reason}")]
    InvalidParameter {
        effect: &'static str,
        name: &'static str,
        reason: String,
    },
    #[error("effect `{name}` failed at step {index}: {source}")]
    Step {
        index: usize,
        name: String,
        #[source]
        source: Box<EffectError>,
    },
    #[error("effect kernel error: {0}")]
    Kernel(String),
}

/// Capability set for an effect kernel: a stable name plus a deterministic
/// application function.
pub trait EffectSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, geometry: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError>;
}

/// Function-pointer effect for user-supplied kernels.
pub struct FnEffect {
    name: &'static str,
    f: Box<dyn Fn(&Geometry, &ParamSet) -> Result<Geometry, EffectError> + Send + Sync>,
}

impl FnEffect {
    pub fn new(
        name: &'static str,
        f: impl Fn(&Geometry, &ParamSet) -> Result<Geometry, EffectError> + Send + Sync + 'static,
    ) -> Self {
        Self { name, f: Box::new(f) }
    }
}

impl EffectSource for FnEffect {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, geometry: &Geometry, params: &ParamSet) -> Result<Geometry, EffectError> {
        (self.f)(geometry, params)
    }
}

/// Effect registry plus the chain-result cache it keeps consistent.
///
/// The two live together because re-registration must invalidate cached
/// chain results that named the replaced effect; splitting them would leave
/// that contract to every caller.
pub struct Effects {
    table: RwLock<HashMap<String, Arc<dyn EffectSource>, ahash::RandomState>>,
    cache: chain::ChainCache,
}

impl Effects {
    pub const DEFAULT_CHAIN_CACHE_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_chain_cache_capacity(Self::DEFAULT_CHAIN_CACHE_CAPACITY)
    }

    pub fn with_chain_cache_capacity(capacity: usize) -> Self {
        Self {
            table: RwLock::new(HashMap::default()),
            cache: chain::ChainCache::new(capacity),
        }
    }

    /// Register a kernel. Replacing an existing name drops every cached
    /// chain result whose step list includes it.
    pub fn register(&self, source: impl EffectSource + 'static) {
        self.register_arc(Arc::new(source));
    }

    pub fn register_arc(&self, source: Arc<dyn EffectSource>) {
        let name = source.name().to_owned();
        let replaced = self.table.write().unwrap().insert(name.clone(), source).is_some();
        if replaced {
            let dropped = self.cache.invalidate_effect(&name);
            tracing::debug!(
                target: "effects.registry",
                effect = name.as_str(),
                dropped_entries = dropped,
                "effect_replaced"
            );
        } else {
            tracing::debug!(target: "effects.registry", effect = name.as_str(), "register_effect");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.table.read().unwrap().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Result<Arc<dyn EffectSource>, EffectError> {
        self.table
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EffectError::UnknownEffect(name.to_owned()))
    }

    pub(crate) fn cache(&self) -> &chain::ChainCache {
        &self.cache
    }

    /// Apply one named effect directly, uncached.
    pub fn apply(
        &self,
        name: &str,
        geometry: &Geometry,
        params: &ParamSet,
    ) -> Result<Geometry, EffectError> {
        self.get(name)?.apply(geometry, params)
    }

    /// Apply an ordered step list, uncached; failures carry the step index.
    pub fn apply_steps(
        &self,
        geometry: &Geometry,
        steps: &[EffectStep],
    ) -> Result<Geometry, EffectError> {
        let mut current: Option<Geometry> = None;
        for (index, s) in steps.iter().enumerate() {
            let input = current.as_ref().unwrap_or(geometry);
            match self.apply(s.name(), input, s.params()) {
                Ok(next) => current = Some(next),
                Err(source) => {
                    return Err(EffectError::Step {
                        index,
                        name: s.name().to_owned(),
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(current.unwrap_or_else(|| geometry.clone()))
    }
}

/// Chain and pipeline constructors on the shared registry handle.
pub trait EffectsHandle {
    /// Start a chain on `base`.
    fn chain(&self, base: Arc<Geometry>) -> EffectChain;
    /// Start an empty pipeline bound to this registry.
    fn pipeline(&self) -> EffectPipeline;
}

impl EffectsHandle for Arc<Effects> {
    fn chain(&self, base: Arc<Geometry>) -> EffectChain {
        EffectChain::on(Arc::clone(self), base)
    }

    fn pipeline(&self) -> EffectPipeline {
        EffectPipeline::new(Arc::clone(self))
    }
}

impl Default for Effects {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the built-in effect family.
pub fn register_builtins(effects: &Effects) {
    builtin::register(effects);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let effects = Effects::new();
        register_builtins(&effects);
        for name in [
            "translate", "scale", "rotate", "transform", "noise", "subdivide", "extrude",
            "offset", "array", "hatch",
        ] {
            assert!(effects.is_registered(name), "missing builtin {name}");
        }
    }

    #[test]
    fn unknown_effect_is_an_error() {
        let effects = Effects::new();
        let g = Geometry::empty();
        let err = effects.apply("warp", &g, &ParamSet::new()).unwrap_err();
        assert!(matches!(err, EffectError::UnknownEffect(name) if name == "warp"));
    }

    #[test]
    fn step_failure_carries_index_and_name() {
        let effects = Effects::new();
        register_builtins(&effects);
        let g = Geometry::from_polylines([vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]]);
        let steps = vec![
            EffectStep::new("translate", ParamSet::new().with("offset", vec![1.0, 0.0, 0.0])),
            EffectStep::new("vanish", ParamSet::new()),
        ];
        let err = effects.apply_steps(&g, &steps).unwrap_err();
        match err {
            EffectError::Step { index, name, source } => {
                assert_eq!(index, 1);
                assert_eq!(name, "vanish");
                assert!(matches!(*source, EffectError::UnknownEffect(_)));
            }
            other => panic!("expected Step error, got {other:?}"),
        }
    }
}
