//! Immutable effect chains and the chain-result cache.
//!
//! A chain is a base buffer plus a persistent step list: `add_step` returns
//! a new chain sharing the existing prefix (cons cells behind `Arc`), so
//! sketches can fork a common stem into many variants without copying step
//! vectors every frame.
//!
//! `result()` memoizes only the final buffer, keyed by
//! `(base id, step digests)`. Intermediates are deliberately uncached: the
//! per-shape cache upstream already deduplicates the expensive producers,
//! and caching every prefix would triple memory for little hit rate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use core_geometry::{Geometry, GeometryId};

use crate::step::EffectStep;
use crate::{EffectError, Effects};

/// Cache key: identity of the base buffer plus the ordered step digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub base: GeometryId,
    pub steps: Vec<u64>,
}

struct ChainEntry {
    geometry: Arc<Geometry>,
    /// Step names retained for invalidation on effect re-registration.
    step_names: Vec<Arc<str>>,
    stamp: u64,
}

/// Bounded LRU over finished chain results.
pub(crate) struct ChainCache {
    entries: Mutex<HashMap<ChainKey, ChainEntry, ahash::RandomState>>,
    clock: AtomicU64,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChainCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::default()),
            clock: AtomicU64::new(0),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &ChainKey) -> Option<Arc<Geometry>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.geometry))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn insert(&self, key: ChainKey, geometry: Arc<Geometry>, step_names: Vec<Arc<str>>) {
        let mut entries = self.entries.lock().unwrap();
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        entries.insert(
            key,
            ChainEntry {
                geometry,
                step_names,
                stamp,
            },
        );
        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone())
                .expect("non-empty over-capacity cache");
            entries.remove(&victim);
        }
    }

    /// Drop every entry whose step list names `effect`; returns the count.
    pub(crate) fn invalidate_effect(&self, effect: &str) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.step_names.iter().any(|n| &**n == effect));
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Persistent step list node; `prev` links toward the chain's start.
struct StepNode {
    step: EffectStep,
    prev: Option<Arc<StepNode>>,
}

/// An immutable chain of effects over one base buffer.
#[derive(Clone)]
pub struct EffectChain {
    effects: Arc<Effects>,
    base: Arc<Geometry>,
    tail: Option<Arc<StepNode>>,
    len: usize,
}

impl EffectChain {
    pub(crate) fn on(effects: Arc<Effects>, base: Arc<Geometry>) -> Self {
        Self {
            effects,
            base,
            tail: None,
            len: 0,
        }
    }

    /// Append a step, returning a new chain. The receiver is unchanged and
    /// shares its step prefix with the result.
    pub fn add_step(&self, step: EffectStep) -> Self {
        Self {
            effects: Arc::clone(&self.effects),
            base: Arc::clone(&self.base),
            tail: Some(Arc::new(StepNode {
                step,
                prev: self.tail.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Convenience: append a step by name and params.
    pub fn step(&self, name: &str, params: core_geometry::params::ParamSet) -> Self {
        self.add_step(EffectStep::new(name, params))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Steps in application order.
    pub fn steps(&self) -> Vec<EffectStep> {
        let mut steps = Vec::with_capacity(self.len);
        let mut node = self.tail.as_deref();
        while let Some(n) = node {
            steps.push(n.step.clone());
            node = n.prev.as_deref();
        }
        steps.reverse();
        steps
    }

    pub fn key(&self) -> ChainKey {
        ChainKey {
            base: self.base.id(),
            steps: self.steps().iter().map(EffectStep::digest).collect(),
        }
    }

    /// Execute the chain (or return the cached final buffer).
    ///
    /// Errors abort execution and are never recorded in the cache, so a
    /// later call after fixing the registry re-runs the chain.
    pub fn result(&self) -> Result<Arc<Geometry>, EffectError> {
        let steps = self.steps();
        if steps.is_empty() {
            return Ok(Arc::clone(&self.base));
        }
        let key = ChainKey {
            base: self.base.id(),
            steps: steps.iter().map(EffectStep::digest).collect(),
        };
        if let Some(cached) = self.effects.cache().get(&key) {
            tracing::trace!(target: "effects.chain", steps = steps.len(), "chain_cache_hit");
            return Ok(cached);
        }
        let produced = Arc::new(self.effects.apply_steps(&self.base, &steps)?);
        let step_names = steps.iter().map(|s| Arc::from(s.name())).collect();
        self.effects.cache().insert(key, Arc::clone(&produced), step_names);
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EffectsHandle, register_builtins};
    use core_geometry::params::ParamSet;

    fn effects() -> Arc<Effects> {
        let e = Effects::new();
        register_builtins(&e);
        Arc::new(e)
    }

    fn base() -> Arc<Geometry> {
        Arc::new(Geometry::from_polylines([vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
        ]]))
    }

    fn translate(v: [f64; 3]) -> ParamSet {
        ParamSet::new().with("offset", vec![v[0], v[1], v[2]])
    }

    #[test]
    fn empty_chain_returns_base_handle() {
        let effects = effects();
        let g = base();
        let out = effects.chain(Arc::clone(&g)).result().unwrap();
        assert!(Arc::ptr_eq(&g, &out));
    }

    #[test]
    fn chain_matches_sequential_application() {
        let effects = effects();
        let g = base();
        let chained = effects
            .chain(Arc::clone(&g))
            .step("translate", translate([1.0, 0.0, 0.0]))
            .step("scale", ParamSet::new().with("factors", vec![2.0, 2.0, 2.0]))
            .result()
            .unwrap();
        let manual = effects
            .apply(
                "scale",
                &effects.apply("translate", &g, &translate([1.0, 0.0, 0.0])).unwrap(),
                &ParamSet::new().with("factors", vec![2.0, 2.0, 2.0]),
            )
            .unwrap();
        assert_eq!(chained.coords(), manual.coords());
    }

    #[test]
    fn identical_chains_share_the_cached_instance() {
        let effects = effects();
        let g = base();
        let first = effects
            .chain(Arc::clone(&g))
            .step("translate", translate([1.0, 2.0, 3.0]))
            .result()
            .unwrap();
        let second = effects
            .chain(Arc::clone(&g))
            .step("translate", translate([1.0, 2.0, 3.0]))
            .result()
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second), "second result must be the cache hit");
        assert_eq!(effects.cache().hit_count(), 1);
        let third = effects
            .chain(Arc::clone(&g))
            .step("translate", translate([1.0, 2.0, 3.5]))
            .result()
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third), "any param change must miss");
    }

    #[test]
    fn distinct_bases_do_not_collide() {
        let effects = effects();
        let a = base();
        let b = base();
        let ra = effects
            .chain(Arc::clone(&a))
            .step("translate", translate([1.0, 0.0, 0.0]))
            .result()
            .unwrap();
        let rb = effects
            .chain(Arc::clone(&b))
            .step("translate", translate([1.0, 0.0, 0.0]))
            .result()
            .unwrap();
        assert!(!Arc::ptr_eq(&ra, &rb), "same coords, different provenance");
    }

    #[test]
    fn prefix_sharing_forks_cheaply() {
        let effects = effects();
        let stem = effects
            .chain(base())
            .step("translate", translate([1.0, 0.0, 0.0]));
        let fork_a = stem.step("scale", ParamSet::new().with("factors", vec![2.0, 1.0, 1.0]));
        let fork_b = stem.step("scale", ParamSet::new().with("factors", vec![1.0, 2.0, 1.0]));
        assert_eq!(stem.len(), 1);
        assert_eq!(fork_a.len(), 2);
        assert_eq!(fork_b.len(), 2);
        let a = fork_a.result().unwrap();
        let b = fork_b.result().unwrap();
        assert_ne!(a.coords(), b.coords());
    }

    #[test]
    fn reregistration_invalidates_matching_chains() {
        let effects = effects();
        let g = base();
        let chain = effects
            .chain(Arc::clone(&g))
            .step("translate", translate([1.0, 0.0, 0.0]));
        let first = chain.result().unwrap();
        let again = chain.result().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // Replace translate with a kernel that doubles the offset.
        effects.register(crate::FnEffect::new("translate", |g, params| {
            let [dx, dy, dz] = params.vec3_or("offset", [0.0; 3]);
            Ok(g.translated(glam::Vec3::new(2.0 * dx as f32, 2.0 * dy as f32, 2.0 * dz as f32)))
        }));
        let replaced = chain.result().unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced), "cache entry must have been dropped");
        assert_eq!(replaced.coords()[1], [3.0, 0.0, 0.0]);
    }

    #[test]
    fn error_results_are_not_cached() {
        let effects = Arc::new(Effects::new());
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        effects.register(crate::FnEffect::new("boom", |_g, _p| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Err(EffectError::Kernel("boom".into()))
        }));
        let chain = effects.chain(base()).step("boom", ParamSet::new());
        assert!(chain.result().is_err());
        assert!(chain.result().is_err());
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
        assert_eq!(effects.cache().len(), 0);
    }
}
