//! LRU memoization over shape production.
//!
//! Entries are `Arc<Geometry>` handles, so eviction never invalidates a
//! buffer still referenced by a downstream stage; the allocation is freed
//! when the last in-flight consumer drops its handle.
//!
//! Concurrency: the cache is read-mostly after warmup. A single-writer-per-
//! key policy avoids duplicate production: on a concurrent miss for the
//! same key, the second caller parks on a condvar until the first caller's
//! result lands (or its failure clears the in-flight mark, at which point
//! the waiter takes over production).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeRegistry};

/// Cache key: interned producer name plus canonicalized params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub name: Arc<str>,
    pub params: ParamSet,
}

impl ShapeKey {
    pub fn new(name: &str, params: &ParamSet) -> Self {
        Self {
            name: Arc::from(name),
            params: params.clone(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    geometry: Arc<Geometry>,
    /// Logical timestamp of the most recent hit; smallest stamp evicts first.
    stamp: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ShapeKey, Entry, ahash::RandomState>,
    in_flight: HashSet<ShapeKey, ahash::RandomState>,
    clock: u64,
}

/// Hit/miss/eviction counters, relaxed atomics (same pattern as the runtime
/// telemetry counters).
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    waits: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub waits: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}

/// Bounded LRU cache in front of a [`ShapeRegistry`].
pub struct ShapeCache {
    registry: Arc<ShapeRegistry>,
    state: Mutex<CacheState>,
    settled: Condvar,
    capacity: usize,
    stats: CacheStats,
}

impl ShapeCache {
    pub const DEFAULT_CAPACITY: usize = 128;

    pub fn new(registry: Arc<ShapeRegistry>) -> Self {
        Self::with_capacity(registry, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(registry: Arc<ShapeRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            state: Mutex::new(CacheState::default()),
            settled: Condvar::new(),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<ShapeRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().entries.clear();
    }

    /// Produce `name` with `params`, returning the cached handle on a hit.
    ///
    /// Errors are never cached: a failed production clears the in-flight
    /// mark and surfaces the error to exactly the caller that produced it.
    pub fn produce(&self, name: &str, params: &ParamSet) -> Result<Arc<Geometry>, ShapeError> {
        let key = ShapeKey::new(name, params);
        {
            let mut state = self.state.lock().unwrap();
            loop {
                if state.entries.contains_key(&key) {
                    state.clock += 1;
                    let stamp = state.clock;
                    let entry = state.entries.get_mut(&key).unwrap();
                    entry.stamp = stamp;
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(&entry.geometry));
                }
                if state.in_flight.contains(&key) {
                    // Another caller is producing this key; wait for it to
                    // settle and re-check (it may have failed).
                    self.stats.waits.fetch_add(1, Ordering::Relaxed);
                    state = self.settled.wait(state).unwrap();
                    continue;
                }
                state.in_flight.insert(key.clone());
                break;
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target: "shapes.cache", shape = name, "cache_miss");
        let produced = self.registry.produce(name, params);

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&key);
        let result = match produced {
            Ok(geometry) => {
                let geometry = Arc::new(geometry);
                state.clock += 1;
                let stamp = state.clock;
                state.entries.insert(
                    key,
                    Entry {
                        geometry: Arc::clone(&geometry),
                        stamp,
                    },
                );
                while state.entries.len() > self.capacity {
                    let victim = state
                        .entries
                        .iter()
                        .min_by_key(|(_, e)| e.stamp)
                        .map(|(k, _)| k.clone())
                        .expect("non-empty over-capacity cache");
                    state.entries.remove(&victim);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
                Ok(geometry)
            }
            Err(err) => Err(err),
        };
        drop(state);
        self.settled.notify_all();
        result
    }
}
