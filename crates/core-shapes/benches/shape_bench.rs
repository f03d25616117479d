//! Hot-path benchmarks: raw shape production vs the cache hit path.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use core_geometry::params::ParamSet;
use core_shapes::{ShapeCache, ShapeRegistry, register_builtins};

fn registry() -> Arc<ShapeRegistry> {
    let registry = Arc::new(ShapeRegistry::new());
    register_builtins(&registry);
    registry.seal();
    registry
}

fn bench_produce_uncached(c: &mut Criterion) {
    let registry = registry();
    let sphere = ParamSet::new().with("subdivisions", 2).with("style", "wireframe");
    c.bench_function("sphere_wireframe_sub2", |b| {
        b.iter(|| registry.produce("sphere", black_box(&sphere)).unwrap())
    });

    let glyph = ParamSet::new().with("seed", 42);
    c.bench_function("asemic_glyph_default", |b| {
        b.iter(|| registry.produce("asemic_glyph", black_box(&glyph)).unwrap())
    });

    let attractor = ParamSet::new().with("system", "lorenz").with("steps", 10_000);
    c.bench_function("lorenz_10k_steps", |b| {
        b.iter(|| registry.produce("attractor", black_box(&attractor)).unwrap())
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let cache = ShapeCache::new(registry());
    let params = ParamSet::new().with("subdivisions", 2).with("style", "rings");
    cache.produce("sphere", &params).unwrap();
    c.bench_function("sphere_cache_hit", |b| {
        b.iter(|| cache.produce("sphere", black_box(&params)).unwrap())
    });
}

criterion_group!(benches, bench_produce_uncached, bench_cache_hit);
criterion_main!(benches);
