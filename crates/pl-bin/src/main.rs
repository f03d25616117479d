//! Plotline entrypoint: a headless demo run of the full frame pipeline.
//!
//! Wires the engine exactly the way a window host would (sampler, pool,
//! receiver, renderer, overlay on one frame clock) but drives the clock
//! itself against a recording GPU backend, so the whole pipeline can be
//! exercised (and profiled) without a GL context. An optional config path
//! may be passed as the first argument; otherwise `plotline.toml` is
//! discovered in the working directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use core_config::{Config, ConfigContext, load_from};
use core_effects::{Effects, EffectsHandle};
use core_geometry::Geometry;
use core_geometry::params::ParamSet;
use core_render::{LineRenderer, Projection, RecordingGpu};
use core_runtime::{
    FrameClock, FrameReceiver, InputSampler, MetricsOverlay, Shared, Sketch, Snapshot, SwapBuffer,
    WorkerPool,
};
use core_shapes::{ShapeCache, ShapeRegistry, register_builtins};

/// Demo frames to produce before exiting (≈ five seconds of sketch time).
const DEMO_FRAMES: u64 = 300;

fn configure_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "plotline.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

/// The built-in demo sketch: a noisy sphere orbited by a polygon and a
/// lissajous figure, laid out in canvas millimetres. Controller mappings:
/// control 1 scales noise, control 2 picks the sphere detail.
fn demo_sketch(shapes: Arc<ShapeCache>, effects: Arc<Effects>) -> Sketch {
    Arc::new(move |t, snapshot: &Snapshot| {
        let detail = 1 + (snapshot.get_or(2, 0.4) * 3.0) as i64;
        let sphere = match shapes.produce(
            "sphere",
            &ParamSet::new().with("subdivisions", detail).with("style", "wireframe"),
        ) {
            Ok(g) => g,
            Err(_) => Arc::new(Geometry::empty()),
        };
        let polygon = shapes
            .produce("polygon", &ParamSet::new().with("n_sides", 6))
            .unwrap_or_else(|_| Arc::new(Geometry::empty()));
        let curve = shapes
            .produce(
                "lissajous",
                &ParamSet::new().with("freq_x", 3.0).with("freq_y", 2.0).with("samples", 600),
            )
            .unwrap_or_else(|_| Arc::new(Geometry::empty()));

        let intensity = 0.05 + 0.3 * snapshot.get_or(1, 0.2) as f64;
        let centered = effects
            .chain(sphere)
            .step(
                "transform",
                ParamSet::new()
                    .with("scale", vec![80.0, 80.0, 80.0])
                    .with("rotate", vec![0.0, 0.0, t * 0.4])
                    .with("translate", vec![100.0, 100.0, 0.0]),
            )
            .step(
                "noise",
                ParamSet::new()
                    .with("intensity", intensity)
                    .with("frequency", 0.08)
                    .with("t", t * 0.25),
            )
            .result();

        let orbit = effects
            .chain(polygon)
            .step(
                "transform",
                ParamSet::new()
                    .with("scale", vec![40.0, 40.0, 40.0])
                    .with("rotate", vec![0.0, 0.0, -t])
                    .with("translate", vec![
                        100.0 + 70.0 * t.cos(),
                        100.0 + 70.0 * t.sin(),
                        0.0,
                    ]),
            )
            .result();

        let backdrop = effects
            .chain(curve)
            .step(
                "transform",
                ParamSet::new()
                    .with("scale", vec![180.0, 180.0, 1.0])
                    .with("translate", vec![100.0, 100.0, 0.0]),
            )
            .result();

        let mut out = Geometry::empty();
        for part in [centered, orbit, backdrop] {
            if let Ok(g) = part {
                out = out.concat(&g);
            }
        }
        out
    })
}

fn run(config: Config) -> Result<()> {
    let registry = Arc::new(ShapeRegistry::new());
    register_builtins(&registry);
    registry.seal();
    let shapes = Arc::new(ShapeCache::with_capacity(
        Arc::clone(&registry),
        config.file.cache.shape_entries,
    ));
    let effects = Arc::new(Effects::with_chain_cache_capacity(
        config.file.cache.chain_entries,
    ));
    core_effects::register_builtins(&effects);

    let projection = Projection::orthographic_mm(
        config.file.canvas.width_mm,
        config.file.canvas.height_mm,
    );
    info!(
        target: "runtime",
        canvas = ?projection.canvas_mm(),
        fps = config.effective_fps,
        workers = config.effective_workers,
        "startup"
    );

    let swap: Arc<SwapBuffer<Arc<Geometry>>> = Arc::new(SwapBuffer::new());
    let (sampler_stage, sampler) = Shared::new(InputSampler::new("plotline-demo"));
    let snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync> = {
        let sampler = Arc::clone(&sampler);
        Arc::new(move || sampler.lock().unwrap().snapshot())
    };
    let (pool_stage, pool) = Shared::new(WorkerPool::new(
        config.effective_workers,
        demo_sketch(Arc::clone(&shapes), Arc::clone(&effects)),
        snapshot_fn,
    ));
    let receiver = FrameReceiver::with_max_per_tick(
        pool.lock().unwrap().results(),
        Arc::clone(&swap),
        config.file.engine.max_packets_per_tick,
    );
    let (renderer_stage, renderer) =
        Shared::new(LineRenderer::new(Arc::clone(&swap), RecordingGpu::default()));

    let mut clock = FrameClock::new();
    clock.register(sampler_stage);
    clock.register(pool_stage);
    clock.register(receiver);
    clock.register(renderer_stage);
    clock.register(MetricsOverlay::new(Arc::clone(&swap)));

    let dt = 1.0 / f64::from(config.effective_fps);
    let started = Instant::now();
    while renderer.lock().unwrap().uploads() < DEMO_FRAMES {
        clock.tick(dt)?;
        {
            let mut r = renderer.lock().unwrap();
            r.draw();
        }
        // Headless stand-in for the host's interval scheduling.
        std::thread::sleep(std::time::Duration::from_millis(1));
        if started.elapsed().as_secs() > 60 {
            anyhow::bail!("demo run stalled before producing {DEMO_FRAMES} frames");
        }
    }

    pool.lock().unwrap().shutdown();
    sampler.lock().unwrap().persist();
    let mut renderer = renderer.lock().unwrap();
    renderer.release();

    let pool_stats = pool.lock().unwrap().stats();
    let swap_stats = swap.stats();
    let cache_stats = shapes.stats();
    info!(
        target: "runtime",
        frames_uploaded = renderer.uploads(),
        tasks_submitted = pool_stats.submitted,
        tasks_dropped = pool_stats.dropped,
        frames_coalesced = swap_stats.coalesced,
        shape_cache_hits = cache_stats.hits,
        shape_cache_misses = cache_stats.misses,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "demo_complete"
    );
    Ok(())
}

fn main() -> Result<()> {
    let _log_guard = configure_logging()?;
    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let config = load_from(config_path.as_deref(), ConfigContext::detect())?;
    run(config)
}
