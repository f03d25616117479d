//! End-to-end pipeline flow: sampler → pool → receiver → swap buffer,
//! driven by a manual clock the way a window host would drive it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use core_geometry::Geometry;
use core_runtime::{
    ControlDevice, ControlId, FrameClock, FrameReceiver, InputSampler, MetricsOverlay, Shared,
    Sketch, Snapshot, SwapBuffer, WorkerPool,
};

/// Sketch that encodes its frame time in x and sleeps a pseudo-random few
/// milliseconds so completion order scrambles across workers.
fn jittery_sketch() -> Sketch {
    Arc::new(|t, snapshot| {
        let jitter_ms = ((t * 100_000.0) as u64 * 7919) % 17;
        std::thread::sleep(Duration::from_millis(jitter_ms));
        let knob = snapshot.get_or(1, 0.0);
        Geometry::from_polylines([vec![[t as f32, knob, 0.0]]])
    })
}

struct RampDevice {
    next: f32,
}

impl ControlDevice for RampDevice {
    fn name(&self) -> &str {
        "ramp"
    }

    fn poll(&mut self) -> Vec<(ControlId, f32)> {
        self.next = (self.next + 0.01).min(1.0);
        vec![(1, self.next)]
    }
}

#[test]
fn out_of_order_completion_never_regresses_at_the_swap_buffer() {
    let swap: Arc<SwapBuffer<Arc<Geometry>>> = Arc::new(SwapBuffer::new());

    let (sampler_stage, sampler) = Shared::new(InputSampler::new("pipeline-flow"));
    sampler.lock().unwrap().attach(Box::new(RampDevice { next: 0.0 }));

    let snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync> = {
        let sampler = Arc::clone(&sampler);
        Arc::new(move || sampler.lock().unwrap().snapshot())
    };
    let (pool_stage, pool) = Shared::new(WorkerPool::new(4, jittery_sketch(), snapshot_fn));
    let (receiver_stage, receiver) = Shared::new(FrameReceiver::with_max_per_tick(
        pool.lock().unwrap().results(),
        Arc::clone(&swap),
        4,
    ));

    let mut clock = FrameClock::new();
    clock.register(sampler_stage);
    clock.register(pool_stage);
    clock.register(receiver_stage);
    clock.register(MetricsOverlay::new(Arc::clone(&swap)));

    // Act as the renderer: swap after each tick and record the observed
    // frame time (strictly increasing t ⇔ strictly increasing frame id).
    let mut observed: Vec<f32> = Vec::new();
    let dt = 1.0 / 240.0;
    let deadline = Instant::now() + Duration::from_secs(30);
    while receiver.lock().unwrap().stats().published < 300 && Instant::now() < deadline {
        clock.tick(dt).unwrap();
        if swap.try_swap() {
            let g = swap.front().unwrap();
            observed.push(g.coords()[0][0]);
        }
        // Pace the host loop; an unthrottled spin inflates frame ids far
        // past what the workers can ever service.
        std::thread::sleep(Duration::from_micros(200));
    }
    pool.lock().unwrap().shutdown();

    let published = receiver.lock().unwrap().stats().published;
    assert!(published >= 300, "pipeline stalled: only {published} published");
    assert!(!observed.is_empty());
    for w in observed.windows(2) {
        assert!(w[1] > w[0], "renderer saw regressing frames: {} after {}", w[1], w[0]);
    }

    // The receiver's high-water mark matches the newest frame the renderer
    // could observe.
    let latest = receiver.lock().unwrap().latest_accepted().unwrap();
    let last_observed = *observed.last().unwrap();
    swap.try_swap();
    let front_now = swap.front().unwrap().coords()[0][0];
    assert!(front_now >= last_observed);
    // Frame id n carries t = (n + 1)·dt, and the freshest published frame
    // is exactly the receiver's high-water mark.
    assert!(f64::from(front_now) <= (latest as f64 + 1.0) * dt + 1e-3);

    // Controller values flowed through snapshots into worker output.
    let knob = swap.front().unwrap().coords()[0][1];
    assert!(knob > 0.0, "snapshot values must reach the sketch");
}

#[test]
fn overwhelmed_pipeline_drops_tasks_not_memory() {
    let slow: Sketch = Arc::new(|t, _s| {
        std::thread::sleep(Duration::from_millis(20));
        Geometry::from_polylines([vec![[t as f32, 0.0, 0.0]]])
    });
    let swap: Arc<SwapBuffer<Arc<Geometry>>> = Arc::new(SwapBuffer::new());
    let (pool_stage, pool) = Shared::new(WorkerPool::new(
        2,
        slow,
        Arc::new(Snapshot::default) as Arc<dyn Fn() -> Snapshot + Send + Sync>,
    ));
    let (receiver_stage, _receiver) = Shared::new(FrameReceiver::new(
        pool.lock().unwrap().results(),
        Arc::clone(&swap),
    ));

    let mut clock = FrameClock::new();
    clock.register(pool_stage);
    clock.register(receiver_stage);

    // Tick far faster than 2 workers × 20 ms can absorb.
    for _ in 0..400 {
        clock.tick(0.001).unwrap();
    }
    let stats = pool.lock().unwrap().stats();
    assert_eq!(stats.submitted + stats.dropped, 400);
    assert!(stats.dropped > 0, "steady-state overload must drop tasks");
    assert!(
        pool.lock().unwrap().pending_tasks() <= 4,
        "task queue stays within its 2·W bound"
    );
    pool.lock().unwrap().shutdown();
}

/// A sketch panic reaches the main thread as an error from the receiver's
/// tick; the run is fatal, matching the worker-fault contract.
#[test]
fn sketch_panic_surfaces_through_the_clock() {
    let bomb: Sketch = Arc::new(|_t, _s| panic!("sketch bug"));
    let swap: Arc<SwapBuffer<Arc<Geometry>>> = Arc::new(SwapBuffer::new());
    let (pool_stage, pool) = Shared::new(WorkerPool::new(
        1,
        bomb,
        Arc::new(Snapshot::default) as Arc<dyn Fn() -> Snapshot + Send + Sync>,
    ));
    let (receiver_stage, _receiver) = Shared::new(FrameReceiver::new(
        pool.lock().unwrap().results(),
        swap,
    ));
    let mut clock = FrameClock::new();
    clock.register(pool_stage);
    clock.register(receiver_stage);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut saw_error = false;
    while Instant::now() < deadline {
        if clock.tick(1.0 / 60.0).is_err() {
            saw_error = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(saw_error, "worker fault must surface on the main thread");
    pool.lock().unwrap().shutdown();
}

/// Snapshots captured per tick are stable for the whole frame even while
/// the sampler keeps mutating its internal state.
#[test]
fn workers_see_consistent_snapshots() {
    let seen: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
    let sketch: Sketch = {
        let seen = Arc::clone(&seen);
        Arc::new(move |_t, snapshot| {
            // Read the same control twice with a pause; a mutating sampler
            // must not be visible within one frame.
            let first = snapshot.get_or(1, f32::NAN);
            std::thread::sleep(Duration::from_millis(3));
            let second = snapshot.get_or(1, f32::NAN);
            assert_eq!(first.to_bits(), second.to_bits());
            seen.fetch_add(1, Ordering::SeqCst);
            Geometry::empty()
        })
    };

    let (sampler_stage, sampler) = Shared::new(InputSampler::new("snapshot-consistency"));
    sampler.lock().unwrap().attach(Box::new(RampDevice { next: 0.0 }));
    let snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync> = {
        let sampler = Arc::clone(&sampler);
        Arc::new(move || sampler.lock().unwrap().snapshot())
    };
    let (pool_stage, pool) = Shared::new(WorkerPool::new(2, sketch, snapshot_fn));

    let mut clock = FrameClock::new();
    clock.register(sampler_stage);
    clock.register(pool_stage);
    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.load(Ordering::SeqCst) < 50 && Instant::now() < deadline {
        clock.tick(1.0 / 120.0).unwrap();
    }
    assert!(seen.load(Ordering::SeqCst) >= 50);
    pool.lock().unwrap().shutdown();
}
