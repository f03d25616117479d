//! Frame pipeline runtime: tick scheduling, double buffering, the worker
//! pool, frame ordering, and input sampling.
//!
//! Topology per tick (order is part of the contract):
//! sampler → worker pool → frame receiver → renderer → overlay.
//! The sampler folds device events into an immutable snapshot, the pool
//! emits one `RenderTask` (dropping it if workers are behind), the receiver
//! drains finished `RenderPacket`s into the [`SwapBuffer`] preserving frame
//! order, and the renderer swaps in the freshest buffer. Backpressure is
//! always resolved by dropping stale work, never by stalling the main
//! thread.
//!
//! One main thread owns the clock and everything GL-adjacent; the only
//! other execution units are the pool's worker threads.

use std::sync::{Arc, Mutex};

pub mod input;
pub mod monitor;
pub mod receiver;
pub mod swap;
pub mod worker;

pub use input::{ControlDevice, ControlId, InputSampler, Snapshot, StateStore};
pub use monitor::MetricsOverlay;
pub use receiver::FrameReceiver;
pub use swap::SwapBuffer;
pub use worker::{RenderPacket, RenderTask, Sketch, WorkerFault, WorkerMsg, WorkerPool};

/// Fatal runtime conditions; everything else in the pipeline degrades by
/// dropping frames instead of erroring.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("worker fault at frame {frame_id}: {message}")]
    WorkerFault { frame_id: u64, message: String },
}

/// One frame of update for a pipeline stage.
pub trait Tickable {
    fn tick(&mut self, dt: f64) -> anyhow::Result<()>;
}

/// Adapter for stages that outlive the clock (shutdown hooks, snapshot
/// suppliers): keep the stage behind `Arc<Mutex<_>>` and register the
/// handle.
pub struct Shared<T: Tickable>(pub Arc<Mutex<T>>);

impl<T: Tickable> Shared<T> {
    pub fn new(inner: T) -> (Self, Arc<Mutex<T>>) {
        let arc = Arc::new(Mutex::new(inner));
        (Shared(Arc::clone(&arc)), arc)
    }
}

impl<T: Tickable> Tickable for Shared<T> {
    fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        self.0.lock().unwrap().tick(dt)
    }
}

/// Invokes registered tickables in registration order at each tick.
/// Single-threaded, no preemption; a stage error aborts the tick and
/// surfaces to the host loop.
#[derive(Default)]
pub struct FrameClock {
    tickables: Vec<Box<dyn Tickable>>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tickable: impl Tickable + 'static) {
        self.tickables.push(Box::new(tickable));
    }

    pub fn len(&self) -> usize {
        self.tickables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickables.is_empty()
    }

    pub fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        for t in &mut self.tickables {
            t.tick(dt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Tickable for Recorder {
        fn tick(&mut self, _dt: f64) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    #[test]
    fn tickables_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = FrameClock::new();
        for label in ["sampler", "pool", "receiver", "renderer"] {
            clock.register(Recorder {
                label,
                log: Arc::clone(&log),
            });
        }
        clock.tick(1.0 / 60.0).unwrap();
        clock.tick(1.0 / 60.0).unwrap();
        let seen = log.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                "sampler", "pool", "receiver", "renderer", "sampler", "pool", "receiver",
                "renderer"
            ]
        );
    }

    struct Failing;

    impl Tickable for Failing {
        fn tick(&mut self, _dt: f64) -> anyhow::Result<()> {
            anyhow::bail!("stage failed")
        }
    }

    #[test]
    fn stage_error_aborts_the_tick() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut clock = FrameClock::new();
        clock.register(Failing);
        clock.register(Recorder {
            label: "after",
            log: Arc::clone(&log),
        });
        assert!(clock.tick(0.016).is_err());
        assert!(log.lock().unwrap().is_empty(), "later stages must not run");
    }

    #[test]
    fn shared_adapter_ticks_through_the_mutex() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (handle, arc) = Shared::new(Recorder {
            label: "shared",
            log: Arc::clone(&log),
        });
        let mut clock = FrameClock::new();
        clock.register(handle);
        clock.tick(0.016).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["shared"]);
        // The external handle still reaches the same stage.
        arc.lock().unwrap().tick(0.016).unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
