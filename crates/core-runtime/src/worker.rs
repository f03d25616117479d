//! Worker pool: parallel frame production behind bounded queues.
//!
//! W worker threads each hold a handle to the user sketch callback. The
//! task queue is bounded at `2·W`; when workers fall behind, `tick` drops
//! the frame instead of blocking the main loop (counted, traced). The
//! result queue is unbounded but drained every tick by the receiver, so its
//! steady-state length is bounded by worker throughput.
//!
//! A panicking sketch does not kill its worker: the panic is caught and
//! surfaced as a [`WorkerMsg::Fault`], which the receiver escalates on the
//! main thread. Frames are independent; the only state shared between
//! workers is the read-mostly cache layer upstream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};

use core_geometry::Geometry;

use crate::Tickable;
use crate::input::Snapshot;

/// The user sketch: pure with respect to its arguments, callable from any
/// worker thread.
pub type Sketch = Arc<dyn Fn(f64, &Snapshot) -> Geometry + Send + Sync>;

/// Main thread → worker work item.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub frame_id: u64,
    /// Elapsed sketch time in seconds.
    pub t: f64,
    pub snapshot: Snapshot,
}

/// Worker → main thread result.
#[derive(Debug, Clone)]
pub struct RenderPacket {
    pub frame_id: u64,
    pub geometry: Arc<Geometry>,
    pub created_at: Instant,
}

/// A sketch panic, packaged for delivery through the result queue.
#[derive(Debug, Clone)]
pub struct WorkerFault {
    pub frame_id: u64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum WorkerMsg {
    Packet(RenderPacket),
    Fault(WorkerFault),
}

enum Job {
    Frame(RenderTask),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
}

pub struct WorkerPool {
    task_tx: Sender<Job>,
    result_rx: Receiver<WorkerMsg>,
    workers: Vec<JoinHandle<()>>,
    frame_id: u64,
    elapsed: f64,
    submitted: AtomicU64,
    dropped: AtomicU64,
    snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync>,
}

impl WorkerPool {
    pub const DEFAULT_WORKERS: usize = 4;
    const JOIN_DEADLINE: Duration = Duration::from_secs(1);

    /// Spawn `workers` threads running `sketch`. `snapshot_fn` is invoked
    /// on the main thread each tick to capture the frame's input view.
    pub fn new(
        workers: usize,
        sketch: Sketch,
        snapshot_fn: Arc<dyn Fn() -> Snapshot + Send + Sync>,
    ) -> Self {
        let workers = workers.max(1);
        let (task_tx, task_rx) = bounded::<Job>(2 * workers);
        let (result_tx, result_rx) = unbounded::<WorkerMsg>();
        let handles = (0..workers)
            .map(|i| {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let sketch = Arc::clone(&sketch);
                std::thread::Builder::new()
                    .name(format!("frame-worker-{i}"))
                    .spawn(move || worker_loop(i, task_rx, result_tx, sketch))
                    .expect("spawn worker thread")
            })
            .collect();
        Self {
            task_tx,
            result_rx,
            workers: handles,
            frame_id: 0,
            elapsed: 0.0,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            snapshot_fn,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Result stream for the frame receiver. crossbeam receivers are
    /// clonable; packets go to whichever clone drains first (here: only
    /// the receiver's).
    pub fn results(&self) -> Receiver<WorkerMsg> {
        self.result_rx.clone()
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Queue length right now (tasks waiting for a worker).
    pub fn pending_tasks(&self) -> usize {
        self.task_tx.len()
    }

    /// Broadcast shutdown sentinels and join with a bounded deadline;
    /// stragglers are detached with a warning (a stuck sketch cannot be
    /// force-killed portably, and the process is exiting anyway).
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for _ in 0..self.workers.len() {
            let _ = self.task_tx.send_timeout(Job::Shutdown, Self::JOIN_DEADLINE);
        }
        let deadline = Instant::now() + Self::JOIN_DEADLINE;
        let mut handles = std::mem::take(&mut self.workers);
        while !handles.is_empty() && Instant::now() < deadline {
            handles.retain(|h| !h.is_finished());
            if !handles.is_empty() {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        if !handles.is_empty() {
            tracing::warn!(
                target: "runtime.worker",
                stragglers = handles.len(),
                "workers_detached_at_shutdown"
            );
        }
        // Drain anything still queued so buffers are released promptly.
        while self.result_rx.try_recv().is_ok() {}
    }
}

impl Tickable for WorkerPool {
    /// Emit one task for this tick; if the queue is full the frame is
    /// dropped. The main loop never waits for workers.
    fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        self.elapsed += dt;
        let frame_id = self.frame_id;
        self.frame_id += 1;
        let task = RenderTask {
            frame_id,
            t: self.elapsed,
            snapshot: (self.snapshot_fn)(),
        };
        match self.task_tx.try_send(Job::Frame(task)) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: "runtime.worker", frame_id, "task_dropped_queue_full");
            }
            Err(TrySendError::Disconnected(_)) => {
                anyhow::bail!("worker task queue disconnected");
            }
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, task_rx: Receiver<Job>, result_tx: Sender<WorkerMsg>, sketch: Sketch) {
    tracing::debug!(target: "runtime.worker", worker = index, "worker_started");
    while let Ok(job) = task_rx.recv() {
        let task = match job {
            Job::Frame(task) => task,
            Job::Shutdown => break,
        };
        let frame_id = task.frame_id;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sketch(task.t, &task.snapshot)
        }));
        let msg = match outcome {
            Ok(geometry) => WorkerMsg::Packet(RenderPacket {
                frame_id,
                geometry: Arc::new(geometry),
                created_at: Instant::now(),
            }),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "sketch panicked".to_owned());
                tracing::error!(
                    target: "runtime.worker",
                    worker = index,
                    frame_id,
                    message = message.as_str(),
                    "sketch_panic"
                );
                WorkerMsg::Fault(WorkerFault { frame_id, message })
            }
        };
        if result_tx.send(msg).is_err() {
            break;
        }
    }
    tracing::debug!(target: "runtime.worker", worker = index, "worker_stopped");
}
