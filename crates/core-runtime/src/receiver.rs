//! Drains worker results into the swap buffer, preserving frame order.
//!
//! Workers finish out of order; the receiver publishes a packet only when
//! its frame id exceeds the highest id published so far, so the renderer
//! observes a strictly increasing sequence (gaps are fine; those frames
//! were dropped). At most `max_per_tick` packets are processed per tick to
//! amortize cost on the main thread; the rest wait for the next tick.
//!
//! Fault messages are fatal: a broken sketch is a bug in the user program,
//! and the error is re-raised on the main thread to end the run.

use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};

use core_geometry::Geometry;

use crate::swap::SwapBuffer;
use crate::worker::WorkerMsg;
use crate::{RuntimeError, Tickable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverStatsSnapshot {
    pub published: u64,
    pub stale_dropped: u64,
}

pub struct FrameReceiver {
    results: Receiver<WorkerMsg>,
    swap: Arc<SwapBuffer<Arc<Geometry>>>,
    max_per_tick: usize,
    latest_accepted: Option<u64>,
    published: u64,
    stale_dropped: u64,
}

impl FrameReceiver {
    pub const DEFAULT_MAX_PER_TICK: usize = 2;

    pub fn new(results: Receiver<WorkerMsg>, swap: Arc<SwapBuffer<Arc<Geometry>>>) -> Self {
        Self::with_max_per_tick(results, swap, Self::DEFAULT_MAX_PER_TICK)
    }

    pub fn with_max_per_tick(
        results: Receiver<WorkerMsg>,
        swap: Arc<SwapBuffer<Arc<Geometry>>>,
        max_per_tick: usize,
    ) -> Self {
        Self {
            results,
            swap,
            max_per_tick: max_per_tick.max(1),
            latest_accepted: None,
            published: 0,
            stale_dropped: 0,
        }
    }

    /// Highest frame id published to the swap buffer, if any. Never
    /// decreases.
    pub fn latest_accepted(&self) -> Option<u64> {
        self.latest_accepted
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        ReceiverStatsSnapshot {
            published: self.published,
            stale_dropped: self.stale_dropped,
        }
    }
}

impl Tickable for FrameReceiver {
    fn tick(&mut self, _dt: f64) -> anyhow::Result<()> {
        for _ in 0..self.max_per_tick {
            match self.results.try_recv() {
                Ok(WorkerMsg::Packet(packet)) => {
                    let newer = self
                        .latest_accepted
                        .is_none_or(|latest| packet.frame_id > latest);
                    if newer {
                        self.latest_accepted = Some(packet.frame_id);
                        self.published += 1;
                        self.swap.push(packet.geometry);
                    } else {
                        self.stale_dropped += 1;
                        tracing::trace!(
                            target: "runtime.receiver",
                            frame_id = packet.frame_id,
                            "stale_packet_dropped"
                        );
                    }
                }
                Ok(WorkerMsg::Fault(fault)) => {
                    return Err(RuntimeError::WorkerFault {
                        frame_id: fault.frame_id,
                        message: fault.message,
                    }
                    .into());
                }
                Err(TryRecvError::Empty) => break,
                // Channel closes during shutdown; nothing left to drain.
                Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{RenderPacket, WorkerFault};
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    fn packet(frame_id: u64) -> WorkerMsg {
        WorkerMsg::Packet(RenderPacket {
            frame_id,
            geometry: Arc::new(Geometry::from_polylines([vec![[frame_id as f32, 0.0, 0.0]]])),
            created_at: Instant::now(),
        })
    }

    fn frame_at_front(swap: &SwapBuffer<Arc<Geometry>>) -> Option<u64> {
        swap.try_swap();
        swap.front().map(|g| g.coords()[0][0] as u64)
    }

    #[test]
    fn drains_at_most_max_per_tick() {
        let (tx, rx) = unbounded();
        let swap = Arc::new(SwapBuffer::new());
        let mut receiver = FrameReceiver::new(rx, Arc::clone(&swap));
        for id in 0..5 {
            tx.send(packet(id)).unwrap();
        }
        receiver.tick(0.016).unwrap();
        assert_eq!(receiver.latest_accepted(), Some(1), "two packets per tick");
        receiver.tick(0.016).unwrap();
        receiver.tick(0.016).unwrap();
        assert_eq!(receiver.latest_accepted(), Some(4));
    }

    #[test]
    fn out_of_order_packets_never_regress() {
        let (tx, rx) = unbounded();
        let swap = Arc::new(SwapBuffer::new());
        let mut receiver = FrameReceiver::with_max_per_tick(rx, Arc::clone(&swap), 10);
        for id in [0, 2, 1, 5, 3, 4] {
            tx.send(packet(id)).unwrap();
        }
        receiver.tick(0.016).unwrap();
        assert_eq!(receiver.latest_accepted(), Some(5));
        let stats = receiver.stats();
        assert_eq!(stats.published, 3, "0, 2 and 5 publish");
        assert_eq!(stats.stale_dropped, 3, "1, 3 and 4 arrive late");
        assert_eq!(frame_at_front(&swap), Some(5));
    }

    #[test]
    fn fault_is_reraised_on_the_main_thread() {
        let (tx, rx) = unbounded();
        let swap = Arc::new(SwapBuffer::new());
        let mut receiver = FrameReceiver::new(rx, swap);
        tx.send(WorkerMsg::Fault(WorkerFault {
            frame_id: 9,
            message: "sketch exploded".into(),
        }))
        .unwrap();
        let err = receiver.tick(0.016).unwrap_err();
        let runtime_err = err.downcast::<RuntimeError>().unwrap();
        assert!(matches!(
            runtime_err,
            RuntimeError::WorkerFault { frame_id: 9, .. }
        ));
    }

    #[test]
    fn empty_and_disconnected_queues_are_quiet() {
        let (tx, rx) = unbounded();
        let swap = Arc::new(SwapBuffer::new());
        let mut receiver = FrameReceiver::new(rx, swap);
        receiver.tick(0.016).unwrap();
        drop(tx);
        receiver.tick(0.016).unwrap();
    }
}
