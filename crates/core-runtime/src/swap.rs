//! Single-slot lock-guarded double buffer between producers and the
//! renderer.
//!
//! `push` stores into the back slot and bumps a monotonic version; pushes
//! between swaps coalesce, so only the most recent survives. Older frames
//! are dropped by design: the renderer always shows the freshest geometry
//! and workers are never stalled by it. All operations hold the mutex for O(1)
//! work, so a push and a concurrent swap can never tear.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slots<T> {
    front: Option<T>,
    back: Option<T>,
    version: u64,
    ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapStatsSnapshot {
    pub pushes: u64,
    pub coalesced: u64,
    pub swaps: u64,
}

pub struct SwapBuffer<T> {
    slots: Mutex<Slots<T>>,
    pushes: AtomicU64,
    coalesced: AtomicU64,
    swaps: AtomicU64,
}

impl<T> SwapBuffer<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                front: None,
                back: None,
                version: 0,
                ready: false,
            }),
            pushes: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
        }
    }

    /// Store `value` in the back slot and signal readiness. A value already
    /// waiting in the back slot is replaced (coalesced).
    pub fn push(&self, value: T) {
        let mut slots = self.slots.lock().unwrap();
        if slots.ready {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        slots.back = Some(value);
        slots.version += 1;
        slots.ready = true;
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Swap front and back if a fresh value is waiting. Returns whether a
    /// swap happened.
    pub fn try_swap(&self) -> bool {
        let mut guard = self.slots.lock().unwrap();
        if !guard.ready {
            return false;
        }
        let slots = &mut *guard;
        std::mem::swap(&mut slots.front, &mut slots.back);
        slots.ready = false;
        self.swaps.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of pushes so far; never decreases.
    pub fn version(&self) -> u64 {
        self.slots.lock().unwrap().version
    }

    pub fn is_ready(&self) -> bool {
        self.slots.lock().unwrap().ready
    }

    pub fn stats(&self) -> SwapStatsSnapshot {
        SwapStatsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone> SwapBuffer<T> {
    /// Current renderable value; `None` before the first push+swap.
    pub fn front(&self) -> Option<T> {
        self.slots.lock().unwrap().front.clone()
    }
}

impl<T> Default for SwapBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn front_is_none_before_first_swap() {
        let buf: SwapBuffer<u32> = SwapBuffer::new();
        assert!(buf.front().is_none());
        assert!(!buf.try_swap());
        buf.push(1);
        assert!(buf.front().is_none(), "push alone must not publish");
        assert!(buf.try_swap());
        assert_eq!(buf.front(), Some(1));
    }

    #[test]
    fn versions_are_monotonic() {
        let buf: SwapBuffer<u32> = SwapBuffer::new();
        let mut last = buf.version();
        for i in 0..10 {
            buf.push(i);
            let v = buf.version();
            assert!(v > last);
            last = v;
            if i % 3 == 0 {
                buf.try_swap();
                assert_eq!(buf.version(), last, "swap must not change the version");
            }
        }
    }

    #[test]
    fn pushes_between_swaps_coalesce_to_freshest() {
        let buf: SwapBuffer<u32> = SwapBuffer::new();
        for i in 1..=5 {
            buf.push(i);
        }
        assert!(buf.try_swap());
        assert_eq!(buf.front(), Some(5), "only the most recent push is seen");
        assert!(!buf.try_swap(), "ready flag cleared after swap");
        assert_eq!(buf.stats().coalesced, 4);
    }

    #[test]
    fn concurrent_pushes_never_tear() {
        let buf: Arc<SwapBuffer<(u64, u64)>> = Arc::new(SwapBuffer::new());
        let writer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for i in 0..10_000u64 {
                    buf.push((i, i.wrapping_mul(31)));
                }
            })
        };
        let mut last_seen = None;
        for _ in 0..10_000 {
            if buf.try_swap() {
                let (a, b) = buf.front().unwrap();
                assert_eq!(b, a.wrapping_mul(31), "value published atomically");
                if let Some(prev) = last_seen {
                    assert!(a >= prev, "published values never regress");
                }
                last_seen = Some(a);
            }
        }
        writer.join().unwrap();
    }
}
