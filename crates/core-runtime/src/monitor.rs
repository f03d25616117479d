//! Lightweight frame-rate / pipeline sampling for an on-screen overlay.
//!
//! The overlay rendering itself belongs to the host; this stage only folds
//! per-tick timings and swap-buffer counters into a text summary the host
//! can draw (or a headless run can log).

use std::collections::VecDeque;
use std::sync::Arc;

use core_geometry::Geometry;

use crate::Tickable;
use crate::swap::SwapBuffer;

pub struct MetricsOverlay {
    swap: Arc<SwapBuffer<Arc<Geometry>>>,
    recent: VecDeque<f64>,
    window: usize,
    ticks: u64,
    log_every: u64,
}

impl MetricsOverlay {
    const DEFAULT_WINDOW: usize = 120;

    pub fn new(swap: Arc<SwapBuffer<Arc<Geometry>>>) -> Self {
        Self {
            swap,
            recent: VecDeque::with_capacity(Self::DEFAULT_WINDOW),
            window: Self::DEFAULT_WINDOW,
            ticks: 0,
            log_every: 300,
        }
    }

    /// Smoothed frames per second over the recent window.
    pub fn fps(&self) -> f64 {
        let total: f64 = self.recent.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.recent.len() as f64 / total
    }

    pub fn summary(&self) -> String {
        let stats = self.swap.stats();
        let front = self.swap.front();
        let (points, lines) = front
            .map(|g| (g.point_count(), g.line_count()))
            .unwrap_or((0, 0));
        format!(
            "fps {:.1} | frame v{} | {} lines / {} pts | dropped-in-swap {}",
            self.fps(),
            self.swap.version(),
            lines,
            points,
            stats.coalesced,
        )
    }
}

impl Tickable for MetricsOverlay {
    fn tick(&mut self, dt: f64) -> anyhow::Result<()> {
        if dt > 0.0 {
            if self.recent.len() == self.window {
                self.recent.pop_front();
            }
            self.recent.push_back(dt);
        }
        self.ticks += 1;
        if self.ticks % self.log_every == 0 {
            tracing::debug!(target: "runtime.monitor", summary = self.summary().as_str(), "frame_stats");
        }
        Ok(())
    }
}
