//! GPU-facing renderer adapter.
//!
//! The rasterizer itself is an external collaborator behind [`LineGpu`]:
//! the engine's responsibility ends at producing two flat arrays per frame
//! (an interleaved xyz float32 vertex buffer with stride 12, and a u32
//! index buffer encoding all polylines as line strips separated by the
//! primitive-restart sentinel) and calling `upload`/`draw` on the backend
//! at the right points in the tick.
//!
//! [`LineRenderer`] is the pipeline's final tickable stage: it swaps in the
//! freshest geometry and uploads it; the window host calls `draw()` from
//! its paint callback and `release()` on shutdown.

use std::sync::Arc;

use core_geometry::Geometry;
use core_runtime::{SwapBuffer, Tickable};

pub mod projection;

pub use projection::Projection;

/// Index value that ends the current line strip on the GPU. The backend
/// must enable primitive restart with this sentinel.
pub const PRIMITIVE_RESTART_INDEX: u32 = 0xFFFF_FFFF;

/// Minimal GPU surface the renderer drives. One vertex buffer, one index
/// buffer, one draw; the GL context stays on the main thread with the
/// host.
pub trait LineGpu {
    fn upload(&mut self, vertices: &[f32], indices: &[u32]);
    fn draw(&mut self);
    fn release(&mut self);
}

/// Flatten a geometry into upload-ready arrays. Empty polylines are
/// skipped; every emitted strip is terminated by the restart sentinel.
pub fn flatten(geometry: &Geometry) -> (Vec<f32>, Vec<u32>) {
    let vertices = geometry.as_f32_slice().to_vec();
    let offsets = geometry.offsets();
    let mut indices =
        Vec::with_capacity(geometry.point_count() + geometry.line_count());
    for w in offsets.windows(2) {
        let (start, end) = (w[0] as u32, w[1] as u32);
        if start == end {
            continue;
        }
        indices.extend(start..end);
        indices.push(PRIMITIVE_RESTART_INDEX);
    }
    (vertices, indices)
}

/// Final pipeline stage: swap-in plus GPU upload.
pub struct LineRenderer<G: LineGpu> {
    swap: Arc<SwapBuffer<Arc<Geometry>>>,
    gpu: G,
    index_count: usize,
    uploads: u64,
}

impl<G: LineGpu> LineRenderer<G> {
    pub fn new(swap: Arc<SwapBuffer<Arc<Geometry>>>, gpu: G) -> Self {
        Self {
            swap,
            gpu,
            index_count: 0,
            uploads: 0,
        }
    }

    /// Issue the draw for whatever was last uploaded. Called by the window
    /// host's paint callback, after `tick`.
    pub fn draw(&mut self) {
        if self.index_count > 0 {
            self.gpu.draw();
        }
    }

    /// Release GPU resources at shutdown.
    pub fn release(&mut self) {
        self.gpu.release();
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }
}

impl<G: LineGpu> Tickable for LineRenderer<G> {
    fn tick(&mut self, _dt: f64) -> anyhow::Result<()> {
        if !self.swap.try_swap() {
            return Ok(());
        }
        let Some(geometry) = self.swap.front() else {
            return Ok(());
        };
        let (vertices, indices) = flatten(&geometry);
        self.index_count = indices.len();
        tracing::trace!(
            target: "render.upload",
            vertices = vertices.len() / 3,
            indices = indices.len(),
            "geometry_uploaded"
        );
        self.gpu.upload(&vertices, &indices);
        self.uploads += 1;
        Ok(())
    }
}

/// Headless backend for tests and demo runs: records what a real GPU would
/// have received.
#[derive(Debug, Default)]
pub struct RecordingGpu {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub uploads: u64,
    pub draws: u64,
    pub released: bool,
}

impl LineGpu for RecordingGpu {
    fn upload(&mut self, vertices: &[f32], indices: &[u32]) {
        self.vertices = vertices.to_vec();
        self.indices = indices.to_vec();
        self.uploads += 1;
    }

    fn draw(&mut self) {
        self.draws += 1;
    }

    fn release(&mut self) {
        self.released = true;
    }
}
