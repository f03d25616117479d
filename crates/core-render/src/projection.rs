//! Canvas-to-clip projection.
//!
//! The sketch works in millimetres on a `[0, W] × [0, H]` canvas with y
//! growing downward (plotter convention). The projection is a right-handed
//! orthographic map onto clip space `[-1, 1] × [1, -1]` with depth
//! disabled; it is built once at startup and handed to the GPU backend as
//! a column-major 4×4, never mutated per frame.

use glam::Mat4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    matrix: Mat4,
    canvas_mm: (f32, f32),
}

impl Projection {
    /// Orthographic projection for a `width_mm × height_mm` canvas.
    pub fn orthographic_mm(width_mm: f32, height_mm: f32) -> Self {
        debug_assert!(width_mm > 0.0 && height_mm > 0.0);
        // x: [0, W] → [-1, 1]; y: [0, H] → [1, -1] (flip); z unused.
        let matrix = Mat4::from_cols_array(&[
            2.0 / width_mm,
            0.0,
            0.0,
            0.0,
            //
            0.0,
            -2.0 / height_mm,
            0.0,
            0.0,
            //
            0.0,
            0.0,
            -1.0,
            0.0,
            //
            -1.0,
            1.0,
            0.0,
            1.0,
        ]);
        Self {
            matrix,
            canvas_mm: (width_mm, height_mm),
        }
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Column-major array for a GPU uniform upload.
    pub fn to_cols_array(&self) -> [f32; 16] {
        self.matrix.to_cols_array()
    }

    pub fn canvas_mm(&self) -> (f32, f32) {
        self.canvas_mm
    }
}
