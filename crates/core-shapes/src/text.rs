//! Text layout over an external glyph source.
//!
//! Font files are not parsed here; the host supplies a [`GlyphSource`] that
//! exposes already-linearized outline contours per character. The shape
//! lays glyphs out along x, normalizes em units to a unit cell (y flipped so
//! text reads upright in the y-down canvas), applies alignment, and scales.
//!
//! Characters the source has no outlines for are skipped silently, with no
//! placeholder box. A missing advance falls back to half an em so spacing
//! stays stable around skipped glyphs and whitespace.

use std::sync::Arc;

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::{ShapeError, ShapeSource};

/// Outline provider interface; implementations live with the host (font
/// parsing is out of scope for the engine core).
pub trait GlyphSource: Send + Sync {
    /// Font units per em square.
    fn units_per_em(&self) -> f32;
    /// Linearized outline contours for `ch` in font units, y-up. `None`
    /// when the source has no glyph for `ch`.
    fn contours(&self, ch: char) -> Option<Vec<Vec<[f32; 2]>>>;
    /// Horizontal advance for `ch` in font units.
    fn advance(&self, ch: char) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

/// One polyline per glyph contour; deterministic given the same source.
pub struct TextShape {
    source: Arc<dyn GlyphSource>,
}

impl TextShape {
    pub fn new(source: Arc<dyn GlyphSource>) -> Self {
        Self { source }
    }
}

impl ShapeSource for TextShape {
    fn name(&self) -> &'static str {
        "text"
    }

    fn produce(&self, params: &ParamSet) -> Result<Geometry, ShapeError> {
        let text = params.str_or("text", "");
        let size = params.f64_or("size", 1.0) as f32;
        let align = match params.str_or("align", "left") {
            "left" => Align::Left,
            "center" => Align::Center,
            "right" => Align::Right,
            other => {
                return Err(ShapeError::InvalidParameter {
                    shape: "text",
                    name: "align",
                    reason: format!("`{other}` is not one of left, center, right"),
                });
            }
        };

        let upem = self.source.units_per_em();
        let advance_of = |ch: char| self.source.advance(ch).unwrap_or(upem / 2.0) / upem;

        let total_width: f32 = text.chars().map(advance_of).sum();
        let mut pen_x = match align {
            Align::Left => 0.0,
            Align::Center => -total_width / 2.0,
            Align::Right => -total_width,
        };

        let mut lines: Vec<Vec<[f32; 3]>> = Vec::new();
        for ch in text.chars() {
            if let Some(contours) = self.source.contours(ch) {
                for contour in contours {
                    lines.push(
                        contour
                            .iter()
                            .map(|&[x, y]| {
                                // Normalize to em, flip y (fonts are y-up,
                                // the canvas is y-down), then pen + size.
                                [(pen_x + x / upem) * size, (0.5 - y / upem) * size, 0.0]
                            })
                            .collect(),
                    );
                }
            }
            pen_x += advance_of(ch);
        }
        Ok(Geometry::from_polylines(lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stub source: a unit-square contour for 'o', advance-only for ' ',
    /// nothing for anything else.
    struct BoxFont;

    impl GlyphSource for BoxFont {
        fn units_per_em(&self) -> f32 {
            1000.0
        }

        fn contours(&self, ch: char) -> Option<Vec<Vec<[f32; 2]>>> {
            (ch == 'o').then(|| {
                vec![vec![
                    [0.0, 0.0],
                    [800.0, 0.0],
                    [800.0, 800.0],
                    [0.0, 800.0],
                    [0.0, 0.0],
                ]]
            })
        }

        fn advance(&self, ch: char) -> Option<f32> {
            match ch {
                'o' => Some(1000.0),
                ' ' => Some(400.0),
                _ => None,
            }
        }
    }

    fn shape() -> TextShape {
        TextShape::new(Arc::new(BoxFont))
    }

    #[test]
    fn one_polyline_per_contour() {
        let g = shape().produce(&ParamSet::new().with("text", "oo")).unwrap();
        assert_eq!(g.line_count(), 2);
    }

    #[test]
    fn missing_glyphs_are_skipped_silently() {
        let with_missing = shape().produce(&ParamSet::new().with("text", "oxo")).unwrap();
        assert_eq!(with_missing.line_count(), 2, "x contributes no contours");
        // The skipped glyph still advances the pen, so the second 'o' in
        // "oxo" sits further right than in "oo".
        let plain = shape().produce(&ParamSet::new().with("text", "oo")).unwrap();
        let x_last_missing = with_missing.polyline(1).unwrap()[0][0];
        let x_last_plain = plain.polyline(1).unwrap()[0][0];
        assert!(x_last_missing > x_last_plain);
    }

    #[test]
    fn spaces_advance_without_lines() {
        let g = shape().produce(&ParamSet::new().with("text", "o o")).unwrap();
        assert_eq!(g.line_count(), 2);
        let second_start = g.polyline(1).unwrap()[0][0];
        assert!((second_start - 1.4).abs() < 1e-6, "1.0 em + 0.4 em space");
    }

    #[test]
    fn alignment_shifts_layout() {
        let left = shape()
            .produce(&ParamSet::new().with("text", "o").with("align", "left"))
            .unwrap();
        let center = shape()
            .produce(&ParamSet::new().with("text", "o").with("align", "center"))
            .unwrap();
        let right = shape()
            .produce(&ParamSet::new().with("text", "o").with("align", "right"))
            .unwrap();
        let x0 = |g: &Geometry| g.polyline(0).unwrap()[0][0];
        assert!((x0(&left) - 0.0).abs() < 1e-6);
        assert!((x0(&center) + 0.5).abs() < 1e-6);
        assert!((x0(&right) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn size_scales_both_axes() {
        let g = shape()
            .produce(&ParamSet::new().with("text", "o").with("size", 10.0))
            .unwrap();
        let (min, max) = g.bounds().unwrap();
        assert!((max.x - min.x - 8.0).abs() < 1e-4, "0.8 em glyph at size 10");
        assert!((max.y - min.y - 8.0).abs() < 1e-4);
    }

    #[test]
    fn bad_align_is_invalid_parameter() {
        let err = shape()
            .produce(&ParamSet::new().with("text", "o").with("align", "justify"))
            .unwrap_err();
        assert!(matches!(err, ShapeError::InvalidParameter { name: "align", .. }));
    }
}
