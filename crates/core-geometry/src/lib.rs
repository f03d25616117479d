//! Flat polyline geometry for the plotline runtime.
//!
//! A [`Geometry`] stores M polylines in two parallel arrays: one contiguous
//! `[f32; 3]` coords array of N points and an `i32` offsets array of length
//! M+1 where polyline *i* spans `coords[offsets[i]..offsets[i+1]]`. The flat
//! layout means a frame uploads to the GPU as two memcpys and effect kernels
//! stream over one allocation instead of chasing per-line vectors.
//!
//! Buffers are immutable by convention: every operation returns a new
//! `Geometry` and nothing in this crate mutates coords after construction.
//! Each construction mints a fresh [`GeometryId`]; downstream caches key on
//! that identity (provenance), never on coordinate content.
//!
//! Invariants (checked by [`Geometry::from_raw_parts`], debug-asserted on
//! every internal constructor):
//! * `offsets[0] == 0` and `offsets` is non-decreasing.
//! * `offsets[M] == coords.len()`.
//! * Empty polylines (zero points) are legal; the renderer skips them.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Affine3A, Mat3, Vec3};

pub mod params;

/// Opaque 128-bit identity token minted once per buffer construction.
///
/// Identity is provenance-based: two buffers with identical coordinates have
/// distinct ids, and transforming a buffer yields a new id. Content equality
/// is achieved upstream by the shape/effect caches returning shared handles,
/// not by hashing coordinates here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(u128);

impl GeometryId {
    fn mint() -> Self {
        static SALT: OnceLock<u64> = OnceLock::new();
        static NEXT: AtomicU64 = AtomicU64::new(0);
        // Per-process random salt (ahash seeds its states from OS entropy) so
        // ids from different runs never collide if they ever meet in logs.
        let salt = *SALT.get_or_init(|| {
            use std::hash::BuildHasher;
            ahash::RandomState::new().hash_one(std::process::id())
        });
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        GeometryId(((salt as u128) << 64) | n as u128)
    }

    /// Raw value, for logging/diagnostics only.
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

/// Errors surfaced when assembling a buffer from untrusted raw arrays.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("offsets array must start with 0 (got {0})")]
    MissingLeadingZero(i32),
    #[error("offsets array must be non-decreasing (offsets[{index}] = {value} < {previous})")]
    NonMonotonicOffsets { index: usize, value: i32, previous: i32 },
    #[error("final offset {last} does not match coords length {coords}")]
    LengthMismatch { last: i32, coords: usize },
    #[error("offsets array must not be empty")]
    EmptyOffsets,
}

/// Flat container of many polylines plus a provenance id.
#[derive(Debug, Clone)]
pub struct Geometry {
    coords: Vec<[f32; 3]>,
    offsets: Vec<i32>,
    id: GeometryId,
}

impl Geometry {
    /// Buffer with no polylines (`offsets == [0]`).
    pub fn empty() -> Self {
        Self::from_parts(Vec::new(), vec![0])
    }

    /// Internal constructor; invariants are the caller's responsibility and
    /// are debug-asserted here.
    fn from_parts(coords: Vec<[f32; 3]>, offsets: Vec<i32>) -> Self {
        debug_assert!(!offsets.is_empty(), "offsets must contain at least [0]");
        debug_assert_eq!(offsets.first().copied(), Some(0));
        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "offsets must be non-decreasing");
        debug_assert_eq!(*offsets.last().unwrap() as usize, coords.len());
        Self {
            coords,
            offsets,
            id: GeometryId::mint(),
        }
    }

    /// Validate and assemble a buffer from raw arrays (e.g. data produced by
    /// user code). Prefer [`Geometry::from_polylines`] where possible.
    pub fn from_raw_parts(coords: Vec<[f32; 3]>, offsets: Vec<i32>) -> Result<Self, GeometryError> {
        let Some(&first) = offsets.first() else {
            return Err(GeometryError::EmptyOffsets);
        };
        if first != 0 {
            return Err(GeometryError::MissingLeadingZero(first));
        }
        for (index, w) in offsets.windows(2).enumerate() {
            if w[1] < w[0] {
                return Err(GeometryError::NonMonotonicOffsets {
                    index: index + 1,
                    value: w[1],
                    previous: w[0],
                });
            }
        }
        let last = *offsets.last().unwrap();
        if last as usize != coords.len() {
            return Err(GeometryError::LengthMismatch { last, coords: coords.len() });
        }
        Ok(Self::from_parts(coords, offsets))
    }

    /// Build a buffer from a list of 3-D polylines. Offsets are derived from
    /// the line lengths; an empty iterator yields [`Geometry::empty`].
    pub fn from_polylines<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[[f32; 3]]>,
    {
        let mut coords = Vec::new();
        let mut offsets = vec![0i32];
        for line in lines {
            let line = line.as_ref();
            coords.extend_from_slice(line);
            offsets.push(coords.len() as i32);
        }
        Self::from_parts(coords, offsets)
    }

    /// Build a buffer from planar polylines; every point gets `z = 0`.
    pub fn from_polylines_2d<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[[f32; 2]]>,
    {
        Self::from_polylines(lines.into_iter().map(|line| {
            line.as_ref()
                .iter()
                .map(|&[x, y]| [x, y, 0.0])
                .collect::<Vec<_>>()
        }))
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn coords(&self) -> &[[f32; 3]] {
        &self.coords
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    /// Flat `x,y,z,x,y,z,…` view of the coords array. Zero-copy; this is the
    /// slice the renderer hands to the GPU (stride 12 bytes).
    pub fn as_f32_slice(&self) -> &[f32] {
        bytemuck::cast_slice(&self.coords)
    }

    /// Total number of points across all polylines.
    pub fn point_count(&self) -> usize {
        self.coords.len()
    }

    /// Number of polylines (M).
    pub fn line_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Borrowed iterator over polyline slices; no copying.
    pub fn polylines(&self) -> Polylines<'_> {
        Polylines { geometry: self, line: 0 }
    }

    /// Polyline `i` as a slice, if in range.
    pub fn polyline(&self, i: usize) -> Option<&[[f32; 3]]> {
        if i + 1 >= self.offsets.len() {
            return None;
        }
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        Some(&self.coords[start..end])
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for an empty buffer.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut points = self.coords.iter().map(|&p| Vec3::from_array(p));
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some((min, max))
    }

    /// Append `other` after `self`: coords concatenated, `other`'s offsets
    /// shifted by `self.point_count()`. Associative; the empty buffer is the
    /// identity. Always returns a buffer with a fresh id.
    pub fn concat(&self, other: &Geometry) -> Geometry {
        let shift = self.coords.len() as i32;
        let mut coords = Vec::with_capacity(self.coords.len() + other.coords.len());
        coords.extend_from_slice(&self.coords);
        coords.extend_from_slice(&other.coords);
        let mut offsets = Vec::with_capacity(self.offsets.len() + other.offsets.len() - 1);
        offsets.extend_from_slice(&self.offsets);
        offsets.extend(other.offsets[1..].iter().map(|&o| o + shift));
        Geometry::from_parts(coords, offsets)
    }

    /// Apply an arbitrary affine map (3×3 linear part + translation) to every
    /// point. Offsets are copied unchanged; the result has a new id.
    pub fn transform(&self, affine: &Affine3A) -> Geometry {
        let coords = self
            .coords
            .iter()
            .map(|&p| affine.transform_point3(Vec3::from_array(p)).to_array())
            .collect();
        Geometry::from_parts(coords, self.offsets.clone())
    }

    /// Translate every point by `delta`.
    pub fn translated(&self, delta: Vec3) -> Geometry {
        self.transform(&Affine3A::from_translation(delta))
    }

    /// Scale per-axis about `center`.
    pub fn scaled(&self, factors: Vec3, center: Vec3) -> Geometry {
        let affine = Affine3A::from_translation(center)
            * Affine3A::from_scale(factors)
            * Affine3A::from_translation(-center);
        self.transform(&affine)
    }

    /// Rotate about `center` by Euler angles in radians, applied X then Y
    /// then Z (matching the compound-transform effect order).
    pub fn rotated(&self, angles: Vec3, center: Vec3) -> Geometry {
        let rot = Mat3::from_rotation_z(angles.z)
            * Mat3::from_rotation_y(angles.y)
            * Mat3::from_rotation_x(angles.x);
        let affine = Affine3A::from_translation(center)
            * Affine3A::from_mat3(rot)
            * Affine3A::from_translation(-center);
        self.transform(&affine)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Iterator returned by [`Geometry::polylines`].
pub struct Polylines<'a> {
    geometry: &'a Geometry,
    line: usize,
}

impl<'a> Iterator for Polylines<'a> {
    type Item = &'a [[f32; 3]];

    fn next(&mut self) -> Option<Self::Item> {
        let slice = self.geometry.polyline(self.line)?;
        self.line += 1;
        Some(slice)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.geometry.line_count().saturating_sub(self.line);
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Polylines<'a> {}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_polylines() -> impl Strategy<Value = Vec<Vec<[f32; 3]>>> {
        prop::collection::vec(
            prop::collection::vec(
                (-100.0f32..100.0, -100.0f32..100.0, -100.0f32..100.0).prop_map(|(x, y, z)| [x, y, z]),
                0..12,
            ),
            0..8,
        )
    }

    proptest! {
        #[test]
        fn offsets_invariant_holds(lines in arb_polylines()) {
            let g = Geometry::from_polylines(lines.clone());
            prop_assert_eq!(g.offsets()[0], 0);
            prop_assert!(g.offsets().windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(*g.offsets().last().unwrap() as usize, g.point_count());
            prop_assert_eq!(g.line_count(), lines.len());
        }

        #[test]
        fn polylines_round_trip(lines in arb_polylines()) {
            let g = Geometry::from_polylines(lines.clone());
            let back: Vec<Vec<[f32; 3]>> = g.polylines().map(|l| l.to_vec()).collect();
            prop_assert_eq!(back, lines);
        }

        #[test]
        fn concat_appends_polylines(a in arb_polylines(), b in arb_polylines()) {
            let ga = Geometry::from_polylines(a.clone());
            let gb = Geometry::from_polylines(b.clone());
            let gc = ga.concat(&gb);
            let mut expected = a;
            expected.extend(b);
            let back: Vec<Vec<[f32; 3]>> = gc.polylines().map(|l| l.to_vec()).collect();
            prop_assert_eq!(back, expected);
        }
    }
}
