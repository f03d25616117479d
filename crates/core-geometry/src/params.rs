//! Canonicalized parameter values for shape and effect keys.
//!
//! Producers are memoized by `(name, params)`, so parameter maps must hash
//! and compare structurally: keys are kept sorted (`BTreeMap`), floats are
//! wrapped in [`OrderedFloat`] for total ordering, and sequences are coerced
//! to [`Param::List`]. The same canonical form feeds the stable digest used
//! by effect-step hashing, so digests are reproducible within a process
//! regardless of insertion order.

use std::collections::BTreeMap;
use std::hash::BuildHasher;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// One canonicalized parameter value.
///
/// Untagged serde representation so pipeline documents read naturally
/// (`{"intensity": 0.4, "style": "rings"}`). Integral JSON numbers
/// deserialize as [`Param::Int`]; accessors coerce between `Int` and
/// `Float`, so semantics survive a round trip even when the variant does
/// not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    List(Vec<Param>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int(v as i64)
    }
}

impl From<usize> for Param {
    fn from(v: usize) -> Self {
        Param::Int(v as i64)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float(OrderedFloat(v))
    }
}

impl From<f32> for Param {
    fn from(v: f32) -> Self {
        Param::Float(OrderedFloat(v as f64))
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_owned())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(v: Vec<T>) -> Self {
        Param::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<[f64; 3]> for Param {
    fn from(v: [f64; 3]) -> Self {
        Param::List(v.iter().map(|&x| Param::from(x)).collect())
    }
}

impl From<[f64; 4]> for Param {
    fn from(v: [f64; 4]) -> Self {
        Param::List(v.iter().map(|&x| Param::from(x)).collect())
    }
}

impl Param {
    /// Numeric view; `Int` coerces to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Param::Float(v) => Some(v.into_inner()),
            Param::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integral view; whole `Float`s coerce to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Param::Int(v) => Some(*v),
            Param::Float(v) if v.into_inner().fract() == 0.0 => Some(v.into_inner() as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Param::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Param]> {
        match self {
            Param::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Sorted, canonicalized parameter map. Structural `Eq`/`Hash` make it
/// usable directly inside cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, Param>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Param>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Param>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Param::as_f64).unwrap_or(default)
    }

    pub fn i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Param::as_i64).unwrap_or(default)
    }

    pub fn usize_or(&self, key: &str, default: usize) -> usize {
        self.i64_or(key, default as i64).max(0) as usize
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Param::as_bool).unwrap_or(default)
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Param::as_str).unwrap_or(default)
    }

    /// Three-component numeric list, for offsets/scales/angles/centers.
    pub fn vec3_or(&self, key: &str, default: [f64; 3]) -> [f64; 3] {
        let Some(list) = self.get(key).and_then(Param::as_list) else {
            return default;
        };
        let mut out = default;
        for (slot, param) in out.iter_mut().zip(list) {
            if let Some(v) = param.as_f64() {
                *slot = v;
            }
        }
        out
    }

    /// Four-component numeric list, for rectangular regions.
    pub fn vec4_or(&self, key: &str, default: [f64; 4]) -> [f64; 4] {
        let Some(list) = self.get(key).and_then(Param::as_list) else {
            return default;
        };
        let mut out = default;
        for (slot, param) in out.iter_mut().zip(list) {
            if let Some(v) = param.as_f64() {
                *slot = v;
            }
        }
        out
    }

    /// Stable 64-bit digest of the canonical form. Seeds are fixed so the
    /// digest depends only on content, never on process-random hasher state.
    pub fn stable_hash(&self) -> u64 {
        const SEEDS: (u64, u64, u64, u64) =
            (0x9e37_79b9_7f4a_7c15, 0x6a09_e667_f3bc_c908, 0xbb67_ae85_84ca_a73b, 0x3c6e_f372_fe94_f82b);
        let state = ahash::RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3);
        state.hash_one(&self.0)
    }
}

impl<K: Into<String>, V: Into<Param>> FromIterator<(K, V)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ParamSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
