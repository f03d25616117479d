//! One named, canonicalized effect application.

use core_geometry::params::ParamSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named effect plus its canonicalized parameters and their stable digest.
///
/// The digest is computed once at construction; chain keys concatenate step
/// digests, so equal `(name, params)` steps always contribute equal key
/// components regardless of where or when they were built.
#[derive(Debug, Clone)]
pub struct EffectStep {
    name: Arc<str>,
    params: ParamSet,
    params_hash: u64,
}

impl EffectStep {
    pub fn new(name: impl AsRef<str>, params: ParamSet) -> Self {
        let params_hash = params.stable_hash();
        Self {
            name: Arc::from(name.as_ref()),
            params,
            params_hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn params_hash(&self) -> u64 {
        self.params_hash
    }

    /// Digest of the whole step (name + params) as used in chain keys.
    pub fn digest(&self) -> u64 {
        use std::hash::BuildHasher;
        const SEEDS: (u64, u64, u64, u64) = (
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        );
        let state = ahash::RandomState::with_seeds(SEEDS.0, SEEDS.1, SEEDS.2, SEEDS.3);
        state.hash_one((&*self.name, self.params_hash))
    }
}

impl PartialEq for EffectStep {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.params_hash == other.params_hash
    }
}

impl Eq for EffectStep {}

/// Serialized form: `{ "name": …, "params": … }`, the unit of the pipeline
/// document format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDoc {
    pub name: String,
    #[serde(default)]
    pub params: ParamSet,
}

impl From<&EffectStep> for StepDoc {
    fn from(step: &EffectStep) -> Self {
        StepDoc {
            name: step.name().to_owned(),
            params: step.params().clone(),
        }
    }
}

impl From<StepDoc> for EffectStep {
    fn from(doc: StepDoc) -> Self {
        EffectStep::new(doc.name, doc.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_params_equal_digest() {
        let a = EffectStep::new("translate", ParamSet::new().with("offset", vec![1.0, 2.0, 0.0]));
        let b = EffectStep::new("translate", ParamSet::new().with("offset", vec![1.0, 2.0, 0.0]));
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn name_participates_in_digest() {
        let a = EffectStep::new("translate", ParamSet::new());
        let b = EffectStep::new("rotate", ParamSet::new());
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn step_doc_round_trip() {
        let step = EffectStep::new("noise", ParamSet::new().with("intensity", 0.4));
        let doc = StepDoc::from(&step);
        let text = serde_json::to_string(&doc).unwrap();
        let back: StepDoc = serde_json::from_str(&text).unwrap();
        let restored = EffectStep::from(back);
        assert_eq!(restored.name(), "noise");
        assert_eq!(restored.params().f64_or("intensity", 0.0), 0.4);
    }
}
