//! Reusable, batchable effect pipelines.
//!
//! A pipeline is the chain's step list detached from any base buffer:
//! build once, apply to many inputs. Application routes through the chain
//! machinery, so per-input results still land in the chain cache.
//!
//! The optimization pass is deterministic and purely structural: affine
//! steps migrate to the end, which gathers scattered transforms into
//! adjacent runs, and adjacent same-kind steps then fuse by the per-kind
//! composition rules. Rotation fusion sums Euler angles component-wise,
//! which is exact only when the chained rotations share an axis, so it
//! stays behind an opt-in flag.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use core_geometry::Geometry;
use core_geometry::params::ParamSet;

use crate::step::{EffectStep, StepDoc};
use crate::{EffectError, Effects};

/// Effect names whose kernels are pure affine maps.
const AFFINE: [&str; 4] = ["translate", "rotate", "scale", "transform"];

fn is_affine(name: &str) -> bool {
    AFFINE.contains(&name)
}

/// Caller-reported memory state; batch sizing backs off under pressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemoryPressure {
    #[default]
    Normal,
    Elevated,
    High,
}

/// Worker sizing inputs for [`EffectPipeline::apply_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPolicy {
    pub memory_pressure: MemoryPressure,
    /// Hard cap; `None` defers to available parallelism.
    pub max_workers: Option<usize>,
}

/// Optimization pass configuration.
#[derive(Debug, Clone, Copy)]
pub struct Optimization {
    /// Move affine steps after topology-changing steps (relative order
    /// within each partition preserved).
    pub reorder: bool,
    /// Fuse adjacent rotations by summing Euler angles. Exact only for
    /// shared-axis chains; off by default.
    pub fuse_rotations: bool,
}

impl Default for Optimization {
    fn default() -> Self {
        Self {
            reorder: true,
            fuse_rotations: false,
        }
    }
}

/// Serialized pipeline: `{ "steps": [{ "name": …, "params": … }] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDoc {
    pub steps: Vec<StepDoc>,
}

/// A reusable ordered step list bound to an effect registry.
#[derive(Clone)]
pub struct EffectPipeline {
    effects: Arc<Effects>,
    steps: Vec<EffectStep>,
}

impl std::fmt::Debug for EffectPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectPipeline")
            .field("steps", &self.steps)
            .finish()
    }
}

impl EffectPipeline {
    pub fn new(effects: Arc<Effects>) -> Self {
        Self {
            effects,
            steps: Vec::new(),
        }
    }

    /// Builder-style append.
    pub fn step(mut self, name: &str, params: ParamSet) -> Self {
        self.steps.push(EffectStep::new(name, params));
        self
    }

    pub fn push(&mut self, step: EffectStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[EffectStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply to one input, equivalent to building a chain on `base` with
    /// these steps and taking its result (including the chain cache).
    pub fn apply(&self, base: &Arc<Geometry>) -> Result<Arc<Geometry>, EffectError> {
        let mut chain = crate::EffectChain::on(Arc::clone(&self.effects), Arc::clone(base));
        for step in &self.steps {
            chain = chain.add_step(step.clone());
        }
        chain.result()
    }

    /// Parallel map over many inputs on a work-stealing pool sized by
    /// [`BatchPolicy`] and a complexity sample. The first failure aborts
    /// the batch.
    pub fn apply_batch(
        &self,
        inputs: &[Arc<Geometry>],
        policy: BatchPolicy,
    ) -> Result<Vec<Arc<Geometry>>, EffectError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.recommended_workers(inputs, policy);
        tracing::debug!(
            target: "effects.pipeline",
            inputs = inputs.len(),
            workers,
            "batch_apply"
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| EffectError::Kernel(format!("batch pool: {e}")))?;
        pool.install(|| inputs.par_iter().map(|g| self.apply(g)).collect())
    }

    /// Worker count from available parallelism and a complexity estimate
    /// over (at most) the first ten inputs, scaled down under memory
    /// pressure.
    pub fn recommended_workers(&self, inputs: &[Arc<Geometry>], policy: BatchPolicy) -> usize {
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let sample: Vec<usize> = inputs.iter().take(10).map(|g| g.point_count()).collect();
        let avg_points = sample.iter().sum::<usize>() / sample.len().max(1);

        let mut workers = available.min(4);
        if avg_points > 100_000 {
            workers = (workers / 2).max(1);
        } else if avg_points < 1_000 {
            workers = (workers * 2).min(available);
        }
        workers = match policy.memory_pressure {
            MemoryPressure::Normal => workers,
            MemoryPressure::Elevated => (workers * 3 / 4).max(1),
            MemoryPressure::High => (workers / 2).max(1),
        };
        if let Some(cap) = policy.max_workers {
            workers = workers.min(cap.max(1));
        }
        workers.min(inputs.len()).max(1)
    }

    /// Deterministic structural optimization (default options).
    pub fn optimize(&self) -> Self {
        self.optimize_with(Optimization::default())
    }

    pub fn optimize_with(&self, opts: Optimization) -> Self {
        let ordered: Vec<EffectStep> = if opts.reorder {
            let (topology, affine): (Vec<_>, Vec<_>) =
                self.steps.iter().cloned().partition(|s| !is_affine(s.name()));
            topology.into_iter().chain(affine).collect()
        } else {
            self.steps.clone()
        };

        let mut fused: Vec<EffectStep> = Vec::with_capacity(ordered.len());
        for step in ordered {
            match fused.last() {
                Some(prev) if prev.name() == step.name() => {
                    if let Some(merged) = fuse_pair(prev, &step, opts) {
                        *fused.last_mut().unwrap() = merged;
                        continue;
                    }
                    fused.push(step);
                }
                _ => fused.push(step),
            }
        }
        Self {
            effects: Arc::clone(&self.effects),
            steps: fused,
        }
    }

    /// Sequential composition: `self` then `other`.
    pub fn then(&self, other: &EffectPipeline) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self {
            effects: Arc::clone(&self.effects),
            steps,
        }
    }

    // ---- serialization ---------------------------------------------------

    pub fn to_doc(&self) -> PipelineDoc {
        PipelineDoc {
            steps: self.steps.iter().map(StepDoc::from).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, EffectError> {
        serde_json::to_string_pretty(&self.to_doc())
            .map_err(|e| EffectError::Kernel(e.to_string()))
    }

    /// Rebuild from a document, validating every name against the registry.
    pub fn from_doc(effects: Arc<Effects>, doc: PipelineDoc) -> Result<Self, EffectError> {
        for step in &doc.steps {
            if !effects.is_registered(&step.name) {
                return Err(EffectError::UnknownEffect(step.name.clone()));
            }
        }
        Ok(Self {
            steps: doc.steps.into_iter().map(EffectStep::from).collect(),
            effects,
        })
    }

    pub fn from_json(effects: Arc<Effects>, json: &str) -> Result<Self, EffectError> {
        let doc: PipelineDoc =
            serde_json::from_str(json).map_err(|e| EffectError::Kernel(e.to_string()))?;
        Self::from_doc(effects, doc)
    }

    pub fn save(&self, path: &Path) -> Result<(), EffectError> {
        std::fs::write(path, self.to_json()?).map_err(|e| EffectError::Kernel(e.to_string()))
    }

    pub fn load(effects: Arc<Effects>, path: &Path) -> Result<Self, EffectError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| EffectError::Kernel(e.to_string()))?;
        Self::from_json(effects, &text)
    }
}

/// Fuse two adjacent same-name steps, or `None` when the kind keeps steps
/// distinct.
fn fuse_pair(prev: &EffectStep, next: &EffectStep, opts: Optimization) -> Option<EffectStep> {
    let name = prev.name();
    let merged = match name {
        "translate" => {
            let a = prev.params().vec3_or("offset", [0.0; 3]);
            let b = next.params().vec3_or("offset", [0.0; 3]);
            let mut params = next.params().clone();
            params.insert("offset", vec![a[0] + b[0], a[1] + b[1], a[2] + b[2]]);
            params
        }
        "scale" => {
            let a = prev.params().vec3_or("factors", [1.0; 3]);
            let b = next.params().vec3_or("factors", [1.0; 3]);
            // Last-encountered center wins.
            let mut params = next.params().clone();
            params.insert("factors", vec![a[0] * b[0], a[1] * b[1], a[2] * b[2]]);
            params
        }
        "rotate" if opts.fuse_rotations => {
            let a = prev.params().vec3_or("angles", [0.0; 3]);
            let b = next.params().vec3_or("angles", [0.0; 3]);
            let mut params = next.params().clone();
            params.insert("angles", vec![a[0] + b[0], a[1] + b[1], a[2] + b[2]]);
            params
        }
        "noise" => {
            let a = prev.params().f64_or("intensity", 0.5);
            let b = next.params().f64_or("intensity", 0.5);
            // Intensities average; frequency/t/seed keep the later step's.
            let mut params = next.params().clone();
            params.insert("intensity", (a + b) / 2.0);
            params
        }
        "subdivide" => {
            let a = prev.params().i64_or("divisions", 1);
            let b = next.params().i64_or("divisions", 1);
            let mut params = next.params().clone();
            params.insert("divisions", a.max(b));
            params
        }
        _ => return None,
    };
    Some(EffectStep::new(name, merged))
}
