//! Controller input sampling.
//!
//! Device adapters (MIDI, OSC, whatever the host wires up) implement
//! [`ControlDevice`] and hand the sampler batches of `(control, value)`
//! events; per tick the sampler folds them into a flat map and publishes an
//! immutable [`Snapshot`] that workers can hold across a whole frame
//! without racing the sampler. Conflicts between devices resolve
//! first-device-wins within the tick (registration order).
//!
//! Controller state can survive runs through an opaque [`StateStore`];
//! store failures are logged and never fatal.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Tickable;

pub type ControlId = u32;

/// Immutable per-tick view of controller values in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    values: Arc<HashMap<ControlId, f32, ahash::RandomState>>,
}

impl Snapshot {
    pub fn get(&self, id: ControlId) -> Option<f32> {
        self.values.get(&id).copied()
    }

    /// Value with a fallback, the common sketch idiom.
    pub fn get_or(&self, id: ControlId, default: f32) -> f32 {
        self.get(id).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ControlId, f32)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}

/// A source of integer-keyed control events. Implementations live with the
/// host; device I/O is outside the engine core.
pub trait ControlDevice: Send {
    fn name(&self) -> &str;
    /// Drain all pending events since the last poll.
    fn poll(&mut self) -> Vec<(ControlId, f32)>;
    /// Opaque state blob for persistence across runs.
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }
    fn restore_state(&mut self, _blob: &[u8]) {}
}

/// Opaque user-scoped persistence slot keyed by program + device name.
pub trait StateStore: Send + Sync {
    fn save(&self, program: &str, device: &str, blob: &[u8]) -> std::io::Result<()>;
    fn load(&self, program: &str, device: &str) -> std::io::Result<Option<Vec<u8>>>;
}

/// Polls attached devices each tick and exposes the folded snapshot.
pub struct InputSampler {
    program: String,
    devices: Vec<Box<dyn ControlDevice>>,
    values: HashMap<ControlId, f32, ahash::RandomState>,
    snapshot: Snapshot,
    store: Option<Arc<dyn StateStore>>,
}

impl InputSampler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            devices: Vec::new(),
            values: HashMap::default(),
            snapshot: Snapshot::default(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a device. Earlier devices win per-tick conflicts. Previously
    /// persisted state is restored on attach when a store is configured.
    pub fn attach(&mut self, mut device: Box<dyn ControlDevice>) {
        if let Some(store) = &self.store {
            match store.load(&self.program, device.name()) {
                Ok(Some(blob)) => device.restore_state(&blob),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        target: "runtime.input",
                        device = device.name(),
                        error = %err,
                        "state_restore_failed"
                    );
                }
            }
        }
        tracing::debug!(target: "runtime.input", device = device.name(), "device_attached");
        self.devices.push(device);
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// The latest published snapshot; cheap to clone and safe to hold for a
    /// whole frame.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Persist device state through the configured store. Failures are
    /// logged (resource exhaustion is non-fatal by contract).
    pub fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        for device in &self.devices {
            if let Some(blob) = device.save_state() {
                if let Err(err) = store.save(&self.program, device.name(), &blob) {
                    tracing::warn!(
                        target: "runtime.input",
                        device = device.name(),
                        error = %err,
                        "state_save_failed"
                    );
                }
            }
        }
    }
}

impl Tickable for InputSampler {
    fn tick(&mut self, _dt: f64) -> anyhow::Result<()> {
        // First-wins across devices: a control touched by an earlier device
        // this tick is immune to later devices' events.
        let mut touched: HashMap<ControlId, (), ahash::RandomState> = HashMap::default();
        for device in &mut self.devices {
            for (id, value) in device.poll() {
                if touched.contains_key(&id) {
                    continue;
                }
                touched.insert(id, ());
                self.values.insert(id, value.clamp(0.0, 1.0));
            }
        }
        if !touched.is_empty() {
            self.snapshot = Snapshot {
                values: Arc::new(self.values.clone()),
            };
        }
        Ok(())
    }
}
