//! Device reconciler: folds hardware fragments into the canonical world.
//!
//! The reconciler owns the canonical device and control maps. Each
//! [`apply`](DeviceReconciler::apply) merges one fragment in memory, hands
//! readings to the [`HistoryRecorder`], and may start a background
//! full-snapshot upsert once the save interval has elapsed. Nothing on the
//! apply path awaits.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use wbhub_domain::device::{Control, Device, Markup};
use wbhub_domain::error::{HubError, InvalidArgumentsError};
use wbhub_domain::hardware::HardwareDevice;
use wbhub_domain::history::HistoryEntry;
use wbhub_domain::id::ControlKey;
use wbhub_domain::time;

use crate::flush::FlushSlot;
use crate::history_recorder::HistoryRecorder;
use crate::ports::{HardwareRepository, HistoryRepository};

/// Canonical devices and controls, keyed by id.
///
/// Every control in `controls` is also attached to its device; the two
/// views are kept in step by the reconciler.
#[derive(Debug, Default, Clone)]
pub struct World {
    devices: BTreeMap<String, Device>,
    controls: BTreeMap<ControlKey, Control>,
}

impl World {
    #[must_use]
    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }

    #[must_use]
    pub fn controls(&self) -> &BTreeMap<ControlKey, Control> {
        &self.controls
    }

    #[must_use]
    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    #[must_use]
    pub fn control(&self, key: &ControlKey) -> Option<&Control> {
        self.controls.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.controls.is_empty()
    }

    pub(crate) fn insert_control(&mut self, control: Control) {
        self.devices
            .entry(control.device_id.clone())
            .or_insert_with(|| Device::seed(&control.device_id))
            .attach(control.clone());
        self.controls.insert(control.key(), control);
    }
}

/// The outcome of one [`apply`](DeviceReconciler::apply).
#[derive(Debug)]
pub struct Diff<'a> {
    /// Each touched control as it was right before the merge. Controls seen
    /// for the first time have no entry.
    pub previous: BTreeMap<ControlKey, Control>,
    /// The merged device: touched controls only, or every known control when
    /// applied with `fill`.
    pub current: Device,
    /// The live world after the merge.
    pub world: &'a World,
}

/// Owns the canonical world and its persistence cadence.
pub struct DeviceReconciler<R, H> {
    world: World,
    repo: Arc<R>,
    history: HistoryRecorder<H>,
    save_interval: Duration,
    last_device_save: Instant,
    slot: FlushSlot,
    loaded: bool,
}

impl<R, H> DeviceReconciler<R, H>
where
    R: HardwareRepository + Send + Sync + 'static,
    H: HistoryRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, history: HistoryRecorder<H>, save_interval: Duration) -> Self {
        Self {
            world: World::default(),
            repo,
            history,
            save_interval,
            last_device_save: Instant::now(),
            slot: FlushSlot::new("devices"),
            loaded: false,
        }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[must_use]
    pub fn history(&self) -> &HistoryRecorder<H> {
        &self.history
    }

    /// Merge one fragment into the canonical world.
    pub fn apply(&mut self, fragment: &HardwareDevice, fill: bool) -> Diff<'_> {
        let at = time::now();
        let device = self
            .world
            .devices
            .entry(fragment.id.clone())
            .or_insert_with(|| Device::seed(&fragment.id));
        device.merge_fields(fragment);

        let mut previous = BTreeMap::new();
        for (control_id, incoming) in &fragment.controls {
            let key = ControlKey::new(&fragment.id, control_id);
            let control = match self.world.controls.entry(key) {
                Entry::Occupied(entry) => {
                    let key = entry.key().clone();
                    let control = entry.into_mut();
                    previous.insert(key, control.merge(incoming));
                    control
                }
                Entry::Vacant(entry) => {
                    let control = entry.insert(Control::seed(&fragment.id, control_id));
                    control.merge(incoming);
                    control
                }
            };
            device.attach(control.clone());
            if incoming.carries_reading() {
                self.history.add(HistoryEntry::capture(control, at));
            }
        }

        let current = if fill {
            device.clone()
        } else {
            device.with_only_controls(fragment.controls.keys().map(String::as_str))
        };

        self.maybe_flush(Instant::now());

        Diff {
            previous,
            current,
            world: &self.world,
        }
    }

    /// Load persisted devices and controls once, if nothing is known yet.
    ///
    /// # Errors
    ///
    /// Returns a storage error if loading fails; the load is retried on the
    /// next call.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_loaded(&mut self) -> Result<&World, HubError> {
        if !self.loaded && self.world.is_empty() {
            let devices = self.repo.get_all_devices().await?;
            let controls = self.repo.get_all_controls().await?;
            tracing::info!(
                devices = devices.len(),
                controls = controls.len(),
                "loaded canonical state"
            );
            for device in devices {
                self.world.devices.insert(device.id.clone(), device.clone_fields());
            }
            for control in controls {
                self.world.insert_control(control);
            }
        }
        self.loaded = true;
        Ok(&self.world)
    }

    /// Every canonical device with its full control list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Device> {
        self.world.devices.values().cloned().collect()
    }

    /// Replace the annotation layer of a device.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::DeviceNotFound`] for an unknown id.
    pub fn set_device_markup(
        &mut self,
        device_id: &str,
        markup: Markup,
        labels: BTreeSet<String>,
    ) -> Result<Device, HubError> {
        let device = self
            .world
            .devices
            .get_mut(device_id)
            .ok_or_else(|| InvalidArgumentsError::DeviceNotFound(device_id.to_string()))?;
        device.markup = markup;
        device.labels = labels;
        Ok(device.clone())
    }

    /// Replace the annotation layer of a control.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentsError::ControlNotFound`] for an unknown key.
    pub fn set_control_markup(
        &mut self,
        key: &ControlKey,
        markup: Markup,
        labels: BTreeSet<String>,
    ) -> Result<Control, HubError> {
        let control = self
            .world
            .controls
            .get_mut(key)
            .ok_or_else(|| InvalidArgumentsError::ControlNotFound(key.clone()))?;
        control.markup = markup;
        control.labels = labels;
        let control = control.clone();
        self.world.insert_control(control.clone());
        Ok(control)
    }

    /// Run the device and history cadence checks.
    pub fn maybe_flush(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_device_save) > self.save_interval {
            self.flush_now(now);
        }
        self.history.maybe_flush(now);
    }

    /// Start a background upsert of every canonical device and control.
    ///
    /// Skipped, without resetting the timer, while the previous upsert is
    /// still running.
    pub fn flush_now(&mut self, now: Instant) -> bool {
        if self.slot.is_busy() {
            return false;
        }
        self.last_device_save = now;
        if self.world.is_empty() {
            return false;
        }

        let devices: Vec<Device> = self.world.devices.values().map(Device::clone_fields).collect();
        let controls: Vec<Control> = self.world.controls.values().cloned().collect();
        let repo = Arc::clone(&self.repo);
        self.slot.spawn(async move {
            let (device_count, control_count) = (devices.len(), controls.len());
            if let Err(err) = repo.upsert_devices(devices).await {
                tracing::warn!(error = %err, "device upsert failed, will retry");
                return;
            }
            if let Err(err) = repo.upsert_controls(controls).await {
                tracing::warn!(error = %err, "control upsert failed, will retry");
                return;
            }
            tracing::debug!(
                devices = device_count,
                controls = control_count,
                "canonical state saved"
            );
        })
    }

    /// Write everything still in memory and wait for it to land.
    pub async fn drain(&mut self) {
        self.slot.settle().await;
        self.flush_now(Instant::now());
        self.slot.settle().await;
        self.history.drain().await;
    }
}
