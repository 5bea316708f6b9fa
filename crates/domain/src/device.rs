//! Canonical devices and controls: the authoritative, fully-populated view
//! built by merging [`hardware`](crate::hardware) fragments over time.
//!
//! Merging never forgets: every field takes the fragment's value when the
//! fragment has one and keeps the canonical value otherwise. `labels` and
//! `markup` form a human annotation layer that telemetry never touches.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::hardware::{ControlType, HardwareControl, HardwareDevice, Meta, Title};
use crate::id::ControlKey;

/// Human annotations for a device or control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markup {
    pub title: String,
    pub description: String,
    pub order: i64,
    pub color: String,
}

/// The canonical state of one control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub device_id: String,
    pub id: String,
    pub title: Title,
    pub order: i64,
    pub readonly: bool,
    #[serde(rename = "type")]
    pub kind: ControlType,
    pub units: String,
    pub max: f64,
    pub min: f64,
    pub precision: f64,
    pub value: String,
    pub topic: String,
    pub error: String,
    pub meta: Meta,
    pub labels: BTreeSet<String>,
    pub markup: Markup,
}

impl Control {
    /// Zero-value control for a first sighting.
    #[must_use]
    pub fn seed(device_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn key(&self) -> ControlKey {
        ControlKey::new(&self.device_id, &self.id)
    }

    /// Fold a fragment into this control and return the generation it
    /// replaced.
    ///
    /// The returned snapshot is taken before any field changes, so it is the
    /// exact state a consumer observed prior to this fragment.
    pub fn merge(&mut self, fragment: &HardwareControl) -> Self {
        let previous = self.clone();

        keep_known(&mut self.title, fragment.title.as_ref());
        keep_known(&mut self.order, fragment.order.as_ref());
        keep_known(&mut self.readonly, fragment.readonly.as_ref());
        keep_known(&mut self.kind, fragment.kind.as_ref());
        keep_known(&mut self.units, fragment.units.as_ref());
        keep_known(&mut self.max, fragment.max.as_ref());
        keep_known(&mut self.min, fragment.min.as_ref());
        keep_known(&mut self.precision, fragment.precision.as_ref());
        keep_known(&mut self.value, fragment.value.as_ref());
        keep_known(&mut self.topic, fragment.topic.as_ref());
        keep_known(&mut self.error, fragment.error.as_ref());
        keep_known(&mut self.meta, fragment.meta.as_ref());

        previous
    }

    /// Whether commands can be sent to this control.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.readonly && !self.topic.is_empty()
    }
}

/// The canonical state of one device, including its known controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub driver: String,
    pub title: Title,
    pub error: serde_json::Value,
    pub meta: Meta,
    pub labels: BTreeSet<String>,
    pub markup: Markup,
    pub controls: Vec<Control>,
}

impl Device {
    /// Zero-value device for a first sighting.
    #[must_use]
    pub fn seed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Fold the device-level fields of a fragment into this device.
    ///
    /// Nested control fragments are not touched here.
    pub fn merge_fields(&mut self, fragment: &HardwareDevice) {
        keep_known(&mut self.driver, fragment.driver.as_ref());
        keep_known(&mut self.title, fragment.title.as_ref());
        keep_known(&mut self.error, fragment.error.as_ref());
        keep_known(&mut self.meta, fragment.meta.as_ref());
    }

    /// Put `control` into the control list, replacing the entry with the same
    /// id or appending it when new.
    pub fn attach(&mut self, control: Control) {
        match self.controls.iter_mut().find(|c| c.id == control.id) {
            Some(slot) => *slot = control,
            None => self.controls.push(control),
        }
    }

    #[must_use]
    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    /// Copy of this device whose control list holds only `ids`.
    #[must_use]
    pub fn with_only_controls<'a, I>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: BTreeSet<&str> = ids.into_iter().collect();
        Self {
            controls: self
                .controls
                .iter()
                .filter(|c| wanted.contains(c.id.as_str()))
                .cloned()
                .collect(),
            ..self.clone_fields()
        }
    }

    /// Copy of the device-level fields with an empty control list.
    #[must_use]
    pub fn clone_fields(&self) -> Self {
        Self {
            id: self.id.clone(),
            driver: self.driver.clone(),
            title: self.title.clone(),
            error: self.error.clone(),
            meta: self.meta.clone(),
            labels: self.labels.clone(),
            markup: self.markup.clone(),
            controls: Vec::new(),
        }
    }
}

fn keep_known<T: Clone>(slot: &mut T, incoming: Option<&T>) {
    if let Some(value) = incoming {
        slot.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_meta() -> HardwareControl {
        HardwareControl {
            readonly: Some(false),
            kind: Some(ControlType::Switch),
            topic: Some("/devices/wb-mr6cu_21/controls/K1/on".to_string()),
            ..HardwareControl::new("K1")
        }
    }

    #[test]
    fn should_seed_zero_value_control() {
        let control = Control::seed("wb-mr6cu_21", "K1");
        assert_eq!(control.key(), ControlKey::new("wb-mr6cu_21", "K1"));
        assert_eq!(control.kind, ControlType::Value);
        assert!(control.value.is_empty());
        assert!(!control.is_writable());
    }

    #[test]
    fn should_keep_known_fields_when_fragment_omits_them() {
        let mut control = Control::seed("wb-mr6cu_21", "K1");
        control.merge(&relay_meta());
        control.merge(&HardwareControl::new("K1").with_value("1"));

        assert_eq!(control.kind, ControlType::Switch);
        assert!(!control.readonly);
        assert_eq!(control.topic, "/devices/wb-mr6cu_21/controls/K1/on");
        assert_eq!(control.value, "1");
        assert!(control.is_writable());
    }

    #[test]
    fn should_return_generation_before_merge() {
        let mut control = Control::seed("wb-mr6cu_21", "K1");
        control.merge(&HardwareControl::new("K1").with_value("0"));

        let previous = control.merge(&HardwareControl::new("K1").with_value("1"));
        assert_eq!(previous.value, "0");
        assert_eq!(control.value, "1");
    }

    #[test]
    fn should_be_idempotent_when_merging_same_fragment_twice() {
        let mut once = Control::seed("wb-mr6cu_21", "K1");
        once.merge(&relay_meta());
        let mut twice = once.clone();
        twice.merge(&relay_meta());
        assert_eq!(once, twice);
    }

    #[test]
    fn should_accept_empty_error_as_known_value() {
        let mut control = Control::seed("wb-mr6cu_21", "K1");
        control.merge(&HardwareControl::new("K1").with_error("r"));
        control.merge(&HardwareControl::new("K1").with_error(""));
        assert_eq!(control.error, "");
    }

    #[test]
    fn should_never_touch_annotations_on_merge() {
        let mut control = Control::seed("wb-mr6cu_21", "K1");
        control.labels.insert("kitchen".to_string());
        control.markup.title = "Ceiling".to_string();
        control.merge(&relay_meta());
        assert!(control.labels.contains("kitchen"));
        assert_eq!(control.markup.title, "Ceiling");
    }

    #[test]
    fn should_merge_device_fields_monotonically() {
        let mut device = Device::seed("wb-mr6cu_21");
        device.merge_fields(&HardwareDevice {
            driver: Some("wb-modbus".to_string()),
            title: Some(Title::ru("Реле")),
            ..HardwareDevice::new("wb-mr6cu_21")
        });
        device.merge_fields(&HardwareDevice {
            error: Some(serde_json::json!("r")),
            ..HardwareDevice::new("wb-mr6cu_21")
        });

        assert_eq!(device.driver, "wb-modbus");
        assert_eq!(device.title, Title::ru("Реле"));
        assert_eq!(device.error, serde_json::json!("r"));
    }

    #[test]
    fn should_replace_attached_control_instead_of_duplicating() {
        let mut device = Device::seed("wb-mr6cu_21");
        device.attach(Control::seed("wb-mr6cu_21", "K1"));
        device.attach(Control::seed("wb-mr6cu_21", "K2"));

        let mut updated = Control::seed("wb-mr6cu_21", "K1");
        updated.value = "1".to_string();
        device.attach(updated);

        assert_eq!(device.controls.len(), 2);
        assert_eq!(device.control("K1").unwrap().value, "1");
        assert_eq!(device.controls[0].id, "K1");
    }

    #[test]
    fn should_filter_controls_for_delta_snapshot() {
        let mut device = Device::seed("wb-mr6cu_21");
        device.driver = "wb-modbus".to_string();
        device.attach(Control::seed("wb-mr6cu_21", "K1"));
        device.attach(Control::seed("wb-mr6cu_21", "K2"));

        let delta = device.with_only_controls(["K2"]);
        assert_eq!(delta.driver, "wb-modbus");
        assert_eq!(delta.controls.len(), 1);
        assert_eq!(delta.controls[0].id, "K2");
    }
}
