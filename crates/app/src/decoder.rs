//! Protocol decoder: turns Wirenboard `(topic, payload)` pairs into
//! [`HardwareDevice`] fragments.
//!
//! Topic layout under the namespace prefix:
//!
//! | Topic | Fragment |
//! |-------|----------|
//! | `<ns>/<device>/meta` | device meta (JSON) |
//! | `<ns>/<device>/meta/error` | device error (JSON or raw string) |
//! | `<ns>/<device>/controls/<control>` | control value (raw string) |
//! | `<ns>/<device>/controls/<control>/meta` | control meta (JSON) |
//! | `<ns>/<device>/controls/<control>/meta/error` | control error (raw string) |
//! | `<ns>/<device>/controls/<control>/meta/<field>` | legacy single-field control meta |
//!
//! The decoder is stateless and never fails its caller: unknown or
//! deny-listed topics are skipped, malformed payloads are logged and dropped.

use serde::Deserialize;
use tracing::{error, trace};

use wbhub_domain::error::{HubError, UnexpectedBehaviorError};
use wbhub_domain::hardware::{ControlType, HardwareControl, HardwareDevice, Meta, Title};

use crate::config::EngineConfig;

/// Which kind of message produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    DeviceMeta,
    DeviceError,
    ControlMeta,
    ControlError,
    ControlValue,
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub device: HardwareDevice,
}

impl Fragment {
    fn device(kind: FragmentKind, device: HardwareDevice) -> Self {
        Self { kind, device }
    }

    fn control(kind: FragmentKind, device_id: &str, control: HardwareControl) -> Self {
        Self {
            kind,
            device: HardwareDevice::new(device_id).with_control(control),
        }
    }
}

#[derive(Deserialize)]
struct DeviceMetaPayload {
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    title: Option<Title>,
    #[serde(flatten)]
    rest: Meta,
}

#[derive(Deserialize)]
struct ControlMetaPayload {
    #[serde(default)]
    title: Option<Title>,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    readonly: Option<bool>,
    #[serde(default, rename = "type")]
    kind: Option<ControlType>,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    precision: Option<f64>,
    #[serde(flatten)]
    rest: Meta,
}

/// Stateless Wirenboard topic decoder.
#[derive(Debug, Clone)]
pub struct Decoder {
    namespace: String,
    deny_list: Vec<String>,
}

impl Decoder {
    /// Create a decoder for the given namespace prefix (e.g. `/devices`).
    #[must_use]
    pub fn new(namespace: impl Into<String>, deny_list: Vec<String>) -> Self {
        let namespace: String = namespace.into();
        Self {
            namespace: namespace.trim_end_matches('/').to_string(),
            deny_list,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.namespace.clone(), config.deny_list.clone())
    }

    /// The writable command topic of a control.
    #[must_use]
    pub fn command_topic(&self, device_id: &str, control_id: &str) -> String {
        format!("{}/{device_id}/controls/{control_id}/on", self.namespace)
    }

    /// Decode one message, logging and dropping anything malformed.
    ///
    /// Returns `None` for skipped topics and dropped payloads.
    #[must_use]
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Option<Fragment> {
        match self.try_decode(topic, payload) {
            Ok(Some(fragment)) => Some(fragment),
            Ok(None) => {
                trace!(topic, "skipping topic");
                None
            }
            Err(err) => {
                error!(topic, error = %err, "dropping malformed fragment");
                None
            }
        }
    }

    /// Decode one message.
    ///
    /// # Errors
    ///
    /// Returns [`UnexpectedBehaviorError::MalformedPayload`] when a topic
    /// that expects JSON (or a typed legacy field) carries something else.
    pub fn try_decode(&self, topic: &str, payload: &[u8]) -> Result<Option<Fragment>, HubError> {
        if self.is_denied(topic) {
            return Ok(None);
        }
        let Some(rest) = topic
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return Ok(None);
        };

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Ok(None);
        }

        let fragment = match segments.as_slice() {
            [device, "meta"] => Some(self.device_meta(topic, device, payload)?),
            [device, "meta", "error"] => Some(device_error(device, payload)),
            [device, "controls", control] => Some(Fragment::control(
                FragmentKind::ControlValue,
                device,
                HardwareControl::new(*control).with_value(text(payload)),
            )),
            [device, "controls", control, "meta"] => {
                Some(self.control_meta(topic, device, control, payload)?)
            }
            [device, "controls", control, "meta", "error"] => Some(Fragment::control(
                FragmentKind::ControlError,
                device,
                HardwareControl::new(*control).with_error(text(payload)),
            )),
            [device, "controls", control, "meta", field] => {
                self.legacy_control_meta(topic, device, control, field, payload)?
            }
            _ => None,
        };
        Ok(fragment)
    }

    fn is_denied(&self, topic: &str) -> bool {
        topic.ends_with("/on") || self.deny_list.iter().any(|deny| topic.contains(deny.as_str()))
    }

    fn device_meta(&self, topic: &str, device: &str, payload: &[u8]) -> Result<Fragment, HubError> {
        let meta: DeviceMetaPayload = parse_json(topic, payload)?;
        trace!(namespace = %self.namespace, device, "device meta");
        Ok(Fragment::device(
            FragmentKind::DeviceMeta,
            HardwareDevice {
                driver: meta.driver,
                title: meta.title,
                meta: Some(meta.rest),
                ..HardwareDevice::new(device)
            },
        ))
    }

    fn control_meta(
        &self,
        topic: &str,
        device: &str,
        control: &str,
        payload: &[u8],
    ) -> Result<Fragment, HubError> {
        let meta: ControlMetaPayload = parse_json(topic, payload)?;
        let readonly = meta.readonly.unwrap_or(false);
        Ok(Fragment::control(
            FragmentKind::ControlMeta,
            device,
            HardwareControl {
                title: meta.title,
                order: meta.order,
                readonly: Some(readonly),
                kind: meta.kind,
                units: meta.units,
                max: meta.max,
                min: meta.min,
                precision: meta.precision,
                topic: (!readonly).then(|| self.command_topic(device, control)),
                meta: Some(meta.rest),
                ..HardwareControl::new(control)
            },
        ))
    }

    fn legacy_control_meta(
        &self,
        topic: &str,
        device: &str,
        control: &str,
        field: &str,
        payload: &[u8],
    ) -> Result<Option<Fragment>, HubError> {
        let raw = text(payload);
        let value = raw.trim();
        let mut fragment = HardwareControl::new(control);
        match field {
            "type" => fragment.kind = Some(ControlType::from(value)),
            "units" => fragment.units = Some(value.to_string()),
            "order" => fragment.order = Some(parse_json(topic, value.as_bytes())?),
            "max" => fragment.max = Some(parse_json(topic, value.as_bytes())?),
            "min" => fragment.min = Some(parse_json(topic, value.as_bytes())?),
            "precision" => fragment.precision = Some(parse_json(topic, value.as_bytes())?),
            "readonly" => {
                let readonly = matches!(value, "1" | "true");
                fragment.readonly = Some(readonly);
                fragment.topic = (!readonly).then(|| self.command_topic(device, control));
            }
            _ => return Ok(None),
        }
        Ok(Some(Fragment::control(
            FragmentKind::ControlMeta,
            device,
            fragment,
        )))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn device_error(device: &str, payload: &[u8]) -> Fragment {
    let error = serde_json::from_slice(payload)
        .unwrap_or_else(|_| serde_json::Value::String(text(payload)));
    Fragment::device(
        FragmentKind::DeviceError,
        HardwareDevice {
            error: Some(error),
            ..HardwareDevice::new(device)
        },
    )
}

fn parse_json<T: serde::de::DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, HubError> {
    serde_json::from_slice(payload).map_err(|source| {
        UnexpectedBehaviorError::MalformedPayload {
            topic: topic.to_string(),
            source,
        }
        .into()
    })
}

fn text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
