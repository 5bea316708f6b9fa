//! Hardware fragments: what a single wire message told us about a device.
//!
//! Every field is optional: a message carries meta, an error or a value, and
//! the reconciler folds these partial views into canonical
//! [`Device`](crate::device::Device)s and [`Control`](crate::device::Control)s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form JSON attributes the wire carried beyond the known fields.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Localized title.
///
/// Deserializes from either a `{ru, en}` object or a plain string, which is
/// taken as the English title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TitlePayload")]
pub struct Title {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ru: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
}

impl Title {
    #[must_use]
    pub fn en(value: impl Into<String>) -> Self {
        Self {
            ru: None,
            en: Some(value.into()),
        }
    }

    #[must_use]
    pub fn ru(value: impl Into<String>) -> Self {
        Self {
            ru: Some(value.into()),
            en: None,
        }
    }

    /// Best label to show: English first, then Russian.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.en.as_deref().or(self.ru.as_deref())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TitlePayload {
    Plain(String),
    Localized {
        #[serde(default)]
        ru: Option<String>,
        #[serde(default)]
        en: Option<String>,
    },
}

impl From<TitlePayload> for Title {
    fn from(value: TitlePayload) -> Self {
        match value {
            TitlePayload::Plain(en) => Self::en(en),
            TitlePayload::Localized { ru, en } => Self { ru, en },
        }
    }
}

/// Wirenboard control type (`meta.type`).
///
/// Unknown types are kept verbatim in [`ControlType::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlType {
    Switch,
    Alarm,
    Pushbutton,
    Range,
    Rgb,
    Text,
    #[default]
    Value,
    Temperature,
    RelHumidity,
    AtmosphericPressure,
    Power,
    PowerConsumption,
    Voltage,
    Current,
    Lux,
    Concentration,
    SoundLevel,
    Other(String),
}

impl ControlType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Switch => "switch",
            Self::Alarm => "alarm",
            Self::Pushbutton => "pushbutton",
            Self::Range => "range",
            Self::Rgb => "rgb",
            Self::Text => "text",
            Self::Value => "value",
            Self::Temperature => "temperature",
            Self::RelHumidity => "rel_humidity",
            Self::AtmosphericPressure => "atmospheric_pressure",
            Self::Power => "power",
            Self::PowerConsumption => "power_consumption",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Lux => "lux",
            Self::Concentration => "concentration",
            Self::SoundLevel => "sound_level",
            Self::Other(other) => other,
        }
    }
}

impl From<&str> for ControlType {
    fn from(value: &str) -> Self {
        match value {
            "switch" => Self::Switch,
            "alarm" => Self::Alarm,
            "pushbutton" => Self::Pushbutton,
            "range" => Self::Range,
            "rgb" => Self::Rgb,
            "text" => Self::Text,
            "value" => Self::Value,
            "temperature" => Self::Temperature,
            "rel_humidity" => Self::RelHumidity,
            "atmospheric_pressure" => Self::AtmosphericPressure,
            "power" => Self::Power,
            "power_consumption" => Self::PowerConsumption,
            "voltage" => Self::Voltage,
            "current" => Self::Current,
            "lux" => Self::Lux,
            "concentration" => Self::Concentration,
            "sound_level" => Self::SoundLevel,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ControlType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ControlType> for String {
    fn from(value: ControlType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial view of one control, as carried by a single message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareControl {
    pub id: String,
    pub title: Option<Title>,
    pub order: Option<i64>,
    pub readonly: Option<bool>,
    #[serde(rename = "type")]
    pub kind: Option<ControlType>,
    pub units: Option<String>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub precision: Option<f64>,
    pub value: Option<String>,
    pub topic: Option<String>,
    pub error: Option<String>,
    pub meta: Option<Meta>,
}

impl HardwareControl {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether this fragment reports a value or error transition.
    #[must_use]
    pub fn carries_reading(&self) -> bool {
        self.value.is_some() || self.error.is_some()
    }
}

/// Partial view of one device, as carried by a single message.
///
/// Value, meta and error messages arrive separately, so `controls` usually
/// holds zero or one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareDevice {
    pub id: String,
    pub title: Option<Title>,
    pub driver: Option<String>,
    pub error: Option<serde_json::Value>,
    pub meta: Option<Meta>,
    #[serde(default)]
    pub controls: BTreeMap<String, HardwareControl>,
}

impl HardwareDevice {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Attach a control fragment, keyed by its id.
    #[must_use]
    pub fn with_control(mut self, control: HardwareControl) -> Self {
        self.controls.insert(control.id.clone(), control);
        self
    }
}
