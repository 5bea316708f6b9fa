//! Identifiers: UUID-backed newtypes and the compound control key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl Default for $name {
            fn default() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            #[must_use]
            pub fn as_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a [`MacrosConfig`](crate::macros::MacrosConfig).
    MacrosId
);

/// Stable identity of one physical control: `deviceId/controlId`.
///
/// Case-sensitive. Serialized as the joined string so it can be used as a
/// JSON map key and inside macros settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlKey {
    device_id: String,
    control_id: String,
}

impl ControlKey {
    #[must_use]
    pub fn new(device_id: impl Into<String>, control_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            control_id: control_id.into(),
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub fn control_id(&self) -> &str {
        &self.control_id
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.control_id)
    }
}

/// Error returned when a string is not of the form `device/control`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid control key {0:?}, expected \"device/control\"")]
pub struct ParseControlKeyError(String);

impl FromStr for ControlKey {
    type Err = ParseControlKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((device, control)) if !device.is_empty() && !control.is_empty() => {
                Ok(Self::new(device, control))
            }
            _ => Err(ParseControlKeyError(s.to_string())),
        }
    }
}

impl TryFrom<String> for ControlKey {
    type Error = ParseControlKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControlKey> for String {
    fn from(value: ControlKey) -> Self {
        value.to_string()
    }
}
