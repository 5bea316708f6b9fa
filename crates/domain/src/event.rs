//! Events carried by the in-process bus.
//!
//! Three channels connect the engine to the rest of the process: decoded
//! fragments, canonical device updates, and outbound command requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::hardware::HardwareDevice;

/// A command to publish on the wire, usually `<prefix>/<device>/controls/<control>/on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Something that happened in the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// A decoded fragment, before reconciliation.
    HardwareDeviceAppeared(HardwareDevice),
    /// A canonical device after a merge (only the touched controls).
    HdAppeared(Device),
    /// A macro asked for a command to be sent to the hardware.
    WbPublishMessage(OutboundMessage),
}

/// Discriminant of an [`Event`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HardwareDeviceAppeared,
    HdAppeared,
    WbPublishMessage,
}

impl EventKind {
    /// Channel name as exposed to subscribers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HardwareDeviceAppeared => "HARDWARE_DEVICE_APPEARED",
            Self::HdAppeared => "HD_APPEARED",
            Self::WbPublishMessage => "WB_PUBLISH_MESSAGE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::HardwareDeviceAppeared(_) => EventKind::HardwareDeviceAppeared,
            Self::HdAppeared(_) => EventKind::HdAppeared,
            Self::WbPublishMessage(_) => EventKind::WbPublishMessage,
        }
    }
}
