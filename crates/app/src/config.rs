//! Engine configuration: namespace, deny-list, and flush cadences.

use std::time::Duration;

use serde::Deserialize;

/// Topic substrings that are never decoded: board telemetry and
/// command echoes carry no device state worth reconciling.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "battery",
    "power_status",
    "adc",
    "metrics",
    "hwmon",
    "network",
    "system",
];

/// Configuration for the reconciliation and automation engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Topic prefix every device lives under (e.g. `/devices`).
    pub namespace: String,
    /// Substrings that make a topic skipped before parsing.
    pub deny_list: Vec<String>,
    /// How often the full device/control snapshot is upserted, in seconds.
    pub device_save_interval_secs: u64,
    /// How often buffered history is appended, in seconds.
    pub history_flush_interval_secs: u64,
    /// Maximum gap before an unchanged reading is recorded again, in seconds.
    pub history_heartbeat_secs: u64,
    /// Most history entries kept for retry while storage is failing.
    pub history_retry_limit: usize,
    /// How often an idle hub re-checks its flush cadences, in seconds.
    pub tick_interval_secs: u64,
    /// Capacity of each in-process event bus channel.
    pub bus_capacity: usize,
    /// Capacity of the hub command queue.
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "/devices".to_string(),
            deny_list: DEFAULT_DENY_LIST.iter().map(ToString::to_string).collect(),
            device_save_interval_secs: 60,
            history_flush_interval_secs: 300,
            history_heartbeat_secs: 10,
            history_retry_limit: crate::history_recorder::DEFAULT_RETRY_LIMIT,
            tick_interval_secs: 5,
            bus_capacity: 256,
            command_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn device_save_interval(&self) -> Duration {
        Duration::from_secs(self.device_save_interval_secs)
    }

    #[must_use]
    pub fn history_flush_interval(&self) -> Duration {
        Duration::from_secs(self.history_flush_interval_secs)
    }

    #[must_use]
    pub fn history_heartbeat(&self) -> Duration {
        Duration::from_secs(self.history_heartbeat_secs)
    }

    /// Idle tick period, never shorter than one second.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}
