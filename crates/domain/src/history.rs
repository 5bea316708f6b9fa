//! History: append-only records of control value/error transitions.

use serde::{Deserialize, Serialize};

use crate::device::Control;
use crate::id::ControlKey;
use crate::time::Timestamp;

/// One recorded reading of a control, ordered by arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub device_id: String,
    pub control_id: String,
    pub value: String,
    pub error: String,
    pub created_at: Timestamp,
}

impl HistoryEntry {
    /// Capture the current reading of a canonical control.
    #[must_use]
    pub fn capture(control: &Control, created_at: Timestamp) -> Self {
        Self {
            device_id: control.device_id.clone(),
            control_id: control.id.clone(),
            value: control.value.clone(),
            error: control.error.clone(),
            created_at,
        }
    }

    #[must_use]
    pub fn key(&self) -> ControlKey {
        ControlKey::new(&self.device_id, &self.control_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now;

    #[test]
    fn should_capture_value_and_error_of_control() {
        let mut control = Control::seed("wb-msw-v3_21", "Temperature");
        control.value = "21.4".to_string();
        control.error = "r".to_string();
        let at = now();

        let entry = HistoryEntry::capture(&control, at);

        assert_eq!(entry.key(), control.key());
        assert_eq!(entry.value, "21.4");
        assert_eq!(entry.error, "r");
        assert_eq!(entry.created_at, at);
    }
}
