//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for history `created_at`, `last_message_at`, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether strictly more than `window` separates `earlier` from `later`.
///
/// A `later` that lies before `earlier` never exceeds the window.
#[must_use]
pub fn exceeds(earlier: Timestamp, later: Timestamp, window: std::time::Duration) -> bool {
    (later - earlier)
        .to_std()
        .is_ok_and(|elapsed| elapsed > window)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_exceed_only_past_the_window() {
        let start = now();
        let window = Duration::from_secs(10);
        assert!(!exceeds(start, start + chrono::Duration::seconds(10), window));
        assert!(exceeds(start, start + chrono::Duration::milliseconds(10_001), window));
    }

    #[test]
    fn should_not_exceed_when_clock_goes_backwards() {
        let start = now();
        let earlier = start - chrono::Duration::seconds(60);
        assert!(!exceeds(start, earlier, Duration::from_secs(10)));
    }
}
