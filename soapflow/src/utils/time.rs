//! Wall-clock helpers.

use chrono::{DateTime, TimeZone, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts epoch milliseconds back to a timestamp.
#[must_use]
pub fn millis_to_timestamp(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// The current UTC time in RFC 3339 form with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip() {
        let now = now_millis();
        assert_eq!(millis_to_timestamp(now).unwrap().timestamp_millis(), now);
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }
}
