use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, matching the wire format of
/// `timestamp_unix_s` fields.
pub fn unix_now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
