//! The `Reading` type: one completed download/upload/ping measurement.
//!
//! Serialized form is the persistence and export contract:
//! `{ id, timestamp, downloadSpeed, uploadSpeed, ping }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Minimum reported download/upload speed in Mbps.
pub const MIN_SPEED_MBPS: f64 = 0.1;

/// Minimum reported round-trip latency in milliseconds.
pub const MIN_PING_MS: f64 = 1.0;

/// A single measurement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Mbps
    pub download_speed: f64,
    /// Mbps
    pub upload_speed: f64,
    /// ms
    pub ping: f64,
}

impl Reading {
    /// Build a reading from raw dimension values, applying the floor clamp.
    pub fn clamped(id: i64, timestamp: DateTime<Utc>, download: f64, upload: f64, ping: f64) -> Self {
        Self {
            id,
            timestamp,
            download_speed: floor(download, MIN_SPEED_MBPS),
            upload_speed: floor(upload, MIN_SPEED_MBPS),
            ping: floor(ping, MIN_PING_MS),
        }
    }
}

// `f64::max` also maps NaN to the floor.
fn floor(value: f64, min: f64) -> f64 {
    value.max(min)
}

/// Issues reading ids from the wall clock (Unix millis), never repeating or
/// going backwards. Seed it with the highest persisted id so ordering holds
/// across restarts even if the clock stepped back.
#[derive(Debug, Default)]
pub struct IdClock {
    last: AtomicI64,
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock whose next id is greater than `last`.
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Ensure every future id is greater than `id`.
    pub fn observe(&self, id: i64) {
        self.last.fetch_max(id, Ordering::AcqRel);
    }

    /// Next id for a reading created at `now`.
    pub fn next(&self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let id = candidate.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, id, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return id,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_applies_floors() {
        let r = Reading::clamped(1, Utc::now(), 0.0, 0.05, 0.0);
        assert_eq!(r.download_speed, MIN_SPEED_MBPS);
        assert_eq!(r.upload_speed, MIN_SPEED_MBPS);
        assert_eq!(r.ping, MIN_PING_MS);

        let r = Reading::clamped(2, Utc::now(), 42.5, 12.0, 18.3);
        assert_eq!(r.download_speed, 42.5);
        assert_eq!(r.upload_speed, 12.0);
        assert_eq!(r.ping, 18.3);
    }

    #[test]
    fn test_clamped_replaces_nan() {
        let r = Reading::clamped(1, Utc::now(), f64::NAN, 3.0, f64::NAN);
        assert_eq!(r.download_speed, MIN_SPEED_MBPS);
        assert_eq!(r.ping, MIN_PING_MS);
    }

    #[test]
    fn test_id_clock_is_strictly_increasing() {
        let clock = IdClock::new();
        let now = Utc::now();
        let a = clock.next(now);
        let b = clock.next(now);
        let c = clock.next(now - chrono::Duration::seconds(10));
        assert_eq!(a, now.timestamp_millis());
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn test_id_clock_resumes_after_persisted_id() {
        let now = Utc::now();
        let future = now.timestamp_millis() + 3_600_000;

        let clock = IdClock::starting_after(future);
        assert_eq!(clock.next(now), future + 1);

        let clock = IdClock::new();
        clock.observe(future);
        clock.observe(future - 5);
        assert_eq!(clock.next(now), future + 1);
    }

    #[test]
    fn test_wire_shape() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let r = Reading::clamped(1709294400000, ts, 50.0, 10.0, 20.0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["id"], 1709294400000i64);
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
        assert_eq!(json["downloadSpeed"], 50.0);
        assert_eq!(json["uploadSpeed"], 10.0);
        assert_eq!(json["ping"], 20.0);
        assert_eq!(json.as_object().unwrap().len(), 5);

        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
