//! Ordered, optionally capped log of readings, newest first.

use std::str::FromStr;

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, Settings};
use crate::reading::Reading;

/// Retention policy applied on every insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_size: usize,
    pub auto_cleanup: bool,
}

impl From<&Settings> for Retention {
    fn from(s: &Settings) -> Self {
        Self {
            max_size: s.max_history_size,
            auto_cleanup: s.auto_cleanup,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    readings: Vec<Reading>,
    retention: Retention,
}

impl HistoryStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            readings: Vec::new(),
            retention,
        }
    }

    /// Build from previously persisted readings (already newest-first).
    /// The cap applies immediately when auto-cleanup is on.
    pub fn from_persisted(readings: Vec<Reading>, retention: Retention) -> Self {
        let mut store = Self {
            readings,
            retention,
        };
        store.enforce_cap();
        store
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    /// Takes effect at the next insertion.
    pub fn set_retention(&mut self, retention: Retention) {
        self.retention = retention;
    }

    /// Insert at the front, then evict from the tail if over the cap.
    /// Returns the number of evicted readings.
    pub fn append(&mut self, reading: Reading) -> usize {
        self.readings.insert(0, reading);
        self.enforce_cap()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.first()
    }

    pub fn as_slice(&self) -> &[Reading] {
        &self.readings
    }

    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.clone()
    }

    /// Newest-first readings falling inside `range` as seen at `now`.
    pub fn in_range(&self, range: &DateRange, now: DateTime<Utc>) -> Vec<Reading> {
        let (from, to) = range.bounds(now);
        self.readings
            .iter()
            .filter(|r| from.map_or(true, |f| r.timestamp >= f))
            .filter(|r| to.map_or(true, |t| r.timestamp <= t))
            .cloned()
            .collect()
    }

    fn enforce_cap(&mut self) -> usize {
        if !self.retention.auto_cleanup || self.readings.len() <= self.retention.max_size {
            return 0;
        }
        let evicted = self.readings.len() - self.retention.max_size;
        self.readings.truncate(self.retention.max_size);
        evicted
    }
}

/// Time window selecting a subset of history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    All,
    /// Since local midnight.
    Today,
    Hour,
    Day,
    Week,
    /// Last 30 days.
    Month,
    Between {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl DateRange {
    /// Inclusive lower and upper bounds; `None` is unbounded.
    pub fn bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self {
            DateRange::All => (None, None),
            DateRange::Today => (Some(local_midnight(now)), None),
            DateRange::Hour => (Some(now - Duration::hours(1)), None),
            DateRange::Day => (Some(now - Duration::hours(24)), None),
            DateRange::Week => (Some(now - Duration::days(7)), None),
            DateRange::Month => (Some(now - Duration::days(30)), None),
            DateRange::Between { from, to } => (Some(*from), Some(*to)),
        }
    }
}

fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = now.with_timezone(&Local).date_naive();
    local_date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        // Midnight skipped by a DST jump; fall back to the last 24 hours.
        .unwrap_or_else(|| now - Duration::hours(24))
}

impl FromStr for DateRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(DateRange::All),
            "today" => Ok(DateRange::Today),
            "hour" => Ok(DateRange::Hour),
            "day" => Ok(DateRange::Day),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            other => Err(ConfigError::UnknownDateRange(other.to_string())),
        }
    }
}
