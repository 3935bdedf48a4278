use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::dates::dawn_of_time;

/// A prime close to every hour.
pub const NEW_PLACES_PERIOD_SECS: u64 = 3607;
/// A prime close to every hour.
pub const ZOTERO_PERIOD_SECS: u64 = 3613;
/// Prime closest to every 30 minutes.
pub const CHANNEL_PERIOD_SECS: u64 = 1801;
/// A prime close to every 7 minutes.
pub const LOOP_PERIOD_SECS: u64 = 421;

/// Tracks when each reporter or channel, keyed by name, last ran and how
/// often it may run.
#[derive(Debug, Default, Clone)]
pub struct Schedule {
    periods: HashMap<String, Duration>,
    last_execution: HashMap<String, DateTime<Utc>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Periods too long for a [`Duration`] saturate at [`Duration::MAX`].
    pub fn set_period(&mut self, key: impl Into<String>, seconds: u64) {
        let period = i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        self.periods.insert(key.into(), period);
    }

    pub fn period(&self, key: &str) -> Option<Duration> {
        self.periods.get(key).copied()
    }

    pub fn last_execution(&self, key: &str) -> DateTime<Utc> {
        self.last_execution
            .get(key)
            .copied()
            .unwrap_or_else(dawn_of_time)
    }

    /// True when more than the period has passed since the last run. Keys
    /// without a period are always due.
    pub fn is_due(&self, key: &str, now: DateTime<Utc>) -> bool {
        match self.periods.get(key) {
            Some(period) => now - self.last_execution(key) > *period,
            None => true,
        }
    }

    pub fn mark(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_execution.insert(key.to_string(), now);
    }
}
