// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
///
/// Prompt records persist wall-clock timestamps, so alongside
/// `now`/`epoch_ms` this trait exposes an RFC 3339 rendering of the
/// current moment.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;

    /// Current UTC wall-clock time as an RFC 3339 string.
    fn timestamp(&self) -> String {
        rfc3339_from_epoch_ms(self.epoch_ms())
    }
}

/// Render epoch milliseconds as RFC 3339 (millisecond precision, UTC).
pub fn rfc3339_from_epoch_ms(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp back to epoch milliseconds.
pub fn epoch_ms_from_rfc3339(ts: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.timestamp_millis().max(0) as u64)
}

/// Seconds elapsed between two RFC 3339 timestamps (None on parse failure
/// or negative spans).
pub fn seconds_between(start: &str, end: &str) -> Option<f64> {
    let start_ms = epoch_ms_from_rfc3339(start)?;
    let end_ms = epoch_ms_from_rfc3339(end)?;
    if end_ms < start_ms {
        return None;
    }
    Some((end_ms - start_ms) as f64 / 1000.0)
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
            epoch_ms: Arc::new(Mutex::new(1_000_000)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Set the epoch milliseconds value.
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
