// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding window of queue-wait and runtime samples.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of terminal transitions retained.
pub const DEFAULT_WINDOW: usize = 50;

/// Aggregates over the non-null samples of one duration column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

/// Duration report published in health snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationReport {
    pub window: usize,
    pub samples: usize,
    pub wait: DurationSummary,
    pub run: DurationSummary,
}

/// Bounded window of `(wait_seconds, run_seconds)` pairs observed at
/// terminal transitions. Either side of a pair may be missing (a prompt
/// that failed before spawn has no runtime).
#[derive(Debug, Clone)]
pub struct DurationWindow {
    window: usize,
    samples: VecDeque<(Option<f64>, Option<f64>)>,
}

impl Default for DurationWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DurationWindow {
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1), samples: VecDeque::new() }
    }

    /// Record one terminal transition; the oldest sample falls off when the
    /// window is full.
    pub fn push(&mut self, wait_seconds: Option<f64>, run_seconds: Option<f64>) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back((wait_seconds, run_seconds));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn report(&self) -> DurationReport {
        DurationReport {
            window: self.window,
            samples: self.samples.len(),
            wait: summarize(self.samples.iter().filter_map(|(wait, _)| *wait)),
            run: summarize(self.samples.iter().filter_map(|(_, run)| *run)),
        }
    }
}

fn summarize(values: impl Iterator<Item = f64>) -> DurationSummary {
    let mut count = 0usize;
    let mut total = 0.0f64;
    let mut max = 0.0f64;
    for value in values {
        count += 1;
        total += value;
        if value > max {
            max = value;
        }
    }
    if count == 0 {
        return DurationSummary::default();
    }
    DurationSummary { avg: total / count as f64, max, count }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
