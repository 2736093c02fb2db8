// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health snapshot shapes published by the store.

use ns_core::{DurationReport, StatusCounts};
use serde::{Deserialize, Serialize};

/// Oldest record in a status, with how long it has sat there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OldestEntry {
    pub id: String,
    pub timestamp: String,
    pub age_seconds: f64,
}

/// Oldest queued (by `enqueued_at`) and oldest running (by `started_at`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OldestRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<OldestEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<OldestEntry>,
}

/// Store health, merged into the periodic health envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status_counts: StatusCounts,
    pub oldest: OldestRefs,
    pub durations: DurationReport,
}
