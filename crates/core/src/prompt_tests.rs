// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::FakeClock;
use std::path::Path;

#[yare::parameterized(
    queued    = { PromptStatus::Queued,    false },
    running   = { PromptStatus::Running,   false },
    completed = { PromptStatus::Completed, true },
    failed    = { PromptStatus::Failed,    true },
    canceled  = { PromptStatus::Canceled,  true },
)]
fn terminal_iff_finished(status: PromptStatus, expected: bool) {
    assert_eq!(status.is_terminal(), expected);
}

#[yare::parameterized(
    queued    = { PromptStatus::Queued,    "queued" },
    running   = { PromptStatus::Running,   "running" },
    completed = { PromptStatus::Completed, "completed" },
    failed    = { PromptStatus::Failed,    "failed" },
    canceled  = { PromptStatus::Canceled,  "canceled" },
)]
fn status_serde_matches_display(status: PromptStatus, text: &str) {
    assert_eq!(status.to_string(), text);
    let json = serde_json::to_string(&status).unwrap();
    assert_eq!(json, format!("\"{text}\""));
    let parsed: PromptStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, status);
}

#[test]
fn new_record_starts_queued() {
    let clock = FakeClock::new();
    let record = PromptRecord::new("Add a changelog entry", None, None, Path::new("/tmp/logs"), &clock);

    assert_eq!(record.status, PromptStatus::Queued);
    assert_eq!(record.attempts, 0);
    assert!(record.enqueued_at.is_some());
    assert!(record.started_at.is_none());
    assert!(record.result_summary.is_none());
    assert!(record.log_path.starts_with("/tmp/logs"));
}

#[test]
fn record_serde_round_trip() {
    let clock = FakeClock::new();
    let mut record = PromptRecord::new("fix tests", Some("web".into()), None, Path::new("/logs"), &clock);
    record.status = PromptStatus::Completed;
    record.result_summary = Some("Agent run succeeded".into());

    let json = serde_json::to_string(&record).unwrap();
    let parsed: PromptRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, record);
}

#[test]
fn current_wait_only_while_queued() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000_000);
    let mut record = PromptRecord::new("slow one", None, None, Path::new("/logs"), &clock);
    clock.advance(std::time::Duration::from_secs(30));

    let now = clock.timestamp();
    assert_eq!(record.current_wait_seconds(&now), Some(30.0));

    record.status = PromptStatus::Running;
    assert_eq!(record.current_wait_seconds(&now), None);
}

#[test]
fn status_counts_track_mutations() {
    let mut counts = StatusCounts::default();
    counts.add(PromptStatus::Queued);
    counts.add(PromptStatus::Queued);
    counts.remove(PromptStatus::Queued);
    counts.add(PromptStatus::Running);

    assert_eq!(counts.queued, 1);
    assert_eq!(counts.running, 1);
    // removal never underflows
    counts.remove(PromptStatus::Failed);
    assert_eq!(counts.failed, 0);
}
