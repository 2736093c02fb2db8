// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! View-builders for broadcast payloads.
//!
//! The core record stays lean; the "extra" fields clients want (project
//! payload, stdout preview, parsed attempt history, composed context) are
//! attached here at broadcast time.

use ns_core::{parse_attempts, stdout_summary, ProjectRegistry, PromptRecord, PromptStatus};
use serde_json::{json, Value};
use std::path::Path;

/// Paragraphs of stdout kept for previews.
const PREVIEW_PARAGRAPHS: usize = 2;

/// Trailing stdout of the last attempt in a prompt's log.
pub fn stdout_preview(log_path: &Path) -> String {
    let text = std::fs::read_to_string(log_path).unwrap_or_default();
    parse_attempts(&text)
        .last()
        .map(|attempt| stdout_summary(&attempt.stdout, PREVIEW_PARAGRAPHS))
        .unwrap_or_default()
}

/// One entry of the queue snapshot.
pub fn snapshot_item(record: &PromptRecord, projects: &dyn ProjectRegistry, now: &str) -> Value {
    let mut item = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    if let Some(project) = projects.payload(record.project_id.as_deref()) {
        item["project"] = serde_json::to_value(&project).unwrap_or(Value::Null);
    }
    item["stdout_preview"] = Value::String(if record.status == PromptStatus::Completed {
        stdout_preview(&record.log_path)
    } else {
        String::new()
    });
    if let Some(wait) = record.current_wait_seconds(now) {
        item["current_wait_seconds"] = json!(wait);
    }
    item
}

/// The `queue_snapshot` payload: all records, newest first.
pub fn queue_snapshot(
    records: &[PromptRecord],
    projects: &dyn ProjectRegistry,
    now: &str,
) -> Value {
    let items: Vec<Value> =
        records.iter().map(|record| snapshot_item(record, projects, now)).collect();
    json!({ "items": items })
}

/// The full `prompt_update` payload for one record: the record plus its
/// log text, parsed attempt history, composed context, and project.
pub fn prompt_payload(record: &PromptRecord, projects: &dyn ProjectRegistry) -> Value {
    let mut payload = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    let log_text = std::fs::read_to_string(&record.log_path).unwrap_or_default();
    payload["attempt_logs"] =
        serde_json::to_value(parse_attempts(&log_text)).unwrap_or(Value::Null);
    payload["log"] = Value::String(log_text);
    payload["agents_context"] = Value::String(projects.context_for(record.project_id.as_deref()));
    if let Some(project) = projects.payload(record.project_id.as_deref()) {
        payload["project"] = serde_json::to_value(&project).unwrap_or(Value::Null);
    }
    payload["stdout_preview"] = Value::String(if record.status == PromptStatus::Completed {
        stdout_preview(&record.log_path)
    } else {
        String::new()
    });
    payload
}

#[cfg(test)]
#[path = "views_tests.rs"]
mod tests;
