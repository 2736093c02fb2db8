// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt record and status state machine.

use crate::clock::{seconds_between, Clock};
use crate::id::PromptId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a prompt.
///
/// `queued → running → {completed, failed, canceled}`; terminal records may
/// be re-queued via retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl PromptStatus {
    /// Check if this status is terminal (retry-eligible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PromptStatus::Completed | PromptStatus::Failed | PromptStatus::Canceled)
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PromptStatus::Queued => "queued",
            PromptStatus::Running => "running",
            PromptStatus::Completed => "completed",
            PromptStatus::Failed => "failed",
            PromptStatus::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Per-status record counts, kept in lockstep with the record map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl StatusCounts {
    fn slot(&mut self, status: PromptStatus) -> &mut usize {
        match status {
            PromptStatus::Queued => &mut self.queued,
            PromptStatus::Running => &mut self.running,
            PromptStatus::Completed => &mut self.completed,
            PromptStatus::Failed => &mut self.failed,
            PromptStatus::Canceled => &mut self.canceled,
        }
    }

    pub fn add(&mut self, status: PromptStatus) {
        *self.slot(status) += 1;
    }

    pub fn remove(&mut self, status: PromptStatus) {
        let slot = self.slot(status);
        *slot = slot.saturating_sub(1);
    }

    /// Recompute counts from a record iterator (load path and tests).
    pub fn from_records<'a>(records: impl Iterator<Item = &'a PromptRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status);
        }
        counts
    }
}

/// A queued, running, or finished prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: PromptId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Links a follow-up prompt to the prompt it replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<PromptId>,
    pub status: PromptStatus,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_finished_at: Option<String>,
    /// Queue wait of the most recent attempt, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_wait_seconds: Option<f64>,
    /// Runtime of the most recent attempt, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_seconds: Option<f64>,
    pub log_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}

impl PromptRecord {
    /// Create a freshly queued record.
    pub fn new(
        text: impl Into<String>,
        project_id: Option<String>,
        reply_to: Option<PromptId>,
        log_dir: &std::path::Path,
        clock: &impl Clock,
    ) -> Self {
        let id = PromptId::new();
        let now = clock.timestamp();
        let log_path = log_dir.join(format!("prompt_{}.log", id.suffix()));
        Self {
            id,
            text: text.into(),
            project_id,
            reply_to,
            status: PromptStatus::Queued,
            attempts: 0,
            created_at: now.clone(),
            updated_at: now.clone(),
            enqueued_at: Some(now),
            started_at: None,
            last_finished_at: None,
            last_wait_seconds: None,
            last_run_seconds: None,
            log_path,
            result_summary: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds this record has spent queued so far (None unless queued).
    pub fn current_wait_seconds(&self, now: &str) -> Option<f64> {
        if self.status != PromptStatus::Queued {
            return None;
        }
        seconds_between(self.enqueued_at.as_deref()?, now)
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
