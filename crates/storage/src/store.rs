// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The prompt store: one durable JSON document plus an in-memory FIFO of
//! ready-to-run ids.
//!
//! Every mutation rewrites the full record set atomically (write to a temp
//! file, then rename). A failed persist rolls the in-memory change back, so
//! observers never see state the disk does not have.

use crate::health::{HealthSnapshot, OldestEntry, OldestRefs};
use ns_core::attempt::AttemptRecord;
use ns_core::clock::{seconds_between, Clock};
use ns_core::{DurationWindow, PromptId, PromptRecord, PromptStatus, StatusCounts};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Result summary written onto records recovered from a crashed run.
pub const INTERRUPTED_SUMMARY: &str =
    "Prompt interrupted when backend restarted; marked as failed";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("prompt text is required")]
    EmptyText,

    #[error("prompt not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("failed to persist prompt store: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to encode prompt store: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Conflict(msg.into())
    }
}

struct Inner {
    records: HashMap<String, PromptRecord>,
    counts: StatusCounts,
    durations: DurationWindow,
    recovered: Vec<PromptId>,
}

/// Durable, ordered prompt store with a FIFO of ready ids.
pub struct PromptStore<C: Clock> {
    db_path: PathBuf,
    log_dir: PathBuf,
    clock: C,
    inner: Mutex<Inner>,
    ready_tx: mpsc::UnboundedSender<PromptId>,
    ready_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PromptId>>,
}

impl<C: Clock> PromptStore<C> {
    /// Load the store from disk, creating an empty document if none exists.
    ///
    /// Malformed content yields an empty store rather than a startup
    /// failure; the operator is expected to hold backups. Ghost `running`
    /// records from a crashed process are rewritten to `failed` here.
    pub fn load(db_path: &Path, log_dir: &Path, clock: C) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(log_dir)?;

        let records = read_document(db_path);
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let counts = StatusCounts::from_records(records.values());
        let store = Self {
            db_path: db_path.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
            clock,
            inner: Mutex::new(Inner {
                records,
                counts,
                durations: DurationWindow::default(),
                recovered: Vec::new(),
            }),
            ready_tx,
            ready_rx: tokio::sync::Mutex::new(ready_rx),
        };
        store.recover_and_requeue()?;
        Ok(store)
    }

    fn recover_and_requeue(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // Ghost running records are failures from a previous process life.
        let ghosts: Vec<String> = inner
            .records
            .values()
            .filter(|r| r.status == PromptStatus::Running)
            .map(|r| r.id.as_str().to_string())
            .collect();
        let interrupted_at = self.clock.timestamp();
        for id in &ghosts {
            if let Some(record) = inner.records.get_mut(id.as_str()) {
                record.status = PromptStatus::Failed;
                record.updated_at = interrupted_at.clone();
                record.last_finished_at = Some(interrupted_at.clone());
                record.result_summary = Some(INTERRUPTED_SUMMARY.to_string());
                inner.counts.remove(PromptStatus::Running);
                inner.counts.add(PromptStatus::Failed);
                append_interrupted_block(record, &interrupted_at);
                inner.recovered.push(record.id.clone());
                tracing::warn!(prompt_id = %id, "recovered interrupted prompt; marked as failed");
            }
        }

        // Rebuild the duration window from finished records, oldest first,
        // so the report survives restarts.
        let mut finished: Vec<&PromptRecord> = inner
            .records
            .values()
            .filter(|r| r.last_finished_at.is_some())
            .collect();
        finished.sort_by(|a, b| a.last_finished_at.cmp(&b.last_finished_at));
        let mut durations = DurationWindow::default();
        for record in finished {
            durations.push(record.last_wait_seconds, record.last_run_seconds);
        }
        inner.durations = durations;

        // Re-seed the FIFO with queued records in enqueue order.
        let mut queued: Vec<&PromptRecord> =
            inner.records.values().filter(|r| r.status == PromptStatus::Queued).collect();
        queued.sort_by(|a, b| {
            a.enqueued_at.cmp(&b.enqueued_at).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        for record in queued {
            let _ = self.ready_tx.send(record.id.clone());
        }

        if !inner.recovered.is_empty() {
            persist(&self.db_path, &inner.records)?;
        }
        Ok(())
    }

    /// Create a queued record. Empty or whitespace text is rejected.
    pub fn submit(
        &self,
        text: &str,
        project_id: Option<String>,
        reply_to: Option<PromptId>,
    ) -> Result<PromptRecord, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::EmptyText);
        }
        let record = PromptRecord::new(text, project_id, reply_to, &self.log_dir, &self.clock);
        {
            let mut inner = self.inner.lock();
            inner.records.insert(record.id.as_str().to_string(), record.clone());
            inner.counts.add(PromptStatus::Queued);
            if let Err(err) = persist(&self.db_path, &inner.records) {
                inner.records.remove(record.id.as_str());
                inner.counts.remove(PromptStatus::Queued);
                return Err(err);
            }
        }
        let _ = self.ready_tx.send(record.id.clone());
        Ok(record)
    }

    /// Snapshot of all records, newest first (ties broken by id).
    pub fn list(&self) -> Vec<PromptRecord> {
        let inner = self.inner.lock();
        let mut records: Vec<PromptRecord> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        records
    }

    pub fn get(&self, id: &str) -> Option<PromptRecord> {
        self.inner.lock().records.get(id).cloned()
    }

    /// Number of records currently queued.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().counts.queued
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.inner.lock().counts
    }

    /// Pop the next ready id, waiting up to `block_timeout`.
    ///
    /// Ids surface in strict submission order. A popped id may refer to a
    /// record deleted while queued; callers treat a missing record as "skip
    /// and continue".
    pub async fn take_next(&self, block_timeout: Duration) -> Option<PromptId> {
        let mut rx = self.ready_rx.lock().await;
        match tokio::time::timeout(block_timeout, rx.recv()).await {
            Ok(Some(id)) => Some(id),
            _ => None,
        }
    }

    /// Transition a queued record to running and stamp attempt bookkeeping.
    pub fn begin_attempt(&self, id: &str) -> Result<PromptRecord, StoreError> {
        let now = self.clock.timestamp();
        self.mutate(id, |record| {
            if record.status != PromptStatus::Queued {
                return Err(StoreError::conflict(format!(
                    "prompt is {} and cannot start an attempt",
                    record.status
                )));
            }
            record.status = PromptStatus::Running;
            record.attempts += 1;
            record.started_at = Some(now.clone());
            record.last_wait_seconds =
                record.enqueued_at.as_deref().and_then(|start| seconds_between(start, &now));
            record.updated_at = now.clone();
            Ok(())
        })
    }

    pub fn complete(&self, id: &str, summary: &str) -> Result<PromptRecord, StoreError> {
        self.finish(id, PromptStatus::Completed, summary)
    }

    pub fn fail(&self, id: &str, summary: &str) -> Result<PromptRecord, StoreError> {
        self.finish(id, PromptStatus::Failed, summary)
    }

    pub fn cancel(&self, id: &str, summary: &str) -> Result<PromptRecord, StoreError> {
        self.finish(id, PromptStatus::Canceled, summary)
    }

    fn finish(
        &self,
        id: &str,
        status: PromptStatus,
        summary: &str,
    ) -> Result<PromptRecord, StoreError> {
        let now = self.clock.timestamp();
        let mut sample = None;
        let record = self.mutate(id, |record| {
            if record.status != PromptStatus::Running {
                return Err(StoreError::conflict(format!(
                    "prompt is {} and cannot transition to {}",
                    record.status, status
                )));
            }
            record.status = status;
            record.last_finished_at = Some(now.clone());
            record.last_run_seconds =
                record.started_at.as_deref().and_then(|start| seconds_between(start, &now));
            record.result_summary = Some(summary.to_string());
            record.updated_at = now.clone();
            sample = Some((record.last_wait_seconds, record.last_run_seconds));
            Ok(())
        })?;
        if let Some((wait, run)) = sample {
            self.inner.lock().durations.push(wait, run);
        }
        Ok(record)
    }

    /// Re-queue a non-running record, resetting its wait/start timestamps.
    ///
    /// Retrying an already-queued prompt is a harmless re-timestamp; the
    /// duplicate FIFO entry it leaves behind is absorbed by the worker's
    /// begin-attempt conflict check.
    pub fn retry(&self, id: &str) -> Result<PromptRecord, StoreError> {
        let now = self.clock.timestamp();
        let record = self.mutate(id, |record| {
            if record.status == PromptStatus::Running {
                return Err(StoreError::conflict("prompt is still running"));
            }
            record.status = PromptStatus::Queued;
            record.enqueued_at = Some(now.clone());
            record.started_at = None;
            record.updated_at = now.clone();
            Ok(())
        })?;
        let _ = self.ready_tx.send(record.id.clone());
        Ok(record)
    }

    /// Replace the text of a queued record.
    pub fn edit(&self, id: &str, text: &str) -> Result<PromptRecord, StoreError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(StoreError::EmptyText);
        }
        let now = self.clock.timestamp();
        self.mutate(id, |record| {
            if record.status != PromptStatus::Queued {
                return Err(StoreError::conflict("prompt can only be edited while queued"));
            }
            record.text = text.clone();
            record.updated_at = now.clone();
            Ok(())
        })
    }

    /// Remove a queued record and its log file.
    pub fn delete(&self, id: &str) -> Result<PromptRecord, StoreError> {
        let removed = {
            let mut inner = self.inner.lock();
            let record = inner.records.get(id).ok_or(StoreError::NotFound)?;
            if record.status != PromptStatus::Queued {
                return Err(StoreError::conflict("prompt can only be deleted while queued"));
            }
            let removed = match inner.records.remove(id) {
                Some(record) => record,
                None => return Err(StoreError::NotFound),
            };
            inner.counts.remove(PromptStatus::Queued);
            if let Err(err) = persist(&self.db_path, &inner.records) {
                inner.records.insert(id.to_string(), removed);
                inner.counts.add(PromptStatus::Queued);
                return Err(err);
            }
            removed
        };
        // Log removal is best-effort telemetry cleanup.
        let _ = std::fs::remove_file(&removed.log_path);
        Ok(removed)
    }

    /// Drain the ids recovered from a crashed run so the hub can broadcast
    /// their new state once.
    pub fn recover_inflight(&self) -> Vec<PromptId> {
        std::mem::take(&mut self.inner.lock().recovered)
    }

    pub fn durations(&self) -> ns_core::DurationReport {
        self.inner.lock().durations.report()
    }

    /// Store health: counts, oldest queued/running, duration window.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        let now = self.clock.timestamp();
        let inner = self.inner.lock();
        let oldest_queued = oldest_by(
            inner.records.values().filter(|r| r.status == PromptStatus::Queued),
            |r| r.enqueued_at.as_deref(),
            &now,
        );
        let oldest_running = oldest_by(
            inner.records.values().filter(|r| r.status == PromptStatus::Running),
            |r| r.started_at.as_deref(),
            &now,
        );
        HealthSnapshot {
            status_counts: inner.counts,
            oldest: OldestRefs { queued: oldest_queued, running: oldest_running },
            durations: inner.durations.report(),
        }
    }

    /// Apply a record mutation with persist-or-rollback semantics.
    fn mutate(
        &self,
        id: &str,
        apply: impl FnOnce(&mut PromptRecord) -> Result<(), StoreError>,
    ) -> Result<PromptRecord, StoreError> {
        let mut inner = self.inner.lock();
        let previous = inner.records.get(id).cloned().ok_or(StoreError::NotFound)?;
        let record = match inner.records.get_mut(id) {
            Some(record) => record,
            None => return Err(StoreError::NotFound),
        };
        apply(record)?;
        let updated = record.clone();
        if previous.status != updated.status {
            inner.counts.remove(previous.status);
            inner.counts.add(updated.status);
        }
        if let Err(err) = persist(&self.db_path, &inner.records) {
            if previous.status != updated.status {
                inner.counts.remove(updated.status);
                inner.counts.add(previous.status);
            }
            inner.records.insert(id.to_string(), previous);
            return Err(err);
        }
        Ok(updated)
    }
}

/// Read the on-disk document, tolerating absence and corruption.
fn read_document(db_path: &Path) -> HashMap<String, PromptRecord> {
    let raw = match std::fs::read_to_string(db_path) {
        Ok(raw) => raw,
        Err(_) => return HashMap::new(),
    };
    match serde_json::from_str::<HashMap<String, PromptRecord>>(&raw) {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(path = %db_path.display(), error = %err, "malformed prompt store; starting empty");
            HashMap::new()
        }
    }
}

/// Write the full record set atomically: temp file in the same directory,
/// then rename over the document.
fn persist(db_path: &Path, records: &HashMap<String, PromptRecord>) -> Result<(), StoreError> {
    let ordered: BTreeMap<&str, &PromptRecord> =
        records.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut serialized = serde_json::to_string_pretty(&ordered)?;
    serialized.push('\n');
    let tmp_path = db_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, serialized)?;
    std::fs::rename(&tmp_path, db_path)?;
    Ok(())
}

fn oldest_by<'a>(
    records: impl Iterator<Item = &'a PromptRecord>,
    key: impl Fn(&PromptRecord) -> Option<&str>,
    now: &str,
) -> Option<OldestEntry> {
    records
        .filter_map(|record| key(record).map(|ts| (record, ts)))
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(record, ts)| OldestEntry {
            id: record.id.as_str().to_string(),
            timestamp: ts.to_string(),
            age_seconds: seconds_between(ts, now).unwrap_or(0.0),
        })
}

/// Append the synthetic attempt block recorded for a ghost-running prompt.
fn append_interrupted_block(record: &PromptRecord, interrupted_at: &str) {
    let block = AttemptRecord {
        received_at: record.created_at.clone(),
        prompt_text: record.text.clone(),
        context: String::new(),
        summary: INTERRUPTED_SUMMARY.to_string(),
        status: "failed".to_string(),
        completed_at: interrupted_at.to_string(),
        duration_seconds: Some(0.0),
        stdout: String::new(),
        stderr: "Prompt run aborted when the backend restarted; please retry.".to_string(),
    };
    if let Err(err) = block.append_to(&record.log_path) {
        tracing::warn!(prompt_id = %record.id, error = %err, "failed to append interrupted attempt block");
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
