// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single prompt worker.
//!
//! One loop, no re-entrancy: pull the next ready id, put the runner under
//! a branch session, reflect the outcome in the store, and fan the change
//! out to subscribers and the status panel.

use ns_core::attempt::AttemptRecord;
use ns_core::clock::Clock;
use ns_core::{ProjectRegistry, SystemClock};
use ns_display::DisplayHandle;
use ns_git::{BranchDiscipline, BranchSession, CleanupResult};
use ns_runner::{RunOutcome, RunRequest, ScopeGuardRunner};
use ns_server::{EventStreamer, PromptCanceler, Store};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Single-threaded prompt executor.
pub struct PromptWorker {
    store: Arc<Store>,
    runner: Arc<ScopeGuardRunner<SystemClock>>,
    git: Arc<BranchDiscipline>,
    streamer: Arc<EventStreamer>,
    projects: Arc<dyn ProjectRegistry>,
    display: Arc<DisplayHandle>,
    take_timeout: Duration,
    current: Mutex<Option<String>>,
    restart_requests: Mutex<HashSet<String>>,
    clock: SystemClock,
}

impl PromptWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        runner: Arc<ScopeGuardRunner<SystemClock>>,
        git: Arc<BranchDiscipline>,
        streamer: Arc<EventStreamer>,
        projects: Arc<dyn ProjectRegistry>,
        display: Arc<DisplayHandle>,
        take_timeout: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            git,
            streamer,
            projects,
            display,
            take_timeout,
            current: Mutex::new(None),
            restart_requests: Mutex::new(HashSet::new()),
            clock: SystemClock,
        }
    }

    /// Run the worker loop until the token fires.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("prompt worker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.iteration() => {}
                }
            }
            tracing::info!("prompt worker stopped");
        })
    }

    /// One pull-execute-publish cycle. Errors never escape; they become
    /// failed-status transitions.
    async fn iteration(&self) {
        let Some(id) = self.store.take_next(self.take_timeout).await else {
            return;
        };
        // Deleted while queued: the id is stale, skip it.
        if self.store.get(id.as_str()).is_none() {
            return;
        }

        self.runner.arm(&id);
        *self.current.lock() = Some(id.as_str().to_string());

        let record = match self.store.begin_attempt(id.as_str()) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(prompt_id = %id, error = %err, "could not begin attempt");
                *self.current.lock() = None;
                return;
            }
        };
        tracing::info!(prompt_id = %id, attempt = record.attempts, "processing prompt");
        self.display.request_refresh("running");
        self.publish(id.as_str());

        let context_text = self.projects.context_for(record.project_id.as_deref());
        let manifest = self.projects.scope_for(record.project_id.as_deref());

        let session = match self.git.begin_run(id.as_str(), &record.text).await {
            Ok(session) => session,
            Err(err) => {
                // Git precondition failed; the child never spawns.
                self.fail_without_run(&record, &context_text, &err.to_string());
                *self.current.lock() = None;
                self.clear_restart(id.as_str());
                self.display.request_refresh("failed");
                self.publish(id.as_str());
                return;
            }
        };

        let outcome = self
            .runner
            .run(RunRequest {
                prompt_id: id.clone(),
                project_id: record.project_id.clone(),
                prompt_text: record.text.clone(),
                context_text,
                log_path: record.log_path.clone(),
                manifest,
            })
            .await;

        // Cleanup runs whatever the outcome; its failure upgrades the
        // overall result to failed.
        let outcome = match &session {
            Some(session) => self.finalize(session, outcome, &record.log_path).await,
            None => outcome,
        };

        if outcome.canceled {
            let restart = self.consume_restart(id.as_str());
            self.mark(id.as_str(), |store, id| store.cancel(id, &outcome.summary));
            tracing::info!(prompt_id = %id, "prompt canceled");
            self.display.request_refresh("canceled");
            if restart {
                match self.store.retry(id.as_str()) {
                    Ok(_) => {
                        tracing::info!(prompt_id = %id, "prompt re-queued after cancellation");
                        self.display.request_refresh("queued");
                    }
                    Err(err) => {
                        tracing::warn!(prompt_id = %id, error = %err, "could not re-queue after cancellation");
                    }
                }
            }
        } else if outcome.success {
            self.mark(id.as_str(), |store, id| store.complete(id, &outcome.summary));
            tracing::info!(prompt_id = %id, "prompt completed");
            self.display.request_refresh("completed");
            self.clear_restart(id.as_str());
        } else {
            self.mark(id.as_str(), |store, id| store.fail(id, &outcome.summary));
            tracing::error!(prompt_id = %id, summary = %outcome.summary, "prompt failed");
            self.display.request_refresh("failed");
            self.clear_restart(id.as_str());
        }

        *self.current.lock() = None;
        self.publish(id.as_str());
    }

    async fn finalize(
        &self,
        session: &BranchSession,
        outcome: RunOutcome,
        log_path: &std::path::Path,
    ) -> RunOutcome {
        match self.git.finalize_run(session).await {
            Ok(Some(cleanup)) => {
                self.append_notes(log_path, &cleanup.notes);
                self.remember_commits(log_path, &cleanup);
                outcome
            }
            Ok(None) => outcome,
            Err(err) => {
                let note = format!("Branch cleanup failed: {err}");
                self.append_notes(log_path, std::slice::from_ref(&note));
                tracing::error!(branch = %session.branch_name, error = %err, "branch cleanup failed");
                RunOutcome {
                    summary: if outcome.success {
                        note
                    } else {
                        format!("{}; {note}", outcome.summary)
                    },
                    success: false,
                    canceled: outcome.canceled,
                }
            }
        }
    }

    /// Record the merged commit shas so a later rollback can revert them.
    fn remember_commits(&self, log_path: &std::path::Path, cleanup: &CleanupResult) {
        if cleanup.commits.is_empty() {
            return;
        }
        let note = format!("Merged commits: {}", cleanup.commits.join(", "));
        self.append_notes(log_path, std::slice::from_ref(&note));
    }

    /// Append branch-lifecycle notes under their own label; the attempt
    /// parser treats the label as a block terminator.
    fn append_notes(&self, log_path: &std::path::Path, notes: &[String]) {
        if notes.is_empty() {
            return;
        }
        let write = || -> std::io::Result<()> {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file =
                std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
            writeln!(file, "Branch notes:")?;
            for note in notes {
                writeln!(file, "{note}")?;
            }
            writeln!(file)?;
            Ok(())
        };
        if let Err(err) = write() {
            tracing::warn!(error = %err, "failed to append branch notes");
        }
    }

    /// Mark a prompt failed when the branch could not be prepared: a
    /// synthetic attempt block stands in for the run that never happened.
    fn fail_without_run(&self, record: &ns_core::PromptRecord, context: &str, error: &str) {
        let now = self.clock.timestamp();
        let block = AttemptRecord {
            received_at: record.started_at.clone().unwrap_or_else(|| now.clone()),
            prompt_text: record.text.clone(),
            context: context.to_string(),
            summary: error.to_string(),
            status: "failed".to_string(),
            completed_at: now,
            duration_seconds: Some(0.0),
            stdout: String::new(),
            stderr: error.to_string(),
        };
        if let Err(err) = block.append_to(&record.log_path) {
            tracing::warn!(prompt_id = %record.id, error = %err, "failed to append attempt block");
        }
        self.mark(record.id.as_str(), |store, id| store.fail(id, error));
        tracing::error!(prompt_id = %record.id, error, "branch preparation failed");
    }

    fn mark(
        &self,
        id: &str,
        transition: impl FnOnce(&Store, &str) -> Result<ns_core::PromptRecord, ns_storage::StoreError>,
    ) {
        if let Err(err) = transition(&self.store, id) {
            tracing::error!(prompt_id = %id, error = %err, "terminal transition failed");
        }
    }

    /// Queue snapshots publish after the record state is persisted, so
    /// subscribers never see a snapshot ahead of the store.
    fn publish(&self, id: &str) {
        self.streamer.broadcast_queue(None);
        self.streamer.broadcast_prompt(id, None);
        self.streamer.broadcast_health(None);
    }

    fn consume_restart(&self, id: &str) -> bool {
        self.restart_requests.lock().remove(id)
    }

    fn clear_restart(&self, id: &str) {
        self.restart_requests.lock().remove(id);
    }
}

impl PromptCanceler for PromptWorker {
    /// Best-effort cancel of the in-flight prompt; false when `prompt_id`
    /// is not currently executing.
    fn request_cancel(&self, prompt_id: &str, restart: bool) -> bool {
        let summary = if restart {
            "Prompt canceled; restart requested"
        } else {
            "Prompt canceled by operator"
        };
        {
            let current = self.current.lock();
            if current.as_deref() != Some(prompt_id) {
                return false;
            }
            let mut restarts = self.restart_requests.lock();
            if restart {
                restarts.insert(prompt_id.to_string());
            } else {
                restarts.remove(prompt_id);
            }
        }
        let canceled = self.runner.cancel(prompt_id, summary);
        if !canceled && restart {
            self.restart_requests.lock().remove(prompt_id);
        }
        canceled
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// Worker handle used by the HTTP layer.
impl PromptWorker {
    /// Id of the prompt currently executing, if any.
    pub fn current_prompt(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

/// Adapter: the display handle satisfies the server's surface seam.
pub struct DisplaySurface(pub Arc<DisplayHandle>);

impl ns_server::StatusSurface for DisplaySurface {
    fn request_refresh(&self, reason: &str) {
        self.0.request_refresh(reason);
    }
}

/// Adapter: the store and task file back the display's queue view.
pub struct StoreDisplaySource {
    pub store: Arc<Store>,
    pub tasks: Arc<dyn ns_core::HumanTaskSource>,
}

impl ns_display::DisplaySource for StoreDisplaySource {
    fn human_tasks(&self) -> Vec<ns_core::HumanTask> {
        self.tasks.list()
    }

    fn prompts(&self) -> Vec<ns_core::PromptRecord> {
        self.store.list()
    }
}
