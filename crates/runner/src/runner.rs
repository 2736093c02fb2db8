// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process supervision for one guarded Agent CLI run.

use crate::guard::{GuardPaths, ScopeEnforcer};
use crate::monitor::{CommandMonitor, TerminateChild};
use crate::tracker::DirtyFileTracker;
use ns_core::attempt::AttemptRecord;
use ns_core::clock::Clock;
use ns_core::event::{StreamFrame, StreamName, StreamSink};
use ns_core::{PromptId, ScopeManifest};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Environment variable names handed to the Agent CLI child.
pub const ENV_SCOPE_MANIFEST: &str = "NIGHTSHIFT_SCOPE_MANIFEST";
pub const ENV_SCOPE_PROMPT_ID: &str = "NIGHTSHIFT_SCOPE_PROMPT_ID";
pub const ENV_SCOPE_PROJECT_ID: &str = "NIGHTSHIFT_SCOPE_PROJECT_ID";
pub const ENV_SCOPE_STATUS_PATH: &str = "NIGHTSHIFT_SCOPE_STATUS_PATH";
pub const ENV_SCOPE_VIOLATION_LOG: &str = "NIGHTSHIFT_SCOPE_VIOLATION_LOG";
pub const ENV_SCOPE_REPO_ROOT: &str = "NIGHTSHIFT_SCOPE_REPO_ROOT";

/// Grace period between SIGTERM and SIGKILL.
const KILL_ESCALATION: Duration = Duration::from_secs(5);

/// How the runner reports one finished attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub summary: String,
    pub success: bool,
    pub canceled: bool,
}

impl RunOutcome {
    fn failed(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), success: false, canceled: false }
    }

    fn canceled(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), success: false, canceled: true }
    }
}

/// Static runner wiring.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Argv for the Agent CLI (first element is the binary).
    pub agent_cmd: Vec<String>,
    pub repo_root: PathBuf,
    /// Directory for status files and the violation log.
    pub guard_dir: PathBuf,
}

/// Everything one run needs beyond the static config.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub prompt_id: PromptId,
    pub project_id: Option<String>,
    pub prompt_text: String,
    pub context_text: String,
    pub log_path: PathBuf,
    pub manifest: ScopeManifest,
}

#[derive(Default)]
struct CancelState {
    active_prompt: Option<PromptId>,
    child_pid: Option<i32>,
    cancel_target: Option<PromptId>,
    cancel_summary: String,
}

/// Sends SIGTERM to the active child, escalating to SIGKILL.
struct ChildSignaler {
    cancel: Arc<Mutex<CancelState>>,
}

impl TerminateChild for ChildSignaler {
    fn terminate(&self) {
        let pid = self.cancel.lock().child_pid;
        if let Some(pid) = pid {
            terminate_pid(pid);
        }
    }
}

fn terminate_pid(pid: i32) {
    let target = Pid::from_raw(pid);
    if kill(target, Signal::SIGTERM).is_err() {
        return; // already gone
    }
    tokio::spawn(async move {
        tokio::time::sleep(KILL_ESCALATION).await;
        let _ = kill(target, Signal::SIGKILL);
    });
}

/// Supervises the Agent CLI child for one prompt at a time.
pub struct ScopeGuardRunner<C: Clock + 'static> {
    config: RunnerConfig,
    clock: C,
    sink: Arc<dyn StreamSink>,
    cancel: Arc<Mutex<CancelState>>,
    /// Output captured by the in-flight run, consumed by its attempt block.
    captured: Mutex<(String, String)>,
}

impl<C: Clock + 'static> ScopeGuardRunner<C> {
    pub fn new(config: RunnerConfig, clock: C, sink: Arc<dyn StreamSink>) -> Self {
        Self {
            config,
            clock,
            sink,
            cancel: Arc::new(Mutex::new(CancelState::default())),
            captured: Mutex::new((String::new(), String::new())),
        }
    }

    /// Make this prompt the cancel target before its run begins, so a
    /// cancel that lands between dequeue and spawn is observed.
    pub fn arm(&self, prompt_id: &PromptId) {
        self.cancel.lock().active_prompt = Some(prompt_id.clone());
    }

    /// Request cancellation of the active prompt.
    ///
    /// Returns false when `prompt_id` is not the active prompt. Otherwise
    /// records the summary, signals a running child, and returns true.
    pub fn cancel(&self, prompt_id: &str, summary: &str) -> bool {
        let pid = {
            let mut state = self.cancel.lock();
            if state.active_prompt.as_ref().map(|id| id.as_str()) != Some(prompt_id) {
                return false;
            }
            state.cancel_target = state.active_prompt.clone();
            state.cancel_summary = summary.to_string();
            state.child_pid
        };
        if let Some(pid) = pid {
            terminate_pid(pid);
        }
        true
    }

    /// Run the Agent CLI for one prompt under scope enforcement.
    ///
    /// Always appends an attempt block to the prompt log and emits
    /// reset/done frames on both streams, whatever the outcome.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let received_at = self.clock.timestamp();
        let start = self.clock.now();

        self.emit(StreamFrame::reset(
            request.prompt_id.clone(),
            StreamName::Stdout,
            self.clock.timestamp(),
        ));
        self.emit(StreamFrame::reset(
            request.prompt_id.clone(),
            StreamName::Stderr,
            self.clock.timestamp(),
        ));

        let skip_summary = {
            let mut state = self.cancel.lock();
            state.active_prompt = Some(request.prompt_id.clone());
            if state.cancel_target.as_ref() == Some(&request.prompt_id) {
                Some(state.cancel_summary.clone())
            } else {
                None
            }
        };

        let outcome = match skip_summary {
            Some(summary) => {
                let summary =
                    if summary.is_empty() { "Agent run canceled before execution".into() } else { summary };
                RunOutcome::canceled(summary)
            }
            None => self.execute(&request).await,
        };

        // The run is over; release the cancel slot.
        {
            let mut state = self.cancel.lock();
            state.active_prompt = None;
            state.child_pid = None;
            if state.cancel_target.as_ref() == Some(&request.prompt_id) {
                state.cancel_target = None;
                state.cancel_summary.clear();
            }
        }

        let elapsed = self.clock.now().duration_since(start).as_secs_f64();
        self.append_attempt(&request, &outcome, &received_at, elapsed);

        self.emit(StreamFrame::done(
            request.prompt_id.clone(),
            StreamName::Stdout,
            self.clock.timestamp(),
        ));
        self.emit(StreamFrame::done(
            request.prompt_id.clone(),
            StreamName::Stderr,
            self.clock.timestamp(),
        ));

        outcome
    }

    async fn execute(&self, request: &RunRequest) -> RunOutcome {
        let prompt_id = &request.prompt_id;
        let guard_paths = self.guard_paths(prompt_id);
        let mut enforcer = ScopeEnforcer::new(
            &self.config.repo_root,
            request.manifest.compile(),
            prompt_id.as_str(),
            request.project_id.as_deref().unwrap_or(""),
            guard_paths.clone(),
        );
        enforcer.clear_status_file();

        let tracker = match DirtyFileTracker::new(&self.config.repo_root).await {
            Ok(tracker) => tracker,
            Err(err) => {
                let message = enforcer.handle_guard_failure(&err.to_string(), self.clock.timestamp());
                self.emit_chunk(prompt_id, StreamName::Stderr, format!("{message}\n"));
                return self.finish(RunOutcome::failed(message), String::new(), String::new());
            }
        };

        let Some((binary, args)) = self.config.agent_cmd.split_first() else {
            let message = "Agent CLI not configured".to_string();
            self.emit_chunk(prompt_id, StreamName::Stderr, format!("{message}\n"));
            return self.finish(RunOutcome::failed(message), String::new(), String::new());
        };

        let mut command = Command::new(binary);
        command
            .args(args)
            .current_dir(&self.config.repo_root)
            .env(ENV_SCOPE_MANIFEST, serde_json::to_string(&request.manifest).unwrap_or_default())
            .env(ENV_SCOPE_PROMPT_ID, prompt_id.as_str())
            .env(ENV_SCOPE_PROJECT_ID, request.project_id.as_deref().unwrap_or(""))
            .env(ENV_SCOPE_STATUS_PATH, &guard_paths.status_path)
            .env(ENV_SCOPE_VIOLATION_LOG, &guard_paths.violation_log)
            .env(ENV_SCOPE_REPO_ROOT, &self.config.repo_root)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let message = if err.kind() == std::io::ErrorKind::NotFound {
                    "Agent CLI not found; logged placeholder output".to_string()
                } else {
                    format!("Agent invocation error: {err}")
                };
                self.emit_chunk(prompt_id, StreamName::Stderr, format!("{message}\n"));
                return self.finish(RunOutcome::failed(message.clone()), String::new(), message);
            }
        };

        self.cancel.lock().child_pid = child.id().map(|pid| pid as i32);

        // Feed the prompt on stdin, then close it so the agent starts.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(request.prompt_text.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let (lines_tx, lines_rx) = mpsc::channel::<String>(256);
        let stdout_task = child.stdout.take().map(|stdout| {
            tokio::spawn(pump_stream(
                stdout,
                prompt_id.clone(),
                StreamName::Stdout,
                Arc::clone(&self.sink),
                self.clock.clone(),
                Some(lines_tx),
            ))
        });
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(pump_stream(
                stderr,
                prompt_id.clone(),
                StreamName::Stderr,
                Arc::clone(&self.sink),
                self.clock.clone(),
                None,
            ))
        });

        let monitor = CommandMonitor::new(
            tracker,
            enforcer,
            Arc::new(ChildSignaler { cancel: Arc::clone(&self.cancel) }),
            Arc::clone(&self.sink),
            prompt_id.clone(),
            self.clock.clone(),
        );
        let monitor_task = tokio::spawn(monitor.run(lines_rx));

        let status = child.wait().await;

        let mut stdout_text = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let enforcer = match monitor_task.await {
            Ok(enforcer) => Some(enforcer),
            Err(_) => None,
        };

        let (canceled, cancel_summary) = {
            let state = self.cancel.lock();
            (state.cancel_target.as_ref() == Some(prompt_id), state.cancel_summary.clone())
        };

        let outcome = if canceled {
            let summary = if cancel_summary.is_empty() {
                "Prompt canceled by user".to_string()
            } else {
                cancel_summary
            };
            RunOutcome::canceled(summary)
        } else if let Some(violation) =
            enforcer.as_ref().and_then(|e| e.violation().map(|v| v.message.clone()))
        {
            // Violation-terminated runs use the 86 convention.
            stdout_text.push_str(&format!("\n{violation}\n"));
            RunOutcome::failed(violation)
        } else {
            match status {
                Ok(status) if status.success() => RunOutcome {
                    summary: "Agent run succeeded".to_string(),
                    success: true,
                    canceled: false,
                },
                Ok(status) => RunOutcome::failed(format!(
                    "Agent failed with exit code {}",
                    status.code().unwrap_or(-1)
                )),
                Err(err) => RunOutcome::failed(format!("Agent invocation error: {err}")),
            }
        };

        self.finish(outcome, stdout_text, stderr_text)
    }

    /// Stash captured output for the attempt block written by `run`.
    fn finish(
        &self,
        outcome: RunOutcome,
        stdout_text: String,
        stderr_text: String,
    ) -> RunOutcome {
        *self.captured.lock() = (stdout_text, stderr_text);
        outcome
    }

    fn append_attempt(
        &self,
        request: &RunRequest,
        outcome: &RunOutcome,
        received_at: &str,
        elapsed: f64,
    ) {
        let (stdout_text, stderr_text) = std::mem::take(&mut *self.captured.lock());
        let status = if outcome.canceled {
            "canceled"
        } else if outcome.success {
            "completed"
        } else {
            "failed"
        };
        let block = AttemptRecord {
            received_at: received_at.to_string(),
            prompt_text: request.prompt_text.clone(),
            context: request.context_text.clone(),
            summary: outcome.summary.clone(),
            status: status.to_string(),
            completed_at: self.clock.timestamp(),
            duration_seconds: Some(elapsed),
            stdout: stdout_text,
            stderr: stderr_text,
        };
        if let Err(err) = block.append_to(&request.log_path) {
            tracing::warn!(prompt_id = %request.prompt_id, error = %err, "failed to append attempt block");
        }
    }

    fn guard_paths(&self, prompt_id: &PromptId) -> GuardPaths {
        GuardPaths {
            status_path: self
                .config
                .guard_dir
                .join(format!("scope_guard_{}.json", prompt_id.suffix())),
            violation_log: self.config.guard_dir.join("scope_violations.log"),
        }
    }

    fn emit(&self, frame: StreamFrame) {
        self.sink.stream_frame(frame);
    }

    fn emit_chunk(&self, prompt_id: &PromptId, stream: StreamName, chunk: String) {
        self.emit(StreamFrame::chunk(prompt_id.clone(), stream, chunk, self.clock.timestamp()));
    }
}

/// Pump one child pipe: buffer the bytes, forward each chunk to the sink,
/// and (stdout only) feed complete lines to the boundary monitor.
async fn pump_stream<R, C>(
    mut reader: R,
    prompt_id: PromptId,
    stream: StreamName,
    sink: Arc<dyn StreamSink>,
    clock: C,
    lines_tx: Option<mpsc::Sender<String>>,
) -> String
where
    R: tokio::io::AsyncRead + Unpin,
    C: Clock,
{
    let mut buffer = String::new();
    let mut line_acc = String::new();
    let mut bytes = [0u8; 8192];
    loop {
        let read = match reader.read(&mut bytes).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        let chunk = String::from_utf8_lossy(&bytes[..read]).to_string();
        buffer.push_str(&chunk);
        sink.stream_frame(StreamFrame::chunk(
            prompt_id.clone(),
            stream,
            chunk.clone(),
            clock.timestamp(),
        ));
        if let Some(tx) = &lines_tx {
            line_acc.push_str(&chunk);
            while let Some(pos) = line_acc.find('\n') {
                let line = line_acc[..pos].to_string();
                line_acc.drain(..=pos);
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        }
    }
    if let (Some(tx), false) = (&lines_tx, line_acc.is_empty()) {
        let _ = tx.send(line_acc.clone()).await;
    }
    buffer
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
