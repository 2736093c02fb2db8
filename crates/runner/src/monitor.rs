// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-boundary monitor: scans the tree after each Agent CLI step.
//!
//! The Agent CLI prints `<command> exited <code> in <duration>ms:` on
//! stdout whenever it completes a shell or patch step. The monitor owns
//! the dirty-file tracker, reads parsed stdout lines from a bounded
//! channel, and runs the scan-and-enforce cycle at each marker.

use crate::guard::ScopeEnforcer;
use crate::tracker::DirtyFileTracker;
use ns_core::clock::Clock;
use ns_core::event::{StreamFrame, StreamName, StreamSink};
use ns_core::PromptId;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;
use tokio::sync::mpsc;

#[allow(clippy::expect_used)]
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<command>.+?) exited (?P<code>-?\d+) in (?P<duration>[0-9.]+)ms:")
        .expect("constant regex pattern is valid")
});

/// Extract the command from a boundary marker line, if it is one.
pub fn boundary_command(line: &str) -> Option<String> {
    BOUNDARY_RE
        .captures(line.trim())
        .and_then(|captures| captures.name("command"))
        .map(|m| m.as_str().to_string())
}

/// Terminate request sent when a violation fires mid-run.
pub trait TerminateChild: Send + Sync {
    fn terminate(&self);
}

/// Owns the tracker and enforcer for one guarded run.
pub struct CommandMonitor<C: Clock> {
    tracker: DirtyFileTracker,
    enforcer: ScopeEnforcer,
    terminator: Arc<dyn TerminateChild>,
    sink: Arc<dyn StreamSink>,
    prompt_id: PromptId,
    clock: C,
}

impl<C: Clock> CommandMonitor<C> {
    pub fn new(
        tracker: DirtyFileTracker,
        enforcer: ScopeEnforcer,
        terminator: Arc<dyn TerminateChild>,
        sink: Arc<dyn StreamSink>,
        prompt_id: PromptId,
        clock: C,
    ) -> Self {
        Self { tracker, enforcer, terminator, sink, prompt_id, clock }
    }

    /// Consume stdout lines until the channel closes; return the enforcer
    /// so the supervisor can read the violation outcome.
    pub async fn run(mut self, mut lines: mpsc::Receiver<String>) -> ScopeEnforcer {
        while let Some(line) = lines.recv().await {
            // Once violated, the child is terminating; drain and ignore.
            if self.enforcer.violated() {
                continue;
            }
            let Some(command) = boundary_command(&line) else {
                continue;
            };
            self.scan_at_boundary(&command).await;
        }
        self.enforcer
    }

    async fn scan_at_boundary(&mut self, command: &str) {
        let changed = match self.tracker.scan().await {
            Ok(changed) => changed,
            Err(err) => {
                let message =
                    self.enforcer.handle_guard_failure(&err.to_string(), self.clock.timestamp());
                self.surface(message);
                self.terminator.terminate();
                return;
            }
        };
        if changed.is_empty() {
            return;
        }
        let offending = self.enforcer.find_violations(changed.iter().map(String::as_str));
        if offending.is_empty() {
            // Allowed or log-only changes are the new baseline; the scan
            // already adopted them.
            return;
        }
        let message =
            self.enforcer.handle_violation(command, offending, self.clock.timestamp()).await;
        self.surface(message);
        self.terminator.terminate();
        let _ = self.tracker.refresh().await;
    }

    /// Print the violation message on the guard's stdout stream.
    fn surface(&self, message: String) {
        tracing::warn!(prompt_id = %self.prompt_id, "{message}");
        self.sink.stream_frame(StreamFrame::chunk(
            self.prompt_id.clone(),
            StreamName::Stdout,
            format!("{message}\n"),
            self.clock.timestamp(),
        ));
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
