// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Violation bookkeeping: audit log, status file, and reverts.

use ns_core::scope::{normalize_path, CompiledScope};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Audit file locations for one guarded run.
#[derive(Debug, Clone)]
pub struct GuardPaths {
    /// Single JSON object describing the latest violation (overwritten).
    pub status_path: PathBuf,
    /// One JSON object per offending path, appended across runs.
    pub violation_log: PathBuf,
}

/// What a declared violation looked like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationInfo {
    pub timestamp: String,
    pub prompt_id: String,
    pub project_id: String,
    pub paths: Vec<String>,
    pub message: String,
    pub command: String,
}

/// One line of the violation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ViolationLine {
    timestamp: String,
    prompt_id: String,
    project_id: String,
    path: String,
    command: String,
}

/// Classifies changed paths against the active manifest and records the
/// first violation. Later boundaries are ignored once violated; the child
/// is already terminating.
pub struct ScopeEnforcer {
    repo_root: PathBuf,
    scope: CompiledScope,
    prompt_id: String,
    project_id: String,
    paths: GuardPaths,
    violation: Option<ViolationInfo>,
}

impl ScopeEnforcer {
    pub fn new(
        repo_root: &Path,
        scope: CompiledScope,
        prompt_id: &str,
        project_id: &str,
        paths: GuardPaths,
    ) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            scope,
            prompt_id: prompt_id.to_string(),
            project_id: project_id.to_string(),
            paths,
            violation: None,
        }
    }

    pub fn violated(&self) -> bool {
        self.violation.is_some()
    }

    pub fn violation(&self) -> Option<&ViolationInfo> {
        self.violation.as_ref()
    }

    /// Denied subset of `changed`, normalized, in input order.
    pub fn find_violations<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        self.scope.find_violations(changed)
    }

    /// Declare a violation: audit it, revert the offending paths, and
    /// return the operator-facing message.
    pub async fn handle_violation(
        &mut self,
        command: &str,
        offending: Vec<String>,
        timestamp: String,
    ) -> String {
        if let Some(existing) = &self.violation {
            return existing.message.clone();
        }
        let paths: Vec<String> = offending.iter().map(|p| normalize_path(p)).collect();
        let message =
            format!("Scope guard blocked {command} touching disallowed paths: {}", paths.join(", "));
        let info = ViolationInfo {
            timestamp: timestamp.clone(),
            prompt_id: self.prompt_id.clone(),
            project_id: self.project_id.clone(),
            paths: paths.clone(),
            message: message.clone(),
            command: command.to_string(),
        };
        self.append_violation_log(&info);
        self.write_status_file(&info);
        self.violation = Some(info);
        self.revert_paths(&paths).await;
        message
    }

    /// Record a guard-infrastructure failure (tracker broke mid-run).
    pub fn handle_guard_failure(&mut self, reason: &str, timestamp: String) -> String {
        if let Some(existing) = &self.violation {
            return existing.message.clone();
        }
        let reason = reason.trim();
        let message = format!(
            "Scope guard error: {}",
            if reason.is_empty() { "unknown failure" } else { reason }
        );
        let info = ViolationInfo {
            timestamp,
            prompt_id: self.prompt_id.clone(),
            project_id: self.project_id.clone(),
            paths: Vec::new(),
            message: message.clone(),
            command: "<guard>".to_string(),
        };
        self.write_status_file(&info);
        self.violation = Some(info);
        message
    }

    /// Remove a stale status file from a previous run. Called at run start
    /// so a surviving file always refers to the latest violation.
    pub fn clear_status_file(&self) {
        let _ = std::fs::remove_file(&self.paths.status_path);
    }

    // Audit writes are best-effort telemetry; errors are swallowed.

    fn append_violation_log(&self, info: &ViolationInfo) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.paths.violation_log.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut lines = String::new();
            for path in &info.paths {
                let line = ViolationLine {
                    timestamp: info.timestamp.clone(),
                    prompt_id: info.prompt_id.clone(),
                    project_id: info.project_id.clone(),
                    path: path.clone(),
                    command: info.command.clone(),
                };
                if let Ok(encoded) = serde_json::to_string(&line) {
                    lines.push_str(&encoded);
                    lines.push('\n');
                }
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.paths.violation_log)?;
            file.write_all(lines.as_bytes())
        };
        if let Err(err) = write() {
            tracing::warn!(error = %err, "failed to append scope violation log");
        }
    }

    fn write_status_file(&self, info: &ViolationInfo) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.paths.status_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut encoded = serde_json::to_string_pretty(info).unwrap_or_default();
            encoded.push('\n');
            std::fs::write(&self.paths.status_path, encoded)
        };
        if let Err(err) = write() {
            tracing::warn!(error = %err, "failed to write scope guard status file");
        }
    }

    /// Restore each offending path, preferring `git checkout -- <path>` and
    /// falling back to deletion for freshly created paths.
    async fn revert_paths(&self, paths: &[String]) {
        for path in paths {
            if self.restore_with_git(path).await {
                continue;
            }
            self.delete_path(path).await;
        }
    }

    async fn restore_with_git(&self, relative: &str) -> bool {
        Command::new("git")
            .args(["checkout", "--", relative])
            .current_dir(&self.repo_root)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn delete_path(&self, relative: &str) {
        let target = self.repo_root.join(relative);
        let result = match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await,
            Ok(_) => tokio::fs::remove_file(&target).await,
            Err(_) => return,
        };
        if let Err(err) = result {
            tracing::warn!(path = %target.display(), error = %err, "failed to revert path");
        }
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
