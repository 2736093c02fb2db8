// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dirty-file tracker: snapshots the working tree's interesting paths via
//! git metadata and reports what changed between snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("git command failed: {0}")]
    Git(String),

    #[error("failed to invoke git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Per-file state tuple: existence, mtime, size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileState {
    exists: bool,
    mtime_ns: u128,
    size: u64,
}

const GONE: FileState = FileState { exists: false, mtime_ns: 0, size: 0 };

/// Tracks modified, untracked, and deleted files across scan points.
///
/// The interesting set is the union of paths git reports as modified
/// (`ls-files -m`), untracked-and-not-ignored (`ls-files -o
/// --exclude-standard`), and deleted (`ls-files -d`).
pub struct DirtyFileTracker {
    repo_root: PathBuf,
    state: HashMap<String, FileState>,
}

impl DirtyFileTracker {
    /// Snapshot the current tree as the baseline.
    pub async fn new(repo_root: &Path) -> Result<Self, TrackerError> {
        let mut tracker = Self { repo_root: repo_root.to_path_buf(), state: HashMap::new() };
        tracker.state = tracker.snapshot().await?;
        Ok(tracker)
    }

    /// Paths whose state changed since the last snapshot (appearances and
    /// disappearances included), sorted. Adopts the new snapshot.
    pub async fn scan(&mut self) -> Result<Vec<String>, TrackerError> {
        let new_state = self.snapshot().await?;
        let mut touched: Vec<String> = self
            .state
            .keys()
            .chain(new_state.keys())
            .filter(|path| self.state.get(*path) != new_state.get(*path))
            .cloned()
            .collect();
        touched.sort();
        touched.dedup();
        self.state = new_state;
        Ok(touched)
    }

    /// Adopt the current tree as the new baseline without reporting.
    pub async fn refresh(&mut self) -> Result<(), TrackerError> {
        self.state = self.snapshot().await?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<HashMap<String, FileState>, TrackerError> {
        let modified = self.git_list(&["ls-files", "-m", "-z"]).await?;
        let untracked = self.git_list(&["ls-files", "-o", "--exclude-standard", "-z"]).await?;
        let deleted = self.git_list(&["ls-files", "-d", "-z"]).await?;

        let mut snapshot = HashMap::new();
        for path in modified {
            let state = self.file_state(&path);
            snapshot.insert(path, state);
        }
        for path in untracked {
            if !snapshot.contains_key(&path) {
                let state = self.file_state(&path);
                snapshot.insert(path, state);
            }
        }
        for path in deleted {
            snapshot.insert(path, GONE);
        }
        Ok(snapshot)
    }

    fn file_state(&self, relative: &str) -> FileState {
        match std::fs::metadata(self.repo_root.join(relative)) {
            Ok(meta) => FileState {
                exists: true,
                mtime_ns: meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos())
                    .unwrap_or(0),
                size: meta.len(),
            },
            Err(_) => GONE,
        }
    }

    async fn git_list(&self, args: &[&str]) -> Result<Vec<String>, TrackerError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TrackerError::Git(if stderr.is_empty() {
                "git command failed".to_string()
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.to_string())
            .collect())
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
