// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed view of the Human Task side-queue.
//!
//! The side-queue itself is an external collaborator; this glue only
//! feeds the status panel and the health envelope.

use ns_core::{HumanTask, HumanTaskSource};
use serde_json::json;
use std::path::PathBuf;

/// Reads `human_tasks.json` on demand; absence means no tasks.
pub struct FileHumanTasks {
    path: PathBuf,
}

impl FileHumanTasks {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl HumanTaskSource for FileHumanTasks {
    fn list(&self) -> Vec<HumanTask> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn health(&self) -> serde_json::Value {
        let open = self.list().iter().filter(|task| task.status != "done").count();
        json!({ "open": open })
    }
}
