// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seams to the excluded collaborators: project registry and human tasks.
//!
//! The worker and hub consume these traits; concrete implementations live
//! in the daemon crate (directory-backed registry) or outside the core
//! entirely.

use crate::scope::ScopeManifest;
use serde::{Deserialize, Serialize};

/// Project fields attached to prompt payloads at broadcast time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_url: Option<String>,
}

/// Registry of projects a prompt may target.
pub trait ProjectRegistry: Send + Sync {
    /// Resolve a requested project id to a known one (or the default).
    fn resolve(&self, project_id: Option<&str>) -> Option<String>;

    /// Broadcast payload for a project, if known.
    fn payload(&self, project_id: Option<&str>) -> Option<ProjectPayload>;

    /// Compose the context text handed to the Agent CLI for a project.
    fn context_for(&self, project_id: Option<&str>) -> String;

    /// Active scope manifest for a project (fallback manifest if none is
    /// declared).
    fn scope_for(&self, project_id: Option<&str>) -> ScopeManifest;

    /// All projects, for the unauthenticated project listing.
    fn list(&self) -> Vec<ProjectPayload>;

    fn default_project_id(&self) -> Option<String>;
}

/// Entry in the Human Task side-queue, as far as the core cares: enough to
/// render the status panel and health counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanTask {
    pub id: String,
    pub title: String,
    pub status: String,
    pub created_at: String,
}

/// Read-only view of the Human Task side-queue.
pub trait HumanTaskSource: Send + Sync {
    fn list(&self) -> Vec<HumanTask>;

    /// Summary merged into health envelopes.
    fn health(&self) -> serde_json::Value;
}

/// Registry with no projects (tests, bare installs).
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRegistry;

impl ProjectRegistry for EmptyRegistry {
    fn resolve(&self, _project_id: Option<&str>) -> Option<String> {
        None
    }

    fn payload(&self, _project_id: Option<&str>) -> Option<ProjectPayload> {
        None
    }

    fn context_for(&self, _project_id: Option<&str>) -> String {
        String::new()
    }

    fn scope_for(&self, _project_id: Option<&str>) -> ScopeManifest {
        ScopeManifest::default()
    }

    fn list(&self) -> Vec<ProjectPayload> {
        Vec::new()
    }

    fn default_project_id(&self) -> Option<String> {
        None
    }
}

/// Task source with no tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHumanTasks;

impl HumanTaskSource for NoHumanTasks {
    fn list(&self) -> Vec<HumanTask> {
        Vec::new()
    }

    fn health(&self) -> serde_json::Value {
        serde_json::json!({ "open": 0 })
    }
}
