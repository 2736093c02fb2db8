// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-backed project registry.
//!
//! Each subdirectory of the projects dir is a project: `project.json`
//! holds metadata and an optional scope manifest, a context file carries
//! the prompt guidance. A shared `agents.md` at the repo root applies to
//! every project.

use ns_core::{ProjectPayload, ProjectRegistry, ScopeManifest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct ProjectMetadata {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "contextFile")]
    context_file: Option<String>,
    #[serde(default, alias = "launchPath", alias = "launchUrl")]
    launch_path: Option<String>,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    scope: Option<ScopeManifest>,
}

#[derive(Debug, Clone)]
struct ProjectDefinition {
    id: String,
    name: String,
    description: String,
    context_path: Option<PathBuf>,
    launch_path: Option<String>,
    scope: Option<ScopeManifest>,
    /// Repo-relative root used by the fallback manifest.
    relative_root: String,
}

impl ProjectDefinition {
    fn payload(&self) -> ProjectPayload {
        ProjectPayload {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            launch_url: self.launch_path.clone(),
        }
    }

    fn read_context(&self) -> String {
        self.context_path
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .unwrap_or_default()
    }
}

/// Registry loaded from `projects/<id>/project.json` directories.
pub struct DirRegistry {
    repo_root: PathBuf,
    projects: BTreeMap<String, ProjectDefinition>,
    default_id: Option<String>,
}

impl DirRegistry {
    pub fn load(repo_root: &Path, projects_dir: &Path, preferred_default: Option<&str>) -> Self {
        let mut projects = BTreeMap::new();
        let mut default_id = None;

        let entries = std::fs::read_dir(projects_dir)
            .map(|dir| {
                let mut dirs: Vec<PathBuf> = dir
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_dir())
                    .collect();
                dirs.sort();
                dirs
            })
            .unwrap_or_default();

        for directory in entries {
            let metadata = read_metadata(&directory);
            let dir_name = directory
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let id = metadata.id.clone().unwrap_or_else(|| dir_name.clone());
            let id = id.trim().to_string();
            if id.is_empty() {
                continue;
            }
            let context_file =
                metadata.context_file.clone().unwrap_or_else(|| "context.md".to_string());
            let relative_root = directory
                .strip_prefix(repo_root)
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| format!("projects/{dir_name}"));
            let definition = ProjectDefinition {
                name: metadata.name.clone().filter(|n| !n.trim().is_empty()).unwrap_or_else(|| id.clone()),
                description: metadata.description.clone().unwrap_or_default().trim().to_string(),
                context_path: (!context_file.trim().is_empty())
                    .then(|| directory.join(context_file.trim())),
                launch_path: metadata.launch_path.clone(),
                scope: metadata.scope,
                relative_root,
                id: id.clone(),
            };
            if metadata.default {
                default_id = Some(id.clone());
            }
            projects.insert(id, definition);
        }

        if let Some(preferred) = preferred_default {
            if projects.contains_key(preferred) {
                default_id = Some(preferred.to_string());
            }
        }
        if default_id.is_none() {
            default_id = projects.keys().next().cloned();
        }

        Self { repo_root: repo_root.to_path_buf(), projects, default_id }
    }

    fn definition(&self, project_id: Option<&str>) -> Option<&ProjectDefinition> {
        match project_id {
            Some(id) if self.projects.contains_key(id) => self.projects.get(id),
            _ => self.default_id.as_deref().and_then(|id| self.projects.get(id)),
        }
    }

    fn shared_context(&self) -> String {
        std::fs::read_to_string(self.repo_root.join("agents.md")).unwrap_or_default()
    }
}

fn read_metadata(directory: &Path) -> ProjectMetadata {
    let path = directory.join("project.json");
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

impl ProjectRegistry for DirRegistry {
    fn resolve(&self, project_id: Option<&str>) -> Option<String> {
        match project_id {
            Some(id) if self.projects.contains_key(id) => Some(id.to_string()),
            _ => self.default_id.clone(),
        }
    }

    fn payload(&self, project_id: Option<&str>) -> Option<ProjectPayload> {
        self.definition(project_id).map(ProjectDefinition::payload)
    }

    /// Project header, project context, then the shared guidance,
    /// separated by rules.
    fn context_for(&self, project_id: Option<&str>) -> String {
        let Some(project) = self.definition(project_id) else {
            return self.shared_context();
        };
        let mut header = format!("Project focus: {}", project.name);
        if !project.description.is_empty() {
            header.push('\n');
            header.push_str(&project.description);
        }
        let mut sections = vec![header];
        let project_context = project.read_context().trim().to_string();
        if !project_context.is_empty() {
            sections.push(project_context);
        }
        let shared = self.shared_context().trim().to_string();
        if !shared.is_empty() {
            sections.push(format!("Shared agent guidance:\n{shared}"));
        }
        sections.join("\n\n---\n\n")
    }

    fn scope_for(&self, project_id: Option<&str>) -> ScopeManifest {
        match self.definition(project_id) {
            Some(project) => match &project.scope {
                Some(manifest) => manifest.clone(),
                None => ScopeManifest::fallback(&project.relative_root),
            },
            None => ScopeManifest::default(),
        }
    }

    fn list(&self) -> Vec<ProjectPayload> {
        self.projects.values().map(ProjectDefinition::payload).collect()
    }

    fn default_project_id(&self) -> Option<String> {
        self.default_id.clone()
    }
}

#[cfg(test)]
#[path = "projects_tests.rs"]
mod tests;
