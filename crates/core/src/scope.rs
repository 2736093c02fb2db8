// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project scope manifests and repo-relative path classification.
//!
//! A manifest carries three ordered glob lists. Classification order:
//! deny patterns win, then a non-empty allow list must match, then
//! log-only patterns mark a permitted-but-recorded path.

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Classification of a repo-relative path against a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    Allow,
    LogOnly,
    Deny,
}

/// Per-project allow/deny/log-only glob lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeManifest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub log_only: Vec<String>,
}

impl ScopeManifest {
    /// Fallback manifest when a project declares none: the project's own
    /// subtree is allowed, nothing is denied.
    pub fn fallback(project_root: &str) -> Self {
        let root = normalize_path(project_root);
        Self {
            description: String::new(),
            allow: vec![format!("{root}/**")],
            deny: Vec::new(),
            log_only: Vec::new(),
        }
    }

    /// Compile the glob lists for repeated classification.
    ///
    /// Invalid patterns are dropped with a warning rather than failing the
    /// run; an unparseable pattern can never widen the allowed surface.
    pub fn compile(&self) -> CompiledScope {
        CompiledScope {
            allow: compile_patterns(&self.allow),
            deny: compile_patterns(&self.deny),
            log_only: compile_patterns(&self.log_only),
        }
    }
}

/// A manifest with its glob lists parsed.
#[derive(Debug, Clone)]
pub struct CompiledScope {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
    log_only: Vec<Pattern>,
}

impl CompiledScope {
    /// Classify a repo-relative path. Empty paths are denied.
    pub fn classify(&self, relative: &str) -> PathClass {
        let rel = normalize_path(relative);
        if rel.is_empty() {
            return PathClass::Deny;
        }
        if matches_any(&self.deny, &rel) {
            return PathClass::Deny;
        }
        if !self.allow.is_empty() && !matches_any(&self.allow, &rel) {
            return PathClass::Deny;
        }
        if matches_any(&self.log_only, &rel) {
            return PathClass::LogOnly;
        }
        PathClass::Allow
    }

    /// Subset of `paths` that classify as deny, in input order.
    pub fn find_violations<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        paths
            .into_iter()
            .filter(|path| self.classify(path) == PathClass::Deny)
            .map(normalize_path)
            .collect()
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| {
            let cleaned = normalize_path(raw);
            if cleaned.is_empty() {
                return None;
            }
            match Pattern::new(&cleaned) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %raw, error = %err, "dropping invalid scope pattern");
                    None
                }
            }
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], path: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(path))
}

/// Normalize a repo-relative path or pattern: forward slashes only, no
/// leading `./`, trimmed.
pub fn normalize_path(raw: &str) -> String {
    let mut cleaned = raw.trim().replace('\\', "/");
    while let Some(stripped) = cleaned.strip_prefix("./") {
        cleaned = stripped.to_string();
    }
    cleaned
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
