// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-derived daemon configuration.
//!
//! Everything is a `NIGHTSHIFT_*` variable with a sensible default, so a
//! bare `nightshiftd` inside a repo does the right thing.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository the Agent CLI operates on.
    pub repo_root: PathBuf,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub frontend_dir: Option<PathBuf>,
    pub db_path: PathBuf,
    pub daemon_log_path: PathBuf,
    pub lock_path: PathBuf,
    pub guard_dir: PathBuf,

    pub host: String,
    pub port: u16,

    /// Argv for the Agent CLI invocation.
    pub agent_cmd: Vec<String>,

    pub base_branch: String,
    pub branch_prefix: String,
    pub slug_words: usize,
    pub slug_chars: usize,
    pub cleanup_enabled: bool,
    pub allow_dirty: bool,
    pub git_dry_run: bool,
    pub branch_discipline_disabled: bool,

    pub auth_email: String,
    pub auth_password: String,
    pub auth_token: String,

    pub display_enabled: bool,
    pub health_interval: Duration,
    pub take_timeout: Duration,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        let repo_root = env_path("NIGHTSHIFT_REPO_ROOT")
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let data_dir = env_path("NIGHTSHIFT_DATA_DIR").unwrap_or_else(|| repo_root.join("data"));
        let logs_dir = env_path("NIGHTSHIFT_LOGS_DIR").unwrap_or_else(|| repo_root.join("logs"));
        let projects_dir =
            env_path("NIGHTSHIFT_PROJECTS_DIR").unwrap_or_else(|| repo_root.join("projects"));
        let frontend_dir = env_path("NIGHTSHIFT_FRONTEND_DIR").or_else(|| {
            let default = repo_root.join("frontend");
            default.is_dir().then_some(default)
        });

        Self {
            db_path: data_dir.join("prompts.json"),
            daemon_log_path: logs_dir.join("progress.log"),
            lock_path: data_dir.join("nightshiftd.pid"),
            guard_dir: logs_dir.clone(),
            data_dir,
            logs_dir,
            projects_dir,
            frontend_dir,
            repo_root,

            host: env_string("NIGHTSHIFT_HOST", "0.0.0.0"),
            port: env_parse("NIGHTSHIFT_PORT", 8080),

            agent_cmd: env_argv(
                "NIGHTSHIFT_AGENT_CLI",
                &["codex", "exec", "--skip-git-repo-check", "-"],
            ),

            base_branch: env_string("NIGHTSHIFT_GIT_BASE_BRANCH", "dev"),
            branch_prefix: env_string("NIGHTSHIFT_PROMPT_BRANCH_PREFIX", "nightshift/prompt"),
            slug_words: env_parse("NIGHTSHIFT_BRANCH_SLUG_WORDS", ns_core::SLUG_WORDS),
            slug_chars: env_parse("NIGHTSHIFT_BRANCH_SLUG_CHARS", ns_core::SLUG_CHARS),
            cleanup_enabled: env_flag("NIGHTSHIFT_PROMPT_BRANCH_CLEANUP", true),
            allow_dirty: env_flag("NIGHTSHIFT_GIT_ALLOW_DIRTY", false),
            git_dry_run: env_flag("NIGHTSHIFT_GIT_DRY_RUN", false),
            branch_discipline_disabled: env_flag("NIGHTSHIFT_DISABLE_BRANCH_DISCIPLINE", false),

            auth_email: env_string("NIGHTSHIFT_AUTH_EMAIL", "operator@nightshift.local"),
            auth_password: env_string("NIGHTSHIFT_AUTH_PASSWORD", "nightshift"),
            auth_token: std::env::var("NIGHTSHIFT_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty())
                .unwrap_or_else(|| format!("nst-{}", nanoid::nanoid!(19))),

            display_enabled: env_flag("NIGHTSHIFT_EINK_DISPLAY", false),
            health_interval: Duration::from_secs(env_parse("NIGHTSHIFT_HEALTH_INTERVAL_SECS", 10)),
            take_timeout: Duration::from_secs(1),
        }
    }
}

/// Boolean flags accept `1`, `true`, `yes`, and `on`.
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty()).unwrap_or_else(|| {
        default.to_string()
    })
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok()).unwrap_or(default)
}

/// Whitespace-split argv override.
fn env_argv(name: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.split_whitespace().map(|part| part.to_string()).collect()
        }
        _ => default.iter().map(|part| part.to_string()).collect(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
