// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-prompt branch lifecycle: begin, finalize, rollback.

use ns_core::slug::{slugify, SLUG_CHARS, SLUG_WORDS};
use std::path::PathBuf;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;

/// Cap for the rollback commit subject line.
const REVERT_SUBJECT_CHARS: usize = 72;

#[derive(Debug, Error)]
pub enum GitBranchError {
    #[error("{0}; run `git init` and create the base branch first")]
    NotARepo(String),

    #[error("{0}")]
    DirtyTree(String),

    #[error("Base branch '{0}' does not exist")]
    MissingBase(String),

    #[error("{0}")]
    Command(String),

    #[error("failed to invoke git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Branch discipline knobs, filled from daemon config.
#[derive(Debug, Clone)]
pub struct GitConfig {
    pub repo_root: PathBuf,
    pub base_branch: String,
    pub branch_prefix: String,
    pub slug_words: usize,
    pub slug_chars: usize,
    pub cleanup_enabled: bool,
    pub allow_dirty: bool,
    pub dry_run: bool,
    pub disabled: bool,
}

impl GitConfig {
    pub fn new(repo_root: PathBuf) -> Self {
        Self {
            repo_root,
            base_branch: "dev".to_string(),
            branch_prefix: "nightshift/prompt".to_string(),
            slug_words: SLUG_WORDS,
            slug_chars: SLUG_CHARS,
            cleanup_enabled: true,
            allow_dirty: false,
            dry_run: false,
            disabled: false,
        }
    }
}

/// One prompt attempt's branch plus the metadata needed to clean it up.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSession {
    pub branch_name: String,
    pub slug: String,
    pub base_branch: String,
    pub base_sha: String,
    pub notes: Vec<String>,
}

/// What a finalize brought back to the base branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupResult {
    /// Base head before the merge.
    pub base_sha: String,
    /// Base head after the merge (None when there was nothing to merge).
    pub merged_sha: Option<String>,
    /// Commits brought in by the merge, commit-date ascending.
    pub commits: Vec<String>,
    pub notes: Vec<String>,
}

/// Outcome of a rollback commit.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackResult {
    pub revert_commit: String,
    pub notes: Vec<String>,
}

/// Creates per-prompt git branches and cleans them up after runs.
pub struct BranchDiscipline {
    config: GitConfig,
}

impl BranchDiscipline {
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Branch name and slug for a prompt.
    pub fn branch_name(&self, prompt_id: &str, prompt_text: &str) -> (String, String) {
        let slug = slugify(prompt_text, self.config.slug_words, self.config.slug_chars);
        (format!("{}-{}-{}", self.config.branch_prefix, prompt_id, slug), slug)
    }

    /// Fork a fresh prompt branch off the base branch.
    ///
    /// Fails when the root is not a git work tree, when the tree is dirty
    /// (unless explicitly allowed), or when the base branch is missing. A
    /// stale branch with the target name is deleted first.
    pub async fn begin_run(
        &self,
        prompt_id: &str,
        prompt_text: &str,
    ) -> Result<Option<BranchSession>, GitBranchError> {
        if self.config.disabled {
            return Ok(None);
        }
        self.ensure_git_repo().await?;
        if !self.config.allow_dirty && self.workspace_dirty().await? {
            return Err(GitBranchError::DirtyTree(
                "Working tree has uncommitted changes; finish or reset the previous prompt first"
                    .to_string(),
            ));
        }
        let (branch_name, slug) = self.branch_name(prompt_id, prompt_text);
        tracing::info!(
            branch = %branch_name,
            base = %self.config.base_branch,
            "preparing prompt branch"
        );
        let base_sha = self.rev_parse(&self.config.base_branch).await.map_err(|_| {
            GitBranchError::MissingBase(self.config.base_branch.clone())
        })?;
        let mut notes = Vec::new();
        self.git_mutating(&["switch", &self.config.base_branch]).await?;
        if self.branch_exists(&branch_name).await {
            self.git_mutating(&["branch", "-D", &branch_name]).await?;
            notes.push(format!("Removed stale branch {branch_name}"));
        }
        self.git_mutating(&["switch", "-C", &branch_name, &self.config.base_branch]).await?;
        notes.push(format!("Checked out {branch_name} from {}", self.config.base_branch));
        Ok(Some(BranchSession {
            branch_name,
            slug,
            base_branch: self.config.base_branch.clone(),
            base_sha,
            notes,
        }))
    }

    /// Fast-forward the base branch over the prompt branch and delete it.
    ///
    /// A non-fast-forwardable merge fails the call and leaves the branch
    /// intact for operator inspection.
    pub async fn finalize_run(
        &self,
        session: &BranchSession,
    ) -> Result<Option<CleanupResult>, GitBranchError> {
        if self.config.disabled {
            return Ok(None);
        }
        if !self.config.cleanup_enabled {
            return Ok(Some(CleanupResult {
                notes: vec![format!(
                    "Cleanup disabled by config; leaving {} checked out",
                    session.branch_name
                )],
                ..Default::default()
            }));
        }
        if self.workspace_dirty().await? {
            return Err(GitBranchError::DirtyTree(format!(
                "Cannot clean up {}; working tree has uncommitted changes or pending merges",
                session.branch_name
            )));
        }
        self.git_mutating(&["switch", &session.base_branch]).await?;
        let base_sha = self.rev_parse("HEAD").await?;
        if !self.branch_exists(&session.branch_name).await {
            return Ok(Some(CleanupResult {
                base_sha,
                merged_sha: None,
                commits: Vec::new(),
                notes: vec![format!(
                    "Branch {} no longer exists; nothing to merge",
                    session.branch_name
                )],
            }));
        }
        self.git_mutating(&["merge", "--ff-only", &session.branch_name]).await?;
        let merged_sha = self.rev_parse("HEAD").await?;
        let commits = self.commits_between(&base_sha, &merged_sha).await?;
        self.git_mutating(&["branch", "-D", &session.branch_name]).await?;
        let notes = vec![format!(
            "Merged {} into {} ({} commits); branch deleted",
            session.branch_name,
            session.base_branch,
            commits.len()
        )];
        Ok(Some(CleanupResult { base_sha, merged_sha: Some(merged_sha), commits, notes }))
    }

    /// Revert the commits a prior finalize merged, newest first, as one
    /// rollback commit on the base branch.
    pub async fn rollback(
        &self,
        prompt_id: &str,
        prompt_text: &str,
        commits: &[String],
    ) -> Result<Option<RollbackResult>, GitBranchError> {
        if self.config.disabled {
            return Ok(None);
        }
        if commits.is_empty() {
            return Ok(Some(RollbackResult {
                revert_commit: String::new(),
                notes: vec!["No commits to revert".to_string()],
            }));
        }
        self.git_mutating(&["switch", &self.config.base_branch]).await?;
        for sha in commits.iter().rev() {
            if let Err(err) = self.git_mutating(&["revert", "--no-commit", sha]).await {
                // Abort the half-applied revert before surfacing the error.
                let _ = self.git_mutating(&["revert", "--abort"]).await;
                return Err(err);
            }
        }
        let slug = slugify(prompt_text, self.config.slug_words, self.config.slug_chars);
        let mut subject = format!("Revert prompt {prompt_id}: {slug}");
        subject.truncate(REVERT_SUBJECT_CHARS);
        self.git_mutating(&["commit", "-m", &subject]).await?;
        let revert_commit = self.rev_parse("HEAD").await?;
        Ok(Some(RollbackResult {
            revert_commit,
            notes: vec![format!("Reverted {} commits on {}", commits.len(), self.config.base_branch)],
        }))
    }

    // ------------------------------------------------------------------
    // git plumbing
    // ------------------------------------------------------------------

    async fn ensure_git_repo(&self) -> Result<(), GitBranchError> {
        let output = self
            .git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|err| GitBranchError::NotARepo(err.to_string()))?;
        if stdout_text(&output).trim() != "true" {
            return Err(GitBranchError::NotARepo(
                "Repository root is not a git work tree".to_string(),
            ));
        }
        Ok(())
    }

    async fn workspace_dirty(&self) -> Result<bool, GitBranchError> {
        let output = self.git(&["status", "--porcelain"]).await?;
        Ok(!stdout_text(&output).trim().is_empty())
    }

    async fn branch_exists(&self, branch: &str) -> bool {
        self.rev_parse(branch).await.is_ok()
    }

    async fn rev_parse(&self, rev: &str) -> Result<String, GitBranchError> {
        let output = self.git(&["rev-parse", "--verify", rev]).await?;
        Ok(stdout_text(&output).trim().to_string())
    }

    async fn commits_between(
        &self,
        base_sha: &str,
        merged_sha: &str,
    ) -> Result<Vec<String>, GitBranchError> {
        let range = format!("{base_sha}..{merged_sha}");
        let output = self.git(&["rev-list", "--reverse", &range]).await?;
        Ok(stdout_text(&output).lines().map(|line| line.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Run a mutating git command; in dry-run mode, log and skip it.
    async fn git_mutating(&self, args: &[&str]) -> Result<(), GitBranchError> {
        if self.config.dry_run {
            tracing::info!(command = %format!("git {}", args.join(" ")), "[dry-run] skipping mutation");
            return Ok(());
        }
        self.git(args).await.map(|_| ())
    }

    async fn git(&self, args: &[&str]) -> Result<Output, GitBranchError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.config.repo_root)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = stdout_text(&output).trim().to_string();
            let message = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                format!("git {} failed with status {}", args.join(" "), output.status)
            };
            return Err(GitBranchError::Command(message));
        }
        Ok(output)
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[cfg(test)]
#[path = "discipline_tests.rs"]
mod tests;
