// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;
use tempfile::TempDir;

async fn git(repo: &Path, args: &[&str]) {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .await
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

async fn git_stdout(repo: &Path, args: &[&str]) -> String {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .unwrap();
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Fresh repo with one commit on a `dev` base branch.
async fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    git(repo, &["init"]).await;
    git(repo, &["config", "user.email", "nightshift@test"]).await;
    git(repo, &["config", "user.name", "nightshift"]).await;
    git(repo, &["config", "commit.gpgsign", "false"]).await;
    std::fs::write(repo.join("README.md"), "seed\n").unwrap();
    git(repo, &["add", "."]).await;
    git(repo, &["commit", "-m", "seed"]).await;
    git(repo, &["switch", "-c", "dev"]).await;
    dir
}

fn discipline(repo: &Path) -> BranchDiscipline {
    BranchDiscipline::new(GitConfig::new(repo.to_path_buf()))
}

#[test]
fn branch_name_embeds_id_and_slug() {
    let config = GitConfig::new("/tmp".into());
    let d = BranchDiscipline::new(config);
    let (name, slug) = d.branch_name("pr-abc", "Add CHANGELOG entry");
    assert_eq!(name, "nightshift/prompt-pr-abc-add-changelog-entry");
    assert_eq!(slug, "add-changelog-entry");

    let (name, slug) = d.branch_name("pr-abc", "!!!");
    assert_eq!(slug, "update");
    assert!(name.ends_with("-update"));
}

#[tokio::test]
async fn begin_run_creates_branch_off_base() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let session = d.begin_run("pr-1", "do the thing").await.unwrap().unwrap();
    assert_eq!(session.base_branch, "dev");
    assert_eq!(session.branch_name, "nightshift/prompt-pr-1-do-the-thing");
    assert!(!session.base_sha.is_empty());

    let head = git_stdout(dir.path(), &["branch", "--show-current"]).await;
    assert_eq!(head, session.branch_name);
}

#[tokio::test]
async fn begin_run_rejects_dirty_tree() {
    let dir = init_repo().await;
    std::fs::write(dir.path().join("README.md"), "dirty\n").unwrap();

    let d = discipline(dir.path());
    let err = d.begin_run("pr-1", "text").await.unwrap_err();
    assert!(matches!(err, GitBranchError::DirtyTree(_)));
}

#[tokio::test]
async fn begin_run_allows_dirty_when_configured() {
    let dir = init_repo().await;
    std::fs::write(dir.path().join("untracked.txt"), "x\n").unwrap();

    let mut config = GitConfig::new(dir.path().to_path_buf());
    config.allow_dirty = true;
    let d = BranchDiscipline::new(config);
    assert!(d.begin_run("pr-1", "text").await.unwrap().is_some());
}

#[tokio::test]
async fn begin_run_requires_base_branch() {
    let dir = init_repo().await;
    let mut config = GitConfig::new(dir.path().to_path_buf());
    config.base_branch = "missing-base".to_string();
    let d = BranchDiscipline::new(config);

    let err = d.begin_run("pr-1", "text").await.unwrap_err();
    assert!(matches!(err, GitBranchError::MissingBase(_)));
}

#[tokio::test]
async fn begin_run_requires_git_repo() {
    let dir = TempDir::new().unwrap();
    let d = discipline(dir.path());
    let err = d.begin_run("pr-1", "text").await.unwrap_err();
    assert!(matches!(err, GitBranchError::NotARepo(_)));
}

#[tokio::test]
async fn begin_run_deletes_stale_branch() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let first = d.begin_run("pr-1", "same text").await.unwrap().unwrap();
    git(dir.path(), &["switch", "dev"]).await;

    let second = d.begin_run("pr-1", "same text").await.unwrap().unwrap();
    assert_eq!(first.branch_name, second.branch_name);
    assert!(second.notes.iter().any(|n| n.contains("Removed stale branch")));
}

#[tokio::test]
async fn finalize_fast_forwards_and_reports_commits() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let session = d.begin_run("pr-1", "two commits").await.unwrap().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a\n").unwrap();
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-m", "first"]).await;
    std::fs::write(dir.path().join("b.txt"), "b\n").unwrap();
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-m", "second"]).await;

    let cleanup = d.finalize_run(&session).await.unwrap().unwrap();
    assert_eq!(cleanup.commits.len(), 2);
    assert_eq!(cleanup.base_sha, session.base_sha);
    assert!(cleanup.merged_sha.is_some());

    // Branch is gone, dev holds the work
    let head = git_stdout(dir.path(), &["branch", "--show-current"]).await;
    assert_eq!(head, "dev");
    assert!(dir.path().join("b.txt").exists());
    let branches = git_stdout(dir.path(), &["branch", "--list", &session.branch_name]).await;
    assert!(branches.is_empty());

    // Commits are ascending: first commit listed before second
    let first_subject =
        git_stdout(dir.path(), &["log", "-1", "--format=%s", &cleanup.commits[0]]).await;
    assert_eq!(first_subject, "first");
}

#[tokio::test]
async fn finalize_missing_branch_is_a_note() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let session = d.begin_run("pr-1", "gone").await.unwrap().unwrap();
    git(dir.path(), &["switch", "dev"]).await;
    git(dir.path(), &["branch", "-D", &session.branch_name]).await;

    let cleanup = d.finalize_run(&session).await.unwrap().unwrap();
    assert!(cleanup.commits.is_empty());
    assert!(cleanup.merged_sha.is_none());
    assert!(cleanup.notes.iter().any(|n| n.contains("no longer exists")));
}

#[tokio::test]
async fn finalize_refuses_non_fast_forward_and_keeps_branch() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let session = d.begin_run("pr-1", "diverge").await.unwrap().unwrap();
    std::fs::write(dir.path().join("branch.txt"), "b\n").unwrap();
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-m", "on branch"]).await;

    // Advance dev independently so the merge cannot fast-forward
    git(dir.path(), &["switch", "dev"]).await;
    std::fs::write(dir.path().join("dev.txt"), "d\n").unwrap();
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-m", "on dev"]).await;
    git(dir.path(), &["switch", &session.branch_name]).await;

    let err = d.finalize_run(&session).await.unwrap_err();
    assert!(matches!(err, GitBranchError::Command(_)));
    let branches = git_stdout(dir.path(), &["branch", "--list", &session.branch_name]).await;
    assert!(!branches.is_empty());
}

#[tokio::test]
async fn rollback_reverts_merged_commits_in_one_commit() {
    let dir = init_repo().await;
    let d = discipline(dir.path());

    let session = d.begin_run("pr-1", "make changes").await.unwrap().unwrap();
    std::fs::write(dir.path().join("feature.txt"), "v1\n").unwrap();
    git(dir.path(), &["add", "."]).await;
    git(dir.path(), &["commit", "-m", "add feature"]).await;
    let cleanup = d.finalize_run(&session).await.unwrap().unwrap();

    let rollback = d.rollback("pr-1", "make changes", &cleanup.commits).await.unwrap().unwrap();
    assert!(!rollback.revert_commit.is_empty());

    let subject = git_stdout(dir.path(), &["log", "-1", "--format=%s"]).await;
    assert!(subject.starts_with("Revert prompt pr-1: make-changes"));
    assert!(!dir.path().join("feature.txt").exists());
}

#[tokio::test]
async fn disabled_discipline_is_a_no_op() {
    let dir = TempDir::new().unwrap(); // not even a repo
    let mut config = GitConfig::new(dir.path().to_path_buf());
    config.disabled = true;
    let d = BranchDiscipline::new(config);

    assert!(d.begin_run("pr-1", "text").await.unwrap().is_none());
    assert!(d.rollback("pr-1", "text", &["sha".to_string()]).await.unwrap().is_none());
}

#[tokio::test]
async fn dry_run_skips_mutations() {
    let dir = init_repo().await;
    let mut config = GitConfig::new(dir.path().to_path_buf());
    config.dry_run = true;
    let d = BranchDiscipline::new(config);

    let session = d.begin_run("pr-1", "dry run").await.unwrap().unwrap();
    // No branch was actually created; read-only queries still ran
    let head = git_stdout(dir.path(), &["branch", "--show-current"]).await;
    assert_eq!(head, "dev");
    assert!(!session.base_sha.is_empty());
}
