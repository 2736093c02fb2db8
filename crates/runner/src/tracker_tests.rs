// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

async fn git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
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

async fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    git(repo, &["init"]).await;
    git(repo, &["config", "user.email", "nightshift@test"]).await;
    git(repo, &["config", "user.name", "nightshift"]).await;
    std::fs::write(repo.join("tracked.txt"), "original\n").unwrap();
    git(repo, &["add", "."]).await;
    git(repo, &["commit", "-m", "seed"]).await;
    dir
}

#[tokio::test]
async fn clean_tree_scans_empty() {
    let dir = init_repo().await;
    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();
    assert!(tracker.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn modified_file_is_reported_once() {
    let dir = init_repo().await;
    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();

    std::fs::write(dir.path().join("tracked.txt"), "changed\n").unwrap();
    assert_eq!(tracker.scan().await.unwrap(), vec!["tracked.txt".to_string()]);
    // The scan adopted the new snapshot; nothing further to report
    assert!(tracker.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn untracked_file_appears_and_disappears() {
    let dir = init_repo().await;
    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();

    std::fs::write(dir.path().join("fresh.txt"), "new\n").unwrap();
    assert_eq!(tracker.scan().await.unwrap(), vec!["fresh.txt".to_string()]);

    std::fs::remove_file(dir.path().join("fresh.txt")).unwrap();
    assert_eq!(tracker.scan().await.unwrap(), vec!["fresh.txt".to_string()]);
}

#[tokio::test]
async fn deleted_tracked_file_is_reported() {
    let dir = init_repo().await;
    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();

    std::fs::remove_file(dir.path().join("tracked.txt")).unwrap();
    assert_eq!(tracker.scan().await.unwrap(), vec!["tracked.txt".to_string()]);
}

#[tokio::test]
async fn refresh_adopts_without_reporting() {
    let dir = init_repo().await;
    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();

    std::fs::write(dir.path().join("quiet.txt"), "x\n").unwrap();
    tracker.refresh().await.unwrap();
    assert!(tracker.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn ignored_files_are_not_interesting() {
    let dir = init_repo().await;
    std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
    git(dir.path(), &["add", ".gitignore"]).await;
    git(dir.path(), &["commit", "-m", "ignore logs"]).await;

    let mut tracker = DirtyFileTracker::new(dir.path()).await.unwrap();
    std::fs::write(dir.path().join("noise.log"), "ignored\n").unwrap();
    assert!(tracker.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_repo_fails_with_tracker_error() {
    let dir = TempDir::new().unwrap();
    let err = DirtyFileTracker::new(dir.path()).await.err().unwrap();
    assert!(matches!(err, TrackerError::Git(_)));
}
