// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::guard::GuardPaths;
use ns_core::event::NullSink;
use ns_core::{FakeClock, ScopeManifest};
use parking_lot::Mutex;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;

#[yare::parameterized(
    shell_step   = { "sh -c 'touch x' exited 0 in 12.5ms:", Some("sh -c 'touch x'") },
    patch_step   = { "apply_patch exited 0 in 3ms:", Some("apply_patch") },
    negative     = { "cmd exited -15 in 1ms:", Some("cmd") },
    padded       = { "  cmd exited 0 in 1ms:  ", Some("cmd") },
    plain_output = { "building the project...", None },
    no_colon     = { "cmd exited 0 in 3ms", None },
)]
fn boundary_detection(line: &str, expected: Option<&str>) {
    assert_eq!(boundary_command(line).as_deref(), expected);
}

struct FlagTerminator(Arc<Mutex<bool>>);

impl TerminateChild for FlagTerminator {
    fn terminate(&self) {
        *self.0.lock() = true;
    }
}

async fn git(repo: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .await
        .unwrap();
    assert!(output.status.success(), "git {args:?} failed");
}

async fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    git(repo, &["init"]).await;
    git(repo, &["config", "user.email", "nightshift@test"]).await;
    git(repo, &["config", "user.name", "nightshift"]).await;
    std::fs::create_dir_all(repo.join("projects/foo")).unwrap();
    std::fs::write(repo.join("projects/foo/seed.md"), "seed\n").unwrap();
    git(repo, &["add", "."]).await;
    git(repo, &["commit", "-m", "seed"]).await;
    dir
}

async fn monitor_for(
    repo: &Path,
    allow: &[&str],
) -> (CommandMonitor<FakeClock>, Arc<Mutex<bool>>) {
    let tracker = DirtyFileTracker::new(repo).await.unwrap();
    let manifest = ScopeManifest {
        allow: allow.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    let enforcer = ScopeEnforcer::new(
        repo,
        manifest.compile(),
        "pr-mon",
        "foo",
        GuardPaths {
            status_path: repo.join("logs/status.json"),
            violation_log: repo.join("logs/violations.log"),
        },
    );
    let terminated = Arc::new(Mutex::new(false));
    let monitor = CommandMonitor::new(
        tracker,
        enforcer,
        Arc::new(FlagTerminator(Arc::clone(&terminated))),
        Arc::new(NullSink),
        ns_core::PromptId::from_string("pr-mon"),
        FakeClock::new(),
    );
    (monitor, terminated)
}

#[tokio::test]
async fn in_scope_change_passes_without_termination() {
    let dir = init_repo().await;
    let (monitor, terminated) = monitor_for(dir.path(), &["projects/foo/**"]).await;

    let (tx, rx) = mpsc::channel(16);
    std::fs::write(dir.path().join("projects/foo/new.md"), "fine\n").unwrap();
    tx.send("apply_patch exited 0 in 2ms:".to_string()).await.unwrap();
    drop(tx);

    let enforcer = monitor.run(rx).await;
    assert!(!enforcer.violated());
    assert!(!*terminated.lock());
}

#[tokio::test]
async fn out_of_scope_change_terminates_and_reverts() {
    let dir = init_repo().await;
    let (monitor, terminated) = monitor_for(dir.path(), &["projects/foo/**"]).await;

    let (tx, rx) = mpsc::channel(16);
    std::fs::create_dir_all(dir.path().join("projects/bar")).unwrap();
    std::fs::write(dir.path().join("projects/bar/index.md"), "intruder\n").unwrap();
    tx.send("sh -c 'touch bar' exited 0 in 2ms:".to_string()).await.unwrap();
    drop(tx);

    let enforcer = monitor.run(rx).await;
    let violation = enforcer.violation().unwrap();
    assert_eq!(violation.paths, vec!["projects/bar/index.md".to_string()]);
    assert_eq!(violation.command, "sh -c 'touch bar'");
    assert!(*terminated.lock());
    assert!(!dir.path().join("projects/bar/index.md").exists());
}

#[tokio::test]
async fn non_boundary_lines_never_scan() {
    let dir = init_repo().await;
    let (monitor, terminated) = monitor_for(dir.path(), &["projects/foo/**"]).await;

    let (tx, rx) = mpsc::channel(16);
    std::fs::write(dir.path().join("outside.txt"), "x\n").unwrap();
    tx.send("thinking about the task...".to_string()).await.unwrap();
    drop(tx);

    let enforcer = monitor.run(rx).await;
    assert!(!enforcer.violated());
    assert!(!*terminated.lock());
}

#[tokio::test]
async fn boundaries_after_violation_are_ignored() {
    let dir = init_repo().await;
    let (monitor, _terminated) = monitor_for(dir.path(), &["projects/foo/**"]).await;

    let (tx, rx) = mpsc::channel(16);
    std::fs::write(dir.path().join("first.txt"), "x\n").unwrap();
    std::fs::write(dir.path().join("second.txt"), "y\n").unwrap();
    tx.send("one exited 0 in 1ms:".to_string()).await.unwrap();
    tx.send("two exited 0 in 1ms:".to_string()).await.unwrap();
    drop(tx);

    let enforcer = monitor.run(rx).await;
    // The first boundary declares the violation; the second is ignored.
    let violation = enforcer.violation().unwrap();
    assert_eq!(violation.command, "one");
    assert_eq!(violation.paths, vec!["first.txt".to_string(), "second.txt".to_string()]);
}
