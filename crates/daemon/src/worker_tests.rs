// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ns_core::{EmptyRegistry, NoHumanTasks, PromptStatus};
use ns_display::{DisplayConfig, DisplayManager, NoPower, NullPanel};
use ns_git::GitConfig;
use ns_runner::RunnerConfig;
use ns_server::Hub;
use ns_storage::PromptStore;
use std::os::unix::fs::PermissionsExt;
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

struct Fixture {
    store: Arc<Store>,
    worker: Arc<PromptWorker>,
    shutdown: CancellationToken,
    repo: TempDir,
    _state: TempDir,
}

impl Fixture {
    fn spawn(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.worker).spawn(self.shutdown.clone())
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Repo with a `dev` base branch, state dirs outside the repo, and a stub
/// Agent CLI script.
async fn fixture(agent_script: &str) -> Fixture {
    let repo = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();

    git(repo.path(), &["init"]).await;
    git(repo.path(), &["config", "user.email", "nightshift@test"]).await;
    git(repo.path(), &["config", "user.name", "nightshift"]).await;
    std::fs::write(repo.path().join("README.md"), "seed\n").unwrap();
    git(repo.path(), &["add", "."]).await;
    git(repo.path(), &["commit", "-m", "seed"]).await;
    git(repo.path(), &["switch", "-c", "dev"]).await;

    let agent_path = state.path().join("agent.sh");
    std::fs::write(&agent_path, format!("#!/bin/sh\n{agent_script}\n")).unwrap();
    let mut perms = std::fs::metadata(&agent_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&agent_path, perms).unwrap();

    let store = Arc::new(
        PromptStore::load(
            &state.path().join("data/prompts.json"),
            &state.path().join("logs"),
            SystemClock,
        )
        .unwrap(),
    );
    let hub = Arc::new(Hub::new());
    let projects: Arc<dyn ProjectRegistry> = Arc::new(EmptyRegistry);
    let streamer = Arc::new(EventStreamer::new(
        Arc::clone(&store),
        hub,
        Arc::clone(&projects),
        Arc::new(NoHumanTasks),
    ));
    let runner = Arc::new(ScopeGuardRunner::new(
        RunnerConfig {
            agent_cmd: vec![agent_path.display().to_string()],
            repo_root: repo.path().to_path_buf(),
            guard_dir: state.path().join("guard"),
        },
        SystemClock,
        Arc::clone(&streamer) as Arc<dyn ns_core::StreamSink>,
    ));
    let discipline = Arc::new(BranchDiscipline::new(GitConfig::new(repo.path().to_path_buf())));
    let display = Arc::new(DisplayManager::start(
        Box::new(NullPanel::new(16, 16)),
        Arc::new(StoreDisplaySource {
            store: Arc::clone(&store),
            tasks: Arc::new(NoHumanTasks),
        }),
        Arc::new(NoPower),
        DisplayConfig { enabled: false, ..Default::default() },
    ));

    let worker = Arc::new(PromptWorker::new(
        Arc::clone(&store),
        runner,
        discipline,
        streamer,
        projects,
        display,
        Duration::from_millis(100),
    ));

    Fixture { store, worker, shutdown: CancellationToken::new(), repo, _state: state }
}

async fn wait_until(
    store: &Arc<Store>,
    id: &str,
    predicate: impl Fn(&ns_core::PromptRecord) -> bool,
    timeout: Duration,
) -> ns_core::PromptRecord {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if let Some(record) = store.get(id) {
            if predicate(&record) {
                return record;
            }
        }
        assert!(std::time::Instant::now() < deadline, "timed out waiting for prompt {id}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn git_stdout(repo: &Path, args: &[&str]) -> String {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .unwrap();
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[tokio::test]
async fn happy_path_merges_branch_and_completes() {
    let fixture = fixture(concat!(
        "cat > /dev/null\n",
        "echo entry > CHANGELOG.md\n",
        "git add CHANGELOG.md\n",
        "git commit -q -m 'add changelog'\n",
        "echo applied\n",
    ))
    .await;
    let handle = fixture.spawn();

    let record = fixture.store.submit("Add CHANGELOG entry", None, None).unwrap();
    let done = wait_until(
        &fixture.store,
        record.id.as_str(),
        |r| r.is_terminal(),
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(done.status, PromptStatus::Completed);
    assert_eq!(done.result_summary.as_deref(), Some("Agent run succeeded"));
    assert_eq!(done.attempts, 1);
    assert!(done.last_run_seconds.is_some());

    // The branch was fast-forwarded into dev and deleted
    assert_eq!(git_stdout(fixture.repo.path(), &["branch", "--show-current"]).await, "dev");
    assert!(fixture.repo.path().join("CHANGELOG.md").exists());
    let branches = git_stdout(fixture.repo.path(), &["branch", "--list"]).await;
    assert!(!branches.contains("nightshift/prompt"));

    // One attempt block plus the cleanup notes
    let log = std::fs::read_to_string(&done.log_path).unwrap();
    let attempts = ns_core::parse_attempts(&log);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, "completed");
    assert!(log.contains("Merged commits: "));

    fixture.shutdown.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn dirty_workspace_fails_prompt_without_spawning() {
    let fixture = fixture("echo should-not-run\n").await;
    std::fs::write(fixture.repo.path().join("README.md"), "dirty\n").unwrap();
    let handle = fixture.spawn();

    let record = fixture.store.submit("blocked by dirt", None, None).unwrap();
    let done = wait_until(
        &fixture.store,
        record.id.as_str(),
        |r| r.is_terminal(),
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(done.status, PromptStatus::Failed);
    assert!(done.result_summary.as_deref().unwrap().contains("uncommitted changes"));

    // A synthetic attempt block records the failure; no agent output
    let log = std::fs::read_to_string(&done.log_path).unwrap();
    let attempts = ns_core::parse_attempts(&log);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, "failed");
    assert_eq!(attempts[0].stdout, "");
    assert!(!log.contains("should-not-run"));

    fixture.shutdown.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn cancel_with_restart_requeues_the_same_prompt() {
    let fixture = fixture("cat > /dev/null\nexec sleep 2\n").await;
    let handle = fixture.spawn();

    let record = fixture.store.submit("cancel then restart", None, None).unwrap();
    wait_until(
        &fixture.store,
        record.id.as_str(),
        |r| r.status == PromptStatus::Running,
        Duration::from_secs(20),
    )
    .await;

    assert!(fixture.worker.request_cancel(record.id.as_str(), true));

    // The canceled attempt re-queues and runs again to completion
    let done = wait_until(
        &fixture.store,
        record.id.as_str(),
        |r| r.attempts == 2 && r.is_terminal(),
        Duration::from_secs(30),
    )
    .await;
    assert_eq!(done.status, PromptStatus::Completed);

    let log = std::fs::read_to_string(&done.log_path).unwrap();
    let attempts = ns_core::parse_attempts(&log);
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].status, "canceled");
    assert_eq!(attempts[0].summary, "Prompt canceled; restart requested");
    assert_eq!(attempts[1].status, "completed");

    fixture.shutdown.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn cancel_of_idle_prompt_returns_false() {
    let fixture = fixture("true\n").await;
    assert!(!fixture.worker.request_cancel("pr-nobody", false));
}

#[tokio::test]
async fn deleted_prompt_is_skipped() {
    let fixture = fixture("cat > /dev/null\necho ok\n").await;

    let doomed = fixture.store.submit("delete me first", None, None).unwrap();
    fixture.store.delete(doomed.id.as_str()).unwrap();
    let kept = fixture.store.submit("run me", None, None).unwrap();

    let handle = fixture.spawn();
    let done = wait_until(
        &fixture.store,
        kept.id.as_str(),
        |r| r.is_terminal(),
        Duration::from_secs(20),
    )
    .await;
    assert_eq!(done.status, PromptStatus::Completed);
    assert!(fixture.store.get(doomed.id.as_str()).is_none());

    fixture.shutdown.cancel();
    let _ = handle.await;
}
