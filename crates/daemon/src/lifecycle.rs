// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup wiring, recovery broadcast, shutdown.

use crate::config::Config;
use crate::human_tasks::FileHumanTasks;
use crate::projects::DirRegistry;
use crate::worker::{DisplaySurface, PromptWorker, StoreDisplaySource};
use fs2::FileExt;
use ns_core::{HumanTaskSource, ProjectRegistry, SystemClock};
use ns_display::{DisplayConfig, DisplayManager, NoPower, NullPanel};
use ns_git::{BranchDiscipline, GitConfig};
use ns_runner::{RunnerConfig, ScopeGuardRunner};
use ns_server::{
    build_router, spawn_health_broadcaster, AppState, EventStreamer, Hub, StaticTokenAuth, Store,
};
use std::future::IntoFuture;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another nightshiftd already holds the lock: {0}")]
    LockHeld(std::io::Error),

    #[error("startup I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load prompt store: {0}")]
    Store(#[from] ns_storage::StoreError),

    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
}

/// Run the daemon until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.logs_dir)?;

    // Lock first so a second daemon cannot race the store.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockHeld)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let store =
        Arc::new(Store::load(&config.db_path, &config.logs_dir, SystemClock)?);
    let projects: Arc<dyn ProjectRegistry> = Arc::new(DirRegistry::load(
        &config.repo_root,
        &config.projects_dir,
        std::env::var("NIGHTSHIFT_DEFAULT_PROJECT").ok().as_deref(),
    ));
    let tasks: Arc<dyn HumanTaskSource> =
        Arc::new(FileHumanTasks::new(config.data_dir.join("human_tasks.json")));

    let hub = Arc::new(Hub::new());
    let streamer = Arc::new(EventStreamer::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&projects),
        Arc::clone(&tasks),
    ));

    let runner = Arc::new(ScopeGuardRunner::new(
        RunnerConfig {
            agent_cmd: config.agent_cmd.clone(),
            repo_root: config.repo_root.clone(),
            guard_dir: config.guard_dir.clone(),
        },
        SystemClock,
        Arc::clone(&streamer) as Arc<dyn ns_core::StreamSink>,
    ));

    let discipline = Arc::new(BranchDiscipline::new(GitConfig {
        repo_root: config.repo_root.clone(),
        base_branch: config.base_branch.clone(),
        branch_prefix: config.branch_prefix.clone(),
        slug_words: config.slug_words,
        slug_chars: config.slug_chars,
        cleanup_enabled: config.cleanup_enabled,
        allow_dirty: config.allow_dirty,
        dry_run: config.git_dry_run,
        disabled: config.branch_discipline_disabled,
    }));

    let display = Arc::new(DisplayManager::start(
        Box::new(NullPanel::new(1872, 1404)),
        Arc::new(StoreDisplaySource { store: Arc::clone(&store), tasks: Arc::clone(&tasks) }),
        Arc::new(NoPower),
        DisplayConfig {
            enabled: config.display_enabled,
            hostname: hostname(),
            ..Default::default()
        },
    ));

    let worker = Arc::new(PromptWorker::new(
        Arc::clone(&store),
        runner,
        discipline,
        Arc::clone(&streamer),
        Arc::clone(&projects),
        Arc::clone(&display),
        config.take_timeout,
    ));

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        hub,
        streamer: Arc::clone(&streamer),
        auth: Arc::new(StaticTokenAuth::new(
            config.auth_email.clone(),
            config.auth_password.clone(),
            config.auth_token.clone(),
        )),
        projects,
        canceler: Arc::clone(&worker) as Arc<dyn ns_server::PromptCanceler>,
        surface: Arc::new(DisplaySurface(Arc::clone(&display))),
        daemon_log_path: config.daemon_log_path.clone(),
    });

    // Broadcast the records rewritten during crash recovery exactly once.
    let recovered = store.recover_inflight();
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "recovered interrupted prompts");
        streamer.broadcast_queue(None);
        for id in &recovered {
            streamer.broadcast_prompt(id.as_str(), None);
        }
        streamer.broadcast_health(None);
        display.request_refresh("recovered");
    }

    let shutdown = CancellationToken::new();
    let worker_handle = Arc::clone(&worker).spawn(shutdown.clone());
    let health_handle =
        spawn_health_broadcaster(Arc::clone(&streamer), config.health_interval, shutdown.clone());

    let router = build_router(state, config.frontend_dir.as_deref());
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| LifecycleError::Bind(bind_addr.clone(), err))?;
    tracing::info!(addr = %bind_addr, "nightshift backend listening");

    let server_shutdown = shutdown.clone();
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .into_future();

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
            }
        }
        _ = wait_for_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    shutdown.cancel();
    let _ = worker_handle.await;
    let _ = health_handle.await;
    display.stop();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(_) => {
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|raw| raw.trim().to_string())
        .unwrap_or_else(|_| "nightshift".to_string())
}
