// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nightshiftd`: the Nightshift agent-host daemon.

use ns_daemon::{config::Config, lifecycle};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let config = Config::from_env();

    // Log to the daemon log file; RUST_LOG controls verbosity.
    let _ = std::fs::create_dir_all(&config.logs_dir);
    let appender = tracing_appender::rolling::never(
        config.daemon_log_path.parent().unwrap_or(&config.logs_dir),
        config
            .daemon_log_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "progress.log".to_string()),
    );
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(lifecycle::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            eprintln!("nightshiftd: {err}");
            ExitCode::FAILURE
        }
    }
}
