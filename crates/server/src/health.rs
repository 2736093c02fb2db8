// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic health publisher.

use crate::streamer::EventStreamer;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Publish a `health` envelope on a fixed interval until shutdown.
///
/// Runs regardless of activity so idle dashboards still see liveness.
pub fn spawn_health_broadcaster(
    streamer: Arc<EventStreamer>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => streamer.broadcast_health(None),
                _ = shutdown.cancelled() => break,
            }
        }
    })
}
