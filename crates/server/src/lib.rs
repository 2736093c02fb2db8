// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event Hub and HTTP surface.
//!
//! Authenticated subscribers connect over `/ws` and receive queue
//! snapshots, prompt updates, per-chunk stream frames, and periodic
//! health. The REST endpoints mutate the prompt store and fan the results
//! out through the same hub.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod auth;
mod health;
mod hub;
mod routes;
mod streamer;
mod views;
mod ws;

pub use auth::{AuthProvider, AuthUser, StaticTokenAuth};
pub use health::spawn_health_broadcaster;
pub use hub::{Hub, SubscriberId};
pub use routes::{build_router, AppState, NoSurface, PromptCanceler, StatusSurface};
pub use streamer::EventStreamer;

use ns_core::SystemClock;

/// Concrete store type used by the HTTP surface.
pub type Store = ns_storage::PromptStore<SystemClock>;
