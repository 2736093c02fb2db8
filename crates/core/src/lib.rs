// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core domain types for the Nightshift agent host.
//!
//! Prompt records and their status state machine, the attempt-log format,
//! scope manifests, branch slugs, event envelopes, and the clock and
//! registry seams shared by every other crate.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod attempt;
pub mod clock;
pub mod event;
pub mod id;
pub mod project;
pub mod prompt;
pub mod scope;
pub mod slug;
pub mod stats;

pub use attempt::{parse_attempts, stdout_summary, AttemptRecord, AttemptStatus};
pub use clock::{
    epoch_ms_from_rfc3339, rfc3339_from_epoch_ms, seconds_between, Clock, FakeClock, SystemClock,
};
pub use event::{Envelope, EnvelopeType, NullSink, StreamFrame, StreamName, StreamSink};
pub use id::PromptId;
pub use project::{
    EmptyRegistry, HumanTask, HumanTaskSource, NoHumanTasks, ProjectPayload, ProjectRegistry,
};
pub use prompt::{PromptRecord, PromptStatus, StatusCounts};
pub use scope::{CompiledScope, PathClass, ScopeManifest};
pub use slug::{slugify, SLUG_CHARS, SLUG_WORDS};
pub use stats::{DurationReport, DurationSummary, DurationWindow};
