// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelopes pushed to subscribers and the stream sink seam.

use crate::id::PromptId;
use serde::{Deserialize, Serialize};

/// Tag of a pushed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Hello,
    AuthOk,
    QueueSnapshot,
    PromptUpdate,
    PromptDeleted,
    PromptStream,
    Health,
    Pong,
    Error,
}

impl std::fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvelopeType::Hello => "hello",
            EnvelopeType::AuthOk => "auth_ok",
            EnvelopeType::QueueSnapshot => "queue_snapshot",
            EnvelopeType::PromptUpdate => "prompt_update",
            EnvelopeType::PromptDeleted => "prompt_deleted",
            EnvelopeType::PromptStream => "prompt_stream",
            EnvelopeType::Health => "health",
            EnvelopeType::Pong => "pong",
            EnvelopeType::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The unit pushed to subscribers: `{type, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: EnvelopeType, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }
}

/// Which child pipe a stream frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamName::Stdout => write!(f, "stdout"),
            StreamName::Stderr => write!(f, "stderr"),
        }
    }
}

/// One chunk of Agent CLI output relayed to subscribers.
///
/// `reset` tells clients to clear any stale buffer before the run's first
/// output; `done` closes the stream after the child exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub prompt_id: PromptId,
    pub stream: StreamName,
    pub chunk: String,
    pub reset: bool,
    pub done: bool,
    pub timestamp: String,
}

impl StreamFrame {
    pub fn chunk(prompt_id: PromptId, stream: StreamName, chunk: String, timestamp: String) -> Self {
        Self { prompt_id, stream, chunk, reset: false, done: false, timestamp }
    }

    pub fn reset(prompt_id: PromptId, stream: StreamName, timestamp: String) -> Self {
        Self { prompt_id, stream, chunk: String::new(), reset: true, done: false, timestamp }
    }

    pub fn done(prompt_id: PromptId, stream: StreamName, timestamp: String) -> Self {
        Self { prompt_id, stream, chunk: String::new(), reset: false, done: true, timestamp }
    }
}

/// Sink for per-chunk stream frames, implemented by the Event Hub.
///
/// The runner publishes through this seam so it never depends on the
/// transport. Sends are fire-and-forget; a slow subscriber is the hub's
/// problem, not the runner's.
pub trait StreamSink: Send + Sync {
    fn stream_frame(&self, frame: StreamFrame);
}

/// Sink that drops every frame (tests, headless runs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn stream_frame(&self, _frame: StreamFrame) {}
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
