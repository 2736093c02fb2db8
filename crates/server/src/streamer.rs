// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridges backend state changes to hub subscribers.

use crate::hub::{Hub, SubscriberId};
use crate::views;
use crate::Store;
use ns_core::clock::Clock;
use ns_core::event::{StreamFrame, StreamSink};
use ns_core::{EnvelopeType, HumanTaskSource, ProjectRegistry, SystemClock};
use serde_json::{json, Value};
use std::sync::Arc;

/// Publishes queue snapshots, prompt updates, stream frames, and health.
pub struct EventStreamer {
    store: Arc<Store>,
    hub: Arc<Hub>,
    projects: Arc<dyn ProjectRegistry>,
    tasks: Arc<dyn HumanTaskSource>,
    clock: SystemClock,
}

impl EventStreamer {
    pub fn new(
        store: Arc<Store>,
        hub: Arc<Hub>,
        projects: Arc<dyn ProjectRegistry>,
        tasks: Arc<dyn HumanTaskSource>,
    ) -> Self {
        Self { store, hub, projects, tasks, clock: SystemClock }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn broadcast_queue(&self, target: Option<SubscriberId>) {
        let now = self.clock.timestamp();
        let records = self.store.list();
        let payload = views::queue_snapshot(&records, self.projects.as_ref(), &now);
        self.hub.broadcast(EnvelopeType::QueueSnapshot, payload, target);
    }

    pub fn broadcast_prompt(&self, prompt_id: &str, target: Option<SubscriberId>) {
        let Some(record) = self.store.get(prompt_id) else {
            return;
        };
        let payload = json!({ "prompt": views::prompt_payload(&record, self.projects.as_ref()) });
        self.hub.broadcast(EnvelopeType::PromptUpdate, payload, target);
    }

    pub fn broadcast_prompt_deleted(&self, prompt_id: &str) {
        self.hub.broadcast(EnvelopeType::PromptDeleted, json!({ "prompt_id": prompt_id }), None);
    }

    pub fn broadcast_health(&self, target: Option<SubscriberId>) {
        self.hub.broadcast(EnvelopeType::Health, self.health_payload(), target);
    }

    /// The periodic health envelope: store health merged with the Human
    /// Task summary.
    pub fn health_payload(&self) -> Value {
        json!({
            "status": "ok",
            "timestamp": self.clock.timestamp(),
            "pending": self.store.pending_count(),
            "metrics": {
                "prompts": self.store.health_snapshot(),
                "human_tasks": self.tasks.health(),
            },
        })
    }

    /// Initial burst after a successful auth.
    pub fn send_initial_state(&self, target: SubscriberId) {
        self.broadcast_queue(Some(target));
        self.broadcast_health(Some(target));
    }
}

impl StreamSink for EventStreamer {
    fn stream_frame(&self, frame: StreamFrame) {
        let payload = serde_json::to_value(&frame).unwrap_or(Value::Null);
        self.hub.broadcast(EnvelopeType::PromptStream, payload, None);
    }
}
