// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber registry and broadcast fan-out.
//!
//! Each WebSocket connection registers a bounded outbox channel. Broadcasts
//! serialize the envelope once and enqueue the shared bytes per subscriber;
//! a full or closed outbox marks the subscriber dead and removes it. There
//! is no retry and no per-subscriber replay; late joiners rely on the
//! snapshot burst at reconnect.

use ns_core::{Envelope, EnvelopeType};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbox depth per subscriber; slow consumers beyond this are dropped.
const OUTBOX_DEPTH: usize = 256;

pub type SubscriberId = u64;

struct Subscriber {
    tx: mpsc::Sender<Arc<str>>,
    authenticated: bool,
}

/// Connected-subscriber set, shared by the HTTP layer and the streamer.
#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection; the receiver is the connection's outbox.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<Arc<str>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(OUTBOX_DEPTH);
        self.subscribers.lock().insert(id, Subscriber { tx, authenticated: false });
        (id, rx)
    }

    /// Mark a subscriber as authenticated; broadcasts reach it from now on.
    pub fn authenticate(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.lock().get_mut(&id) {
            subscriber.authenticated = true;
        }
    }

    pub fn unregister(&self, id: SubscriberId) {
        self.subscribers.lock().remove(&id);
        tracing::debug!(subscriber = id, total = self.subscriber_count(), "subscriber disconnected");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Serialize once and enqueue to every authenticated subscriber (or
    /// only `target` when given). Dead subscribers are swept inline.
    pub fn broadcast(&self, kind: EnvelopeType, payload: Value, target: Option<SubscriberId>) {
        let encoded: Arc<str> = match serde_json::to_string(&Envelope::new(kind, payload)) {
            Ok(encoded) => encoded.into(),
            Err(err) => {
                tracing::error!(kind = %kind, error = %err, "failed to encode envelope");
                return;
            }
        };
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (id, subscriber) in subscribers.iter() {
                if let Some(target) = target {
                    if *id != target {
                        continue;
                    }
                } else if !subscriber.authenticated {
                    continue;
                }
                if subscriber.tx.try_send(Arc::clone(&encoded)).is_err() {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            tracing::warn!(subscriber = id, "dropping dead subscriber");
            self.unregister(id);
        }
    }

    /// Targeted envelope to one connection, authenticated or not (used for
    /// the pre-auth handshake and error replies).
    pub fn send_to(&self, id: SubscriberId, kind: EnvelopeType, payload: Value) {
        self.broadcast(kind, payload, Some(id));
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
