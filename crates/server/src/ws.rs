// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket connection lifecycle.
//!
//! Handshake order: server sends `hello`, the client's first message must
//! be `auth{token}`. Success yields `auth_ok` plus the initial state burst;
//! failure closes the socket with the auth-failed code. Post-auth messages
//! are `fetch_prompt`, `request_queue`, and `ping`.

use crate::routes::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use ns_core::clock::Clock;
use ns_core::{EnvelopeType, SystemClock};
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Close code sent when token verification fails.
const CLOSE_AUTH_FAILED: u16 = 4003;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection(socket, state))
}

async fn connection(mut socket: WebSocket, state: Arc<AppState>) {
    let clock = SystemClock;
    let (id, mut outbox) = state.hub.register();
    tracing::info!(subscriber = id, total = state.hub.subscriber_count(), "subscriber connected");
    state.hub.send_to(id, EnvelopeType::Hello, json!({ "timestamp": clock.timestamp() }));

    let mut authed = false;
    loop {
        tokio::select! {
            outgoing = outbox.recv() => {
                match outgoing {
                    Some(text) => {
                        if socket.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // The hub swept this subscriber as dead.
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(&state, id, &mut authed, text.as_str()).is_break() {
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: CLOSE_AUTH_FAILED,
                                    reason: "auth failed".into(),
                                })))
                                .await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    state.hub.unregister(id);
}

/// Dispatch one client message. Break means "close the connection".
fn handle_text(
    state: &Arc<AppState>,
    id: crate::hub::SubscriberId,
    authed: &mut bool,
    text: &str,
) -> ControlFlow<()> {
    let clock = SystemClock;
    let message: Value = match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) => {
            state.hub.send_to(id, EnvelopeType::Error, json!({"message": "payload must be an object"}));
            return ControlFlow::Continue(());
        }
        Err(_) => {
            state.hub.send_to(id, EnvelopeType::Error, json!({"message": "invalid JSON payload"}));
            return ControlFlow::Continue(());
        }
    };
    let message_type =
        message.get("type").and_then(Value::as_str).unwrap_or_default().trim().to_lowercase();

    if message_type == "auth" {
        let token = message.get("token").and_then(Value::as_str).unwrap_or_default().trim();
        if token.is_empty() {
            state.hub.send_to(id, EnvelopeType::Error, json!({"message": "auth token required"}));
            return ControlFlow::Continue(());
        }
        let Some(user) = state.auth.verify_token(token) else {
            state
                .hub
                .send_to(id, EnvelopeType::Error, json!({"message": "invalid or expired token"}));
            return ControlFlow::Break(());
        };
        *authed = true;
        state.hub.authenticate(id);
        state.hub.send_to(id, EnvelopeType::AuthOk, json!({"user": state.auth.user_payload(&user)}));
        state.streamer.send_initial_state(id);
        return ControlFlow::Continue(());
    }

    if !*authed {
        state.hub.send_to(id, EnvelopeType::Error, json!({"message": "authentication required"}));
        return ControlFlow::Continue(());
    }

    match message_type.as_str() {
        "fetch_prompt" => {
            let prompt_id =
                message.get("prompt_id").and_then(Value::as_str).unwrap_or_default().trim();
            if prompt_id.is_empty() {
                state
                    .hub
                    .send_to(id, EnvelopeType::Error, json!({"message": "prompt_id is required"}));
            } else {
                state.streamer.broadcast_prompt(prompt_id, Some(id));
            }
        }
        "request_queue" => state.streamer.broadcast_queue(Some(id)),
        "ping" => {
            state.hub.send_to(id, EnvelopeType::Pong, json!({"timestamp": clock.timestamp()}));
        }
        other => {
            let label = if other.is_empty() { "<missing>" } else { other };
            state.hub.send_to(
                id,
                EnvelopeType::Error,
                json!({"message": format!("unknown message type: {label}")}),
            );
        }
    }
    ControlFlow::Continue(())
}
