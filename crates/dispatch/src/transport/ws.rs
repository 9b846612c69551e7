// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment stream: `/ws/assignments` pushes every matching assignment to
//! the client as a JSON text frame.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::bus::Subscription;
use crate::error::ErrorCode;
use crate::filter::SubscriptionFilter;
use crate::state::AppState;
use crate::transport::auth;

/// Query parameters for the assignment stream.
#[derive(Debug, Deserialize)]
pub struct AssignmentsQuery {
    /// Auth token.
    pub token: Option<String>,
    #[serde(default)]
    pub department: String,
    /// Comma-separated language codes the assignment must carry.
    #[serde(default)]
    pub languages: String,
}

/// `GET /ws/assignments` — WebSocket upgrade for the filtered stream.
pub async fn ws_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssignmentsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(code) =
        auth::validate_ws_token(query.token.as_deref(), state.config.auth_token.as_deref())
    {
        return code.to_http_response(code.public_message()).into_response();
    }

    let filter = SubscriptionFilter::from_query(&query.department, &query.languages);
    if filter.department.is_empty() {
        return ErrorCode::BadRequest.to_http_response("department is required").into_response();
    }

    // Register before the handshake completes so nothing published after the
    // client sees 101 is missed.
    let subscription = state.bus.subscribe(filter);
    ws.on_upgrade(move |socket| handle_connection(subscription, socket)).into_response()
}

/// Per-connection loop: forward matching assignments until the bus shuts
/// down or the client goes away.
async fn handle_connection(mut subscription: Subscription, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let id = subscription.id();

    loop {
        tokio::select! {
            next = subscription.recv() => {
                let Some(assignment) = next else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                match serde_json::to_string(&assignment) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(subscriber = %id, err = %e, "assignment encode failed"),
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!(subscriber = %id, "assignment stream closed");
}
