// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the dispatch API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ErrorCode};
use crate::model::{Agent, RoutingRequest};
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub agents: usize,
    pub available_agents: usize,
    pub active_assignments: usize,
    pub subscribers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAgentsRequest {
    pub agents: Vec<Agent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAgentsResponse {
    pub registered: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListAgentsQuery {
    pub department: Option<String>,
    pub available: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseResponse {
    pub room_id: String,
    pub released: bool,
}

// -- Error translation --------------------------------------------------------

/// Map a core error to its response. Details are logged, never returned.
fn core_error_response(err: &CoreError) -> Response {
    let code = err.code();
    match code {
        ErrorCode::Internal => tracing::error!(err = %err, "request failed"),
        ErrorCode::TryAgain => tracing::warn!(err = %err, "request failed"),
        _ => tracing::debug!(err = %err, "request failed"),
    }
    code.to_http_response(code.public_message()).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    ErrorCode::BadRequest.to_http_response(message).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> Response {
    match s.engine.stats().await {
        Ok(stats) => Json(HealthResponse {
            status: "running".to_owned(),
            agents: stats.agents,
            available_agents: stats.available_agents,
            active_assignments: stats.active_assignments,
            subscribers: s.bus.subscriber_count(),
        })
        .into_response(),
        Err(e) => core_error_response(&e),
    }
}

/// `POST /api/v1/agents` — bulk-register agents.
pub async fn register_agents(
    State(s): State<Arc<AppState>>,
    body: Result<Json<RegisterAgentsRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if let Some(bad) =
        req.agents.iter().find(|a| a.agent_id.trim().is_empty() || a.department.trim().is_empty())
    {
        return bad_request(format!(
            "agent {:?} needs a non-empty agentId and department",
            bad.agent_id
        ));
    }

    match s.engine.register_agents(req.agents).await {
        Ok(registered) => Json(RegisterAgentsResponse { registered }).into_response(),
        Err(e) => core_error_response(&e),
    }
}

/// `GET /api/v1/agents?department=&available=`
pub async fn list_agents(
    State(s): State<Arc<AppState>>,
    Query(q): Query<ListAgentsQuery>,
) -> Response {
    let department = q.department.as_deref().filter(|d| !d.is_empty());
    match s.engine.list_agents(department, q.available).await {
        Ok(agents) => Json(agents).into_response(),
        Err(e) => core_error_response(&e),
    }
}

/// `POST /api/v1/route` — bind a room to an agent and announce it.
pub async fn route(
    State(s): State<Arc<AppState>>,
    body: Result<Json<RoutingRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if let Err(message) = req.validate() {
        return bad_request(message);
    }

    let assignment = match s.engine.route(req).await {
        Ok(assignment) => assignment,
        Err(e) => return core_error_response(&e),
    };

    match s.bus.publish(assignment.clone()) {
        Ok(delivered) => {
            tracing::debug!(room_id = %assignment.room_id, delivered, "assignment published")
        }
        Err(e) => tracing::warn!(room_id = %assignment.room_id, err = %e, "assignment not published"),
    }
    Json(assignment).into_response()
}

/// `GET /api/v1/rooms/{room_id}` — the room's active assignment.
pub async fn get_room(State(s): State<Arc<AppState>>, Path(room_id): Path<String>) -> Response {
    match s.engine.lookup(&room_id).await {
        Ok(assignment) => Json(assignment).into_response(),
        Err(e) => core_error_response(&e),
    }
}

/// `DELETE /api/v1/rooms/{room_id}` — release the room. Unknown rooms succeed.
pub async fn release_room(
    State(s): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Response {
    match s.engine.release(&room_id).await {
        Ok(released) => Json(ReleaseResponse { room_id, released }).into_response(),
        Err(e) => core_error_response(&e),
    }
}
