//! HTTP API handlers
//!
//! Request handlers for the streaming chat endpoint and session management.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use relay_core::{AgentOptions, RelayEvent, Session, validate_session_id};

use crate::error::{ApiError, Result};
use crate::server::AppState;

/// Response header carrying the session id of a chat stream
pub const SESSION_ID_HEADER: &str = "x-session-id";

// ============================================================================
// Request/Response types
// ============================================================================

/// Chat request payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// User message
    pub message: String,
    /// Session ID for conversation continuity
    #[serde(default)]
    pub session_id: Option<String>,
    /// Per-request agent option overrides
    #[serde(default)]
    pub options: AgentOptions,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Session list response
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
    pub count: usize,
}

/// Session deletion response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Chat endpoint - relay one agent run as Server-Sent Events
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(req) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    debug!(session_id = ?req.session_id, message_len = req.message.len(), "Chat request");

    if req.message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message is required".to_string()));
    }

    let session = resolve_session(&state, req.session_id.as_deref())?;
    let events = state.relay.relay(&session, &req.message, &req.options)?;

    info!(session_id = %session.id, "Streaming chat response");

    let sse_stream = events.map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    let headers = [(SESSION_ID_HEADER, session.id)];

    Ok((headers, Sse::new(sse_stream).keep_alive(KeepAlive::default())).into_response())
}

fn resolve_session(state: &AppState, session_id: Option<&str>) -> Result<Session> {
    let Some(id) = session_id.filter(|id| !id.is_empty()) else {
        return Ok(state.store.resolve(None));
    };
    validate_session_id(id)?;

    if state.config.session.strict_ids {
        state
            .store
            .touch(id)
            .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
    } else {
        Ok(state.store.resolve(Some(id)))
    }
}

fn to_sse_event(event: &RelayEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode relay event");
        Event::default().data(format!(
            r#"{{"type":"error","error":"failed to encode event","sessionId":"{}"}}"#,
            event.session_id
        ))
    })
}

/// List all live sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.store.list();
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// Get session information
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>> {
    state
        .store
        .get(&session_id)
        .map(Json)
        .ok_or(ApiError::SessionNotFound(session_id))
}

/// Delete a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.store.delete(&session_id) {
        Ok(Json(DeleteResponse { success: true }))
    } else {
        Err(ApiError::SessionNotFound(session_id))
    }
}
