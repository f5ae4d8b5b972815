//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{chat, delete_session, get_session, health, list_sessions};
use crate::middleware::auth::auth_middleware;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // Streaming chat
        .route("/chat", post(chat))
        // Session management
        .route("/sessions", get(list_sessions))
        .route("/sessions/{session_id}", get(get_session).delete(delete_session))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check
        .route("/health", get(health))
        .merge(protected)
}
