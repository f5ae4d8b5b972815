//! relay-api: HTTP API for the agent relay
//!
//! Exposes the session resource surface and a streaming chat endpoint that
//! relays agent events as Server-Sent Events. Built with axum.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, build_router, start_server};
