//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use relay_core::{Config, EventRelay, SessionStore};

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SessionStore,
    pub relay: EventRelay,
}

impl AppState {
    pub fn new(config: Config, store: SessionStore, relay: EventRelay) -> Self {
        Self {
            config: Arc::new(config),
            store,
            relay,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origins) = &config.api.allowed_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
}

/// Build the application router with all layers applied
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .merge(routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP API server
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    if state.config.api.key.is_none() {
        warn!("No API key configured; the HTTP API accepts unauthenticated requests");
    }

    let port = state.config.api.port;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
