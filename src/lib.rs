// Public API for integration tests and the server binary

pub mod abuse;
pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod state;
pub mod types;
pub mod validate;
pub mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use state::AppState;

/// All HTTP and WebSocket routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(api::health))
        .route("/api/state", get(api::get_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
