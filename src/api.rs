//! HTTP API endpoints for operators.
//!
//! Read-only views of the server, used for health checks and debugging.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::GameSnapshot;
use crate::state::AppState;
use crate::types::Role;

/// One authenticated connection as seen from outside
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub role: Role,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    #[serde(flatten)]
    pub snapshot: GameSnapshot,
    pub host_connected: bool,
    pub connections: Vec<ConnectionInfo>,
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Current game snapshot plus connection overview.
///
/// GET /api/state
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateReport> {
    let shared = state.lock().await;

    let mut connections: Vec<ConnectionInfo> = shared
        .sessions
        .connections()
        .filter_map(|conn| {
            let identity = conn.identity.as_ref()?;
            Some(ConnectionInfo {
                name: identity.name.clone(),
                role: identity.role,
                connected_at: conn.connected_at,
            })
        })
        .collect();
    connections.sort_by_key(|c| c.connected_at);

    Json(StateReport {
        snapshot: shared.snapshot(None),
        host_connected: shared.sessions.host().is_some(),
        connections,
    })
}
