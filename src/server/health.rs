use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::response::ApiResponse;

pub async fn health() -> &'static str {
    "OK"
}

/// Prometheus exposition for scrapers.
pub async fn metrics_export(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}

/// Detailed health for the admin dashboard: database, model server, uptime.
/// Reports degraded rather than failing the request when a dependency is
/// down.
pub async fn system_health(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let database_ok = state.store.ping().is_ok();
    let model_server_ok = state.inference.ping().await.is_ok();

    let status = if database_ok && model_server_ok {
        "ok"
    } else {
        "degraded"
    };

    Json(ApiResponse::success(json!({
        "status": status,
        "database": if database_ok { "ok" } else { "down" },
        "model_server": if model_server_ok { "ok" } else { "down" },
        "uptime_secs": state.started_at.elapsed().as_secs(),
    })))
}
