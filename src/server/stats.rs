use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};

pub async fn summary(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let summary = state.store.usage_summary(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(summary)))
}

pub async fn projects_by_status(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let counts = state.store.projects_by_status(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(counts)))
}

pub async fn keys_by_status(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let counts = state.store.keys_by_status(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(counts)))
}

pub async fn weekly_requests(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let series = state.store.weekly_request_series(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(series)))
}

pub async fn hourly_requests(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let series = state.store.hourly_request_series(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(series)))
}

pub async fn latency_histogram(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let buckets = state.store.latency_histogram(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(buckets)))
}
