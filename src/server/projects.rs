use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::dto::CreateProjectRequest;
use crate::server::response::{ApiError, ApiResponse};
use crate::types::{Project, ProjectStatus};

pub async fn create_project(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Project name is required"));
    }

    let project = Project {
        id: Uuid::new_v4().to_string(),
        company_id: auth.0.company_id.clone(),
        name: name.to_string(),
        description: req.description,
        department: req.department,
        status: req.status.unwrap_or(ProjectStatus::Active),
        created_at: Utc::now(),
    };

    state.store.create_project(&project)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn list_projects(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let projects = state.store.list_projects(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn delete_project(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // A project in another tenant and a project that never existed look
    // the same from here.
    if !state.store.delete_project(&auth.0.company_id, &id)? {
        return Err(ApiError::not_found("Project not found"));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "deleted": true
    }))))
}
