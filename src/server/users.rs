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
use crate::server::dto::CreateUserRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::types::User;

pub async fn list_users(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let users = state.store.list_company_users(&auth.0.company_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

pub async fn create_user(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        company_id: auth.0.company_id.clone(),
        username: username.to_string(),
        password_hash: state.passwords.hash(&req.password)?,
        created_by: Some(auth.0.user.id.clone()),
        created_at: Utc::now(),
    };
    state.store.create_user(&user)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn delete_user(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let target = store
        .get_user_scoped(&auth.0.company_id, &id)?
        .or_not_found("User not found")?;

    if target.id == auth.0.user.id {
        return Err(ApiError::forbidden("Cannot delete your own account"));
    }

    // The delete statement itself enforces creator-only removal.
    if !store.delete_user(&auth.0.company_id, &target.id, &auth.0.user.id)? {
        return Err(ApiError::forbidden("Only the creator can delete this user"));
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "deleted": true
    }))))
}
