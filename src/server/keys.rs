use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireSession, generate_api_key, key_prefix};
use crate::server::AppState;
use crate::server::dto::{
    ApiKeyCreatedResponse, ApiKeyView, CreateApiKeyRequest, DefaultApiKeyRequest, ListKeysParams,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};
use crate::types::ApiKey;

const DEFAULT_KEY_NAME: &str = "default";

fn created_response(key: &ApiKey) -> ApiKeyCreatedResponse {
    ApiKeyCreatedResponse {
        id: key.id.clone(),
        project_id: key.project_id.clone(),
        name: key.name.clone(),
        key: key.key.clone(),
        key_prefix: key_prefix(&key.key).to_string(),
        created_at: key.created_at,
    }
}

pub async fn create_key(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateApiKeyRequest>,
) -> impl IntoResponse {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Key name is required"));
    }

    let store = state.store.as_ref();
    store
        .get_project_scoped(&auth.0.company_id, &req.project_id)?
        .or_not_found("Project not found")?;

    let key = ApiKey {
        id: Uuid::new_v4().to_string(),
        project_id: req.project_id,
        key: generate_api_key(),
        name: name.to_string(),
        revoked: false,
        created_at: Utc::now(),
    };
    store.create_api_key(&key)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(created_response(&key))),
    ))
}

/// Get-or-create the project's default key. Returns the existing active
/// key when one is already there, so repeated calls are harmless.
pub async fn default_key(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DefaultApiKeyRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    store
        .get_project_scoped(&auth.0.company_id, &req.project_id)?
        .or_not_found("Project not found")?;

    if let Some(existing) = store.first_active_key(&req.project_id)? {
        return Ok::<_, ApiError>((
            StatusCode::OK,
            Json(ApiResponse::success(created_response(&existing))),
        ));
    }

    let key = ApiKey {
        id: Uuid::new_v4().to_string(),
        project_id: req.project_id,
        key: generate_api_key(),
        name: DEFAULT_KEY_NAME.to_string(),
        revoked: false,
        created_at: Utc::now(),
    };
    store.create_api_key(&key)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(created_response(&key))),
    ))
}

pub async fn list_keys(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListKeysParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    store
        .get_project_scoped(&auth.0.company_id, &params.project_id)?
        .or_not_found("Project not found")?;

    let mut views = Vec::new();
    for key in store.list_project_keys(&params.project_id)? {
        let stats = store.get_key_stats(&key.id)?;
        views.push(ApiKeyView {
            key_prefix: key_prefix(&key.key).to_string(),
            id: key.id,
            project_id: key.project_id,
            name: key.name,
            revoked: key.revoked,
            created_at: key.created_at,
            request_count: stats.as_ref().map_or(0, |s| s.request_count),
            last_used_at: stats.and_then(|s| s.last_used_at),
        });
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(views)))
}

pub async fn revoke_key(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let key = store
        .get_api_key_scoped(&auth.0.company_id, &id)?
        .or_not_found("API key not found")?;

    // Idempotent: revoking twice is a no-op.
    if !key.revoked {
        store.set_api_key_revoked(&key.id, true)?;
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "id": key.id,
        "revoked": true
    }))))
}

pub async fn restore_key(
    auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let key = store
        .get_api_key_scoped(&auth.0.company_id, &id)?
        .or_not_found("API key not found")?;

    if key.revoked {
        // Restoring can collide with an active key that took the name in
        // the meantime; the unique index catches it.
        if let Err(e) = store.set_api_key_revoked(&key.id, false) {
            if e.is_constraint_violation() {
                return Err(ApiError::conflict(
                    "An active key with this name already exists",
                ));
            }
            return Err(e.into());
        }
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(serde_json::json!({
        "id": key.id,
        "revoked": false
    }))))
}
