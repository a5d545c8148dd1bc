use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireSession;
use crate::server::AppState;
use crate::server::dto::{CuratedModel, DownloadRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt};

/// Hand-picked models the dashboard offers for one-click download.
fn curated_models() -> Vec<CuratedModel> {
    let entries = [
        (
            "mistralai/Mistral-7B-Instruct-v0.3",
            "Mistral 7B Instruct",
            "General-purpose instruction-tuned model with a good quality/latency balance",
            "14.5 GB",
        ),
        (
            "meta-llama/Llama-3.1-8B-Instruct",
            "Llama 3.1 8B Instruct",
            "Strong general assistant model from the Llama 3.1 family",
            "16.1 GB",
        ),
        (
            "Qwen/Qwen2.5-7B-Instruct",
            "Qwen 2.5 7B Instruct",
            "Multilingual instruction model with long-context support",
            "15.2 GB",
        ),
        (
            "microsoft/Phi-3-mini-4k-instruct",
            "Phi-3 Mini 4K Instruct",
            "Small model suited to constrained hardware",
            "7.6 GB",
        ),
    ];

    entries
        .into_iter()
        .map(|(repo_id, name, description, size)| CuratedModel {
            repo_id: repo_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            size: size.to_string(),
        })
        .collect()
}

pub async fn curated(_auth: RequireSession) -> impl IntoResponse {
    Json(ApiResponse::success(curated_models()))
}

pub async fn download(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DownloadRequest>,
) -> impl IntoResponse {
    let repo_id = req.repo_id.trim();
    if repo_id.is_empty() || !repo_id.contains('/') {
        return Err(ApiError::bad_request(
            "repo_id must look like 'organization/model'",
        ));
    }

    let job = Arc::clone(&state.jobs).submit(
        Arc::clone(&state.fetcher),
        repo_id.to_string(),
        state.config.models_dir(),
    );

    Ok::<_, ApiError>((StatusCode::ACCEPTED, Json(ApiResponse::success(job))))
}

pub async fn job_status(
    _auth: RequireSession,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let job = state.jobs.get(&job_id).or_not_found("Job not found")?;
    Ok::<_, ApiError>(Json(ApiResponse::success(job)))
}
