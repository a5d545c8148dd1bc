use serde::{Deserialize, Serialize};

use crate::types::{ProjectStatus, TokenUsage, User};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub company: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub company: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
    pub company: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DefaultApiKeyRequest {
    pub project_id: String,
}

/// The only response that ever carries the raw key.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub key: String,
    pub key_prefix: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// List view of a key: display prefix only, with usage stats folded in.
#[derive(Debug, Serialize)]
pub struct ApiKeyView {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub key_prefix: String,
    pub revoked: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub request_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ListKeysParams {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub latency_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub repo_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CuratedModel {
    pub repo_id: String,
    pub name: String,
    pub description: String,
    pub size: String,
}
