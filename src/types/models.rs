use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub company_id: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Paused,
    Archived,
}

impl ProjectStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Archived => "archived",
        }
    }

    /// Unknown values decode as active so that rows written by older
    /// deployments keep showing up in status breakdowns.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "paused" => ProjectStatus::Paused,
            "archived" => ProjectStatus::Archived,
            _ => ProjectStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub company_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectWithKeyCount {
    #[serde(flatten)]
    pub project: Project,
    pub key_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub project_id: String,
    /// Raw secret. Never serialized; handlers expose a display prefix instead.
    #[serde(skip)]
    pub key: String,
    pub name: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyStats {
    pub api_key_id: String,
    pub request_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub api_key_id: String,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub used_at: DateTime<Utc>,
}

/// Token accounting reported by the inference engine for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

// Analytics aggregates. All of these are tenant-scoped at query time.

#[derive(Debug, Clone, Serialize)]
pub struct ProjectTotals {
    pub total: i64,
    pub added_last_30d: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyTotals {
    pub active: i64,
    pub created_last_7d: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestTotals {
    pub total: i64,
    pub last_30d: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub projects: ProjectTotals,
    pub api_keys: KeyTotals,
    pub requests: RequestTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatusCounts {
    pub active: i64,
    pub paused: i64,
    pub archived: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyStatusCounts {
    pub active: i64,
    pub revoked: i64,
    pub total: i64,
}

/// One day of the trailing-week request series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub count: i64,
}

/// One hour of the trailing-24h request series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    /// Local hour label, `HH:00`.
    pub time: String,
    pub requests: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    pub range: String,
    pub count: i64,
}
