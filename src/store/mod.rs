mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Columns that may be missing when the database predates the current
/// schema. Resolved once when the store opens, never re-probed per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCapabilities {
    pub has_project_status: bool,
    pub has_usage_latency: bool,
    pub has_user_created_by: bool,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    fn capabilities(&self) -> SchemaCapabilities;

    /// Cheap liveness probe for health checks.
    fn ping(&self) -> Result<()>;

    // Company operations

    /// Idempotent by name: returns the existing company or creates it.
    fn get_or_create_company(&self, name: &str) -> Result<Company>;
    fn get_company_by_name(&self, name: &str) -> Result<Option<Company>>;

    // User operations

    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, company_id: &str, username: &str) -> Result<Option<User>>;
    fn get_user_scoped(&self, company_id: &str, id: &str) -> Result<Option<User>>;
    fn list_company_users(&self, company_id: &str) -> Result<Vec<User>>;

    /// Deletes a user within a company as a single scoped statement.
    /// When creator tracking is available the statement itself enforces
    /// that `requester_id` created the user. Returns whether a row went away.
    fn delete_user(&self, company_id: &str, user_id: &str, requester_id: &str) -> Result<bool>;

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()>;
    fn get_project_by_id(&self, id: &str) -> Result<Option<Project>>;
    fn get_project_scoped(&self, company_id: &str, id: &str) -> Result<Option<Project>>;
    fn list_projects(&self, company_id: &str) -> Result<Vec<ProjectWithKeyCount>>;

    /// Removes the project and everything hanging off it: usage records,
    /// then API keys, then the project row, in one transaction.
    fn delete_project(&self, company_id: &str, id: &str) -> Result<bool>;

    // API key operations

    fn create_api_key(&self, key: &ApiKey) -> Result<()>;
    fn get_active_key_by_secret(&self, raw_key: &str) -> Result<Option<ApiKey>>;
    fn get_api_key_scoped(&self, company_id: &str, key_id: &str) -> Result<Option<ApiKey>>;
    fn list_project_keys(&self, project_id: &str) -> Result<Vec<ApiKey>>;
    fn first_active_key(&self, project_id: &str) -> Result<Option<ApiKey>>;
    fn set_api_key_revoked(&self, key_id: &str, revoked: bool) -> Result<()>;

    // Metering operations

    /// Durable metering for one successful generation call: appends a usage
    /// row and bumps the per-key counter with a single conditional upsert,
    /// both inside one transaction.
    fn record_generation(&self, api_key_id: &str, usage: &TokenUsage, latency_ms: i64)
    -> Result<()>;
    fn get_key_stats(&self, api_key_id: &str) -> Result<Option<ApiKeyStats>>;

    // Analytics operations (all scoped to one company)

    fn usage_summary(&self, company_id: &str) -> Result<UsageSummary>;
    fn projects_by_status(&self, company_id: &str) -> Result<ProjectStatusCounts>;
    fn keys_by_status(&self, company_id: &str) -> Result<KeyStatusCounts>;

    /// One entry per calendar day for the trailing 7 days including today,
    /// zero-filled, oldest first.
    fn weekly_request_series(&self, company_id: &str) -> Result<Vec<DailyCount>>;

    /// One entry per hour for the trailing 24 hours, zero-filled.
    fn hourly_request_series(&self, company_id: &str) -> Result<Vec<HourlyCount>>;

    /// Fixed latency buckets over the trailing 24 hours.
    fn latency_histogram(&self, company_id: &str) -> Result<Vec<LatencyBucket>>;
}
