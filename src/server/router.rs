use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;

use super::{auth, generate, health, keys, models, projects, stats, users};
use crate::auth::{PasswordHasher, SessionKeys};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::inference::InferenceClient;
use crate::jobs::{HubFetcher, JobRegistry, ModelFetcher};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: ServerConfig,
    pub sessions: SessionKeys,
    pub passwords: PasswordHasher,
    pub inference: InferenceClient,
    pub jobs: Arc<JobRegistry>,
    pub fetcher: Arc<dyn ModelFetcher>,
    pub metrics: PrometheusHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        config: ServerConfig,
        metrics: PrometheusHandle,
    ) -> Result<Self> {
        let sessions = SessionKeys::from_secret(&config.session_secret)?;
        let inference = InferenceClient::new(&config.model_server_url)?;
        let fetcher: Arc<dyn ModelFetcher> = Arc::new(HubFetcher::new(&config.hub_base_url)?);

        Ok(Self {
            store,
            config,
            sessions,
            passwords: PasswordHasher::new(),
            inference,
            jobs: Arc::new(JobRegistry::new()),
            fetcher,
            metrics,
            started_at: Instant::now(),
        })
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/verify", get(auth::verify))
}

fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/project", post(projects::create_project))
        .route("/project/{id}", delete(projects::delete_project))
        .route("/projects", get(projects::list_projects))
        .route("/apikey", post(keys::create_key))
        .route("/apikey/default", post(keys::default_key))
        .route("/apikey/{id}/revoke", post(keys::revoke_key))
        .route("/apikey/{id}/restore", post(keys::restore_key))
        .route("/apikeys", get(keys::list_keys))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", delete(users::delete_user))
        .route("/system/health", get(health::system_health))
        .route("/stats/summary", get(stats::summary))
        .route("/stats/projects/status", get(stats::projects_by_status))
        .route("/stats/apikeys/status", get(stats::keys_by_status))
        .route("/stats/requests/weekly", get(stats::weekly_requests))
        .route("/metrics/requests/24h", get(stats::hourly_requests))
        .route("/metrics/latency/histogram", get(stats::latency_histogram))
}

fn models_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/curated", get(models::curated))
        .route("/download", post(models::download))
        .route("/jobs/{job_id}", get(models::job_status))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics_export))
        .route("/generate", post(generate::generate))
        .nest("/auth", auth_router())
        .nest("/admin", admin_router())
        .nest("/models", models_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
