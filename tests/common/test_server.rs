use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use fortress::config::ServerConfig;
use fortress::error::Result;
use fortress::jobs::{ModelFetcher, ProgressHandle};
use fortress::server::{AppState, create_router};
use fortress::store::{SqliteStore, Store};

pub const TEST_SECRET: &str = "integration-test-secret-long-enough";

// The Prometheus recorder is process-global; install it once and share the
// handle across every test server.
static METRICS: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS
        .get_or_init(|| fortress::metrics::install().expect("install metrics recorder"))
        .clone()
}

/// Fetcher that "downloads" instantly so job tests are deterministic.
struct StubFetcher;

#[async_trait]
impl ModelFetcher for StubFetcher {
    async fn fetch(&self, _repo_id: &str, dest: &Path, progress: &ProgressHandle) -> Result<()> {
        tokio::fs::write(dest.join("model.bin"), b"weights").await?;
        progress.set_percent(100);
        Ok(())
    }
}

pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    server: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let store = SqliteStore::new(temp_dir.path().join("test.db")).expect("open store");
        store.initialize().expect("initialize store");

        // Upstream URLs point at a closed port so generation fails fast
        // with 502 instead of hanging.
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: temp_dir.path().to_path_buf(),
            model_server_url: "http://127.0.0.1:9".to_string(),
            hub_base_url: "http://127.0.0.1:9".to_string(),
            session_secret: TEST_SECRET.to_string(),
        };

        let mut state =
            AppState::new(Arc::new(store), config, metrics_handle()).expect("build app state");
        state.fetcher = Arc::new(StubFetcher);

        let app = create_router(Arc::new(state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            temp_dir,
            base_url,
            server: Some(server),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}
