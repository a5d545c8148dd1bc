//! Background model-download jobs.
//!
//! Jobs live in process memory only; a restart forgets them. The downloaded
//! files themselves are durable, each with a `meta.json` sidecar recording
//! where they came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    pub job_id: String,
    pub repo_id: String,
    pub status: JobStatus,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-memory table of download jobs, shared across request handlers and
/// the worker tasks that update it.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, DownloadJob>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<DownloadJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
    }

    fn insert(&self, job: DownloadJob) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.job_id.clone(), job);
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut DownloadJob)) {
        if let Some(job) = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(job_id)
        {
            f(job);
        }
    }

    /// Registers a job and spawns the worker that runs it. Returns the job
    /// snapshot in its queued state.
    pub fn submit(
        self: Arc<Self>,
        fetcher: Arc<dyn ModelFetcher>,
        repo_id: String,
        models_dir: PathBuf,
    ) -> DownloadJob {
        let job = DownloadJob {
            job_id: Uuid::new_v4().to_string(),
            repo_id: repo_id.clone(),
            status: JobStatus::Queued,
            percent: 0,
            error: None,
        };
        self.insert(job.clone());

        let registry = self;
        let job_id = job.job_id.clone();
        tokio::spawn(async move {
            registry.update(&job_id, |j| j.status = JobStatus::Running);

            let progress = ProgressHandle {
                registry: Arc::clone(&registry),
                job_id: job_id.clone(),
            };
            match run_download(fetcher.as_ref(), &repo_id, &models_dir, &progress).await {
                Ok(()) => {
                    registry.update(&job_id, |j| {
                        j.status = JobStatus::Done;
                        j.percent = 100;
                    });
                    tracing::info!(repo_id = %repo_id, job_id = %job_id, "Model download complete");
                }
                Err(e) => {
                    tracing::error!(repo_id = %repo_id, job_id = %job_id, "Model download failed: {e}");
                    registry.update(&job_id, |j| {
                        j.status = JobStatus::Error;
                        j.error = Some(e.to_string());
                    });
                }
            }
        });

        job
    }
}

async fn run_download(
    fetcher: &dyn ModelFetcher,
    repo_id: &str,
    models_dir: &Path,
    progress: &ProgressHandle,
) -> Result<()> {
    // "org/model" becomes one directory level on disk.
    let dest = models_dir.join(repo_id.replace('/', "--"));
    tokio::fs::create_dir_all(&dest).await?;

    fetcher.fetch(repo_id, &dest, progress).await?;

    let meta = json!({
        "repo_id": repo_id,
        "job_id": progress.job_id,
        "downloaded_at": Utc::now().to_rfc3339(),
    });
    tokio::fs::write(dest.join("meta.json"), serde_json::to_vec_pretty(&meta)?).await?;
    Ok(())
}

/// Handed to fetchers so they can report progress without seeing the
/// registry. Percent never goes backwards.
pub struct ProgressHandle {
    registry: Arc<JobRegistry>,
    job_id: String,
}

impl ProgressHandle {
    pub fn set_percent(&self, percent: u8) {
        let percent = percent.min(100);
        self.registry
            .update(&self.job_id, |j| j.percent = j.percent.max(percent));
    }
}

/// Where model files actually come from. The default talks to a
/// HuggingFace-style hub; tests plug in stubs.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch(&self, repo_id: &str, dest: &Path, progress: &ProgressHandle) -> Result<()>;
}

pub struct HubFetcher {
    http: reqwest::Client,
    base_url: String,
}

impl HubFetcher {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn list_files(&self, repo_id: &str) -> Result<Vec<String>> {
        let info: serde_json::Value = self
            .http
            .get(format!("{}/api/models/{repo_id}", self.base_url))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("model hub unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| Error::UpstreamUnavailable(format!("model hub rejected lookup: {e}")))?
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("invalid hub response: {e}")))?;

        let files: Vec<String> = info
            .get("siblings")
            .and_then(|s| s.as_array())
            .map(|siblings| {
                siblings
                    .iter()
                    .filter_map(|s| s.get("rfilename").and_then(|f| f.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if files.is_empty() {
            return Err(Error::BadRequest(format!(
                "model repository '{repo_id}' has no downloadable files"
            )));
        }
        Ok(files)
    }
}

#[async_trait]
impl ModelFetcher for HubFetcher {
    async fn fetch(&self, repo_id: &str, dest: &Path, progress: &ProgressHandle) -> Result<()> {
        let files = self.list_files(repo_id).await?;
        let total = files.len();

        for (i, file) in files.iter().enumerate() {
            let bytes = self
                .http
                .get(format!("{}/{repo_id}/resolve/main/{file}", self.base_url))
                .send()
                .await
                .map_err(|e| Error::UpstreamUnavailable(format!("model hub unreachable: {e}")))?
                .error_for_status()
                .map_err(|e| {
                    Error::UpstreamUnavailable(format!("failed to download '{file}': {e}"))
                })?
                .bytes()
                .await
                .map_err(|e| {
                    Error::UpstreamUnavailable(format!("failed to download '{file}': {e}"))
                })?;

            let target = dest.join(file);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &bytes).await?;

            progress.set_percent(((i + 1) * 100 / total) as u8);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    struct OkFetcher;

    #[async_trait]
    impl ModelFetcher for OkFetcher {
        async fn fetch(
            &self,
            _repo_id: &str,
            dest: &Path,
            progress: &ProgressHandle,
        ) -> Result<()> {
            tokio::fs::write(dest.join("model.bin"), b"weights").await?;
            progress.set_percent(50);
            progress.set_percent(100);
            Ok(())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ModelFetcher for FailingFetcher {
        async fn fetch(
            &self,
            _repo_id: &str,
            _dest: &Path,
            _progress: &ProgressHandle,
        ) -> Result<()> {
            Err(Error::UpstreamUnavailable("hub is down".to_string()))
        }
    }

    async fn wait_for_terminal(registry: &JobRegistry, job_id: &str) -> DownloadJob {
        for _ in 0..100 {
            if let Some(job) = registry.get(job_id) {
                if matches!(job.status, JobStatus::Done | JobStatus::Error) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_successful_download_reaches_done() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(JobRegistry::new());

        let job = Arc::clone(&registry).submit(
            Arc::new(OkFetcher),
            "org/model".to_string(),
            temp.path().to_path_buf(),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.percent, 0);

        let done = wait_for_terminal(&registry, &job.job_id).await;
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.percent, 100);
        assert!(done.error.is_none());

        let dest = temp.path().join("org--model");
        assert!(dest.join("model.bin").exists());
        assert!(dest.join("meta.json").exists());
    }

    #[tokio::test]
    async fn test_failed_download_reports_error() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(JobRegistry::new());

        let job = Arc::clone(&registry).submit(
            Arc::new(FailingFetcher),
            "org/broken".to_string(),
            temp.path().to_path_buf(),
        );

        let done = wait_for_terminal(&registry, &job.job_id).await;
        assert_eq!(done.status, JobStatus::Error);
        assert!(done.error.unwrap().contains("hub is down"));
    }

    #[test]
    fn test_unknown_job_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[tokio::test]
    async fn test_percent_is_monotonic() {
        let registry = Arc::new(JobRegistry::new());
        registry.insert(DownloadJob {
            job_id: "j1".to_string(),
            repo_id: "org/model".to_string(),
            status: JobStatus::Running,
            percent: 0,
            error: None,
        });

        let progress = ProgressHandle {
            registry: Arc::clone(&registry),
            job_id: "j1".to_string(),
        };
        progress.set_percent(40);
        progress.set_percent(20);
        assert_eq!(registry.get("j1").unwrap().percent, 40);

        progress.set_percent(200);
        assert_eq!(registry.get("j1").unwrap().percent, 100);
    }
}
