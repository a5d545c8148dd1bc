//! HTTP client for the text-generation engine.
//!
//! The gateway never interprets model output beyond pulling the generated
//! text and token accounting out of the response body; everything else is
//! passed through untouched.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::TokenUsage;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(180);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 4092;
pub const DEFAULT_TEMPERATURE: f64 = 0.8;
pub const DEFAULT_TOP_P: f64 = 0.95;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Attribution forwarded to the engine as request headers, so upstream logs
/// can be correlated with tenants without another lookup.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub company_id: String,
    pub project_id: String,
    pub api_key_id: String,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub usage: TokenUsage,
}

/// The engine takes a flat body with the prompt as a list; sampling
/// parameters sit at the top level, not nested.
#[derive(Serialize)]
struct UpstreamRequest<'a> {
    prompt: [&'a str; 1],
    #[serde(flatten)]
    parameters: &'a GenerationParameters,
}

pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sends one generation call and extracts text plus token accounting.
    pub async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParameters,
        meta: &RequestMeta,
    ) -> Result<GenerationOutcome> {
        let body = UpstreamRequest {
            prompt: [prompt],
            parameters: params,
        };

        let response = self
            .http
            .post(format!("{}/generate", self.base_url))
            .header("x-company-id", &meta.company_id)
            .header("x-project-id", &meta.project_id)
            .header("x-api-key-id", &meta.api_key_id)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("model server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamError {
                status: status.as_u16(),
                message: truncate(&message, 512),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamError {
                status: status.as_u16(),
                message: format!("invalid JSON from model server: {e}"),
            })?;

        Ok(GenerationOutcome {
            text: extract_generated_text(&value),
            usage: extract_usage(&value),
        })
    }

    /// Liveness probe against the engine, with a short deadline so health
    /// checks stay fast when the engine is down.
    pub async fn ping(&self) -> Result<()> {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("model server unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| Error::UpstreamUnavailable(format!("model server unhealthy: {e}")))?;
        Ok(())
    }
}

/// Engines disagree on response shape; try the known fields in a fixed
/// order and fall back to an empty string.
fn extract_generated_text(value: &Value) -> String {
    if let Some(text) = value.get("generated_text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(texts) = value.get("generated_texts").and_then(Value::as_array) {
        let parts: Vec<&str> = texts.iter().filter_map(Value::as_str).collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }

    if let Some(text) = value.get("output").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    String::new()
}

fn extract_usage(value: &Value) -> TokenUsage {
    let mut usage: TokenUsage = value
        .get("usage")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    if usage.total_tokens == 0 {
        usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
    }
    usage
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}
