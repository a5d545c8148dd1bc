use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};

use crate::inference::{GenerationParameters, RequestMeta};
use crate::metrics;
use crate::server::AppState;
use crate::server::dto::{GenerateRequest, GenerateResponse};
use crate::server::response::{ApiError, ApiResponse};

const API_KEY_HEADER: &str = "x-api-key";

pub async fn generate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let raw_key = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("API key header is required"))?;

    let store = state.store.as_ref();

    // Unknown and revoked keys are deliberately indistinguishable.
    let key = store
        .get_active_key_by_secret(raw_key)?
        .ok_or_else(|| ApiError::forbidden("Invalid or revoked API key"))?;

    // Live counters track every attempt; the durable path below only
    // records successes.
    metrics::record_generation_attempt(&key.id);

    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("Prompt must not be empty"));
    }

    let project = store
        .get_project_by_id(&key.project_id)?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    let defaults = GenerationParameters::default();
    let params = GenerationParameters {
        max_new_tokens: req.max_new_tokens.unwrap_or(defaults.max_new_tokens),
        temperature: req.temperature.unwrap_or(defaults.temperature),
        top_p: req.top_p.unwrap_or(defaults.top_p),
    };
    let meta = RequestMeta {
        company_id: project.company_id,
        project_id: project.id,
        api_key_id: key.id.clone(),
    };

    let start = Instant::now();
    let outcome = match state.inference.generate(&req.prompt, &params, &meta).await {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics::record_generation_error(&key.id, "upstream");
            return Err(e.into());
        }
    };
    let elapsed = start.elapsed();
    let latency_ms = elapsed.as_millis() as i64;

    // Metering never blocks the response; a failed write is logged and the
    // caller still gets their text.
    if let Err(e) = store.record_generation(&key.id, &outcome.usage, latency_ms) {
        metrics::record_generation_error(&key.id, "metering");
        tracing::error!(api_key_id = %key.id, "Failed to record usage: {e}");
    }
    metrics::record_generation(&key.id, &outcome.usage, elapsed.as_secs_f64());

    Ok::<_, ApiError>(Json(ApiResponse::success(GenerateResponse {
        text: outcome.text,
        usage: outcome.usage,
        latency_ms,
    })))
}
