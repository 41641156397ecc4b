//! REST surface: batch submission, job/batch status polling, gallery
//! views, prompt classification, and upstream proxies.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::generation::GenerationClient;
use crate::generation::types::{GenerationPayload, GenerationRequest};
use crate::prompts::PromptClassifier;
use crate::queue::{Job, JobStatus, QueueManager};
use crate::store::GenerationStore;

/// Gallery curation tags accepted by the tag endpoint.
const ALLOWED_TAGS: &[&str] = &["accept", "maybe", "declined"];

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<QueueManager>,
    pub store: Arc<dyn GenerationStore>,
    pub generation: GenerationConfig,
    pub classifier: Arc<PromptClassifier>,
}

/// Build the Axum router for the service.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate/batch", post(submit_batch))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/batches/{batch_id}", get(batch_status))
        .route("/api/batches/{batch_id}/generations", get(batch_generations))
        .route("/api/history", get(history))
        .route("/api/gallery", get(gallery))
        .route("/api/generations/{generation_id}/tag", patch(set_tag))
        .route("/api/classify-prompts", post(classify_prompts))
        .route("/api/models", get(list_models))
        .route("/api/upload/init-image", post(upload_init_image))
        .with_state(state)
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

/// Short correlation id shared by every job of one batch.
fn new_batch_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "bulk-studio"
    }))
}

// ── Batch submission ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BatchSubmitRequest {
    #[serde(rename = "apiKey", default)]
    api_key: Option<String>,
    items: Vec<GenerationRequest>,
}

async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchSubmitRequest>,
) -> Response {
    if request.items.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "items must not be empty");
    }

    let batch_id = new_batch_id();
    let mut job_ids = Vec::with_capacity(request.items.len());

    for (index, item) in request.items.into_iter().enumerate() {
        let payload = GenerationPayload {
            api_key: request.api_key.clone(),
            prompt_data: item,
            batch_id: batch_id.clone(),
            prompt_index: index as u32 + 1,
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(e) => {
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to encode payload: {e}"),
                );
            }
        };
        job_ids.push(state.queue.submit("generation", payload).await);
    }

    info!(%batch_id, jobs = job_ids.len(), "Batch queued");
    Json(json!({
        "batchId": batch_id,
        "jobIds": job_ids,
        "message": format!("Queued {} jobs", job_ids.len()),
    }))
    .into_response()
}

// ── Status polling ──────────────────────────────────────────────────────

async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.queue.get(id).await {
        Some(job) => Json(job).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Job not found"),
    }
}

/// Jobs carry their batch id inside the payload; the queue itself has no
/// batch concept, so aggregation happens here over `list()`.
async fn batch_status(State(state): State<AppState>, Path(batch_id): Path<String>) -> Response {
    let jobs: Vec<Job> = state
        .queue
        .list()
        .await
        .into_iter()
        .filter(|job| {
            job.payload.get("batch_id").and_then(|v| v.as_str()) == Some(batch_id.as_str())
        })
        .collect();

    let count = |status: JobStatus| jobs.iter().filter(|job| job.status == status).count();
    let summaries: Vec<serde_json::Value> = jobs
        .iter()
        .map(|job| {
            json!({
                "id": job.id,
                "status": job.status,
                "result": job.result,
                "error": job.error,
                "prompt": job.payload.pointer("/prompt_data/prompt"),
                "prompt_number": job.payload.pointer("/prompt_data/prompt_number"),
            })
        })
        .collect();

    Json(json!({
        "batchId": batch_id,
        "total": jobs.len(),
        "completed": count(JobStatus::Completed),
        "failed": count(JobStatus::Failed),
        "processing": count(JobStatus::Processing),
        "queued": count(JobStatus::Queued),
        "jobs": summaries,
    }))
    .into_response()
}

/// Persisted results of one batch, as recorded by the workers. Unlike
/// `batch_status` this reads the store, so it survives a restart.
async fn batch_generations(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Response {
    match state.store.list_by_batch(&batch_id).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Gallery ─────────────────────────────────────────────────────────────

fn default_history_limit() -> u32 {
    50
}

fn default_gallery_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

async fn history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> Response {
    match state
        .store
        .list_recent(None, params.limit, params.offset)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct GalleryParams {
    #[serde(default)]
    tag: Option<String>,
    #[serde(default = "default_gallery_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

async fn gallery(State(state): State<AppState>, Query(params): Query<GalleryParams>) -> Response {
    match state
        .store
        .list_recent(params.tag.as_deref(), params.limit, params.offset)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct TagUpdateRequest {
    tag: String,
}

async fn set_tag(
    State(state): State<AppState>,
    Path(generation_id): Path<String>,
    Json(request): Json<TagUpdateRequest>,
) -> Response {
    if !ALLOWED_TAGS.contains(&request.tag.as_str()) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("tag must be one of: {}", ALLOWED_TAGS.join(", ")),
        );
    }

    match state.store.update_tag(&generation_id, &request.tag).await {
        Ok(true) => Json(json!({ "generationId": generation_id, "tag": request.tag }))
            .into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Generation not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Prompt classification ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    prompts: Vec<ClassifyEntry>,
}

#[derive(Debug, Deserialize)]
struct ClassifyEntry {
    #[serde(default)]
    number: Option<String>,
    prompt: String,
}

async fn classify_prompts(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Response {
    let results: Vec<_> = request
        .prompts
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let number = entry
                .number
                .clone()
                .unwrap_or_else(|| (index + 1).to_string());
            state.classifier.classify(&number, &entry.prompt)
        })
        .collect();

    let valid = results.iter().filter(|r| r.is_valid).count();
    Json(json!({
        "results": results,
        "total": results.len(),
        "valid": valid,
        "invalid": results.len() - valid,
    }))
    .into_response()
}

// ── Upstream proxies ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiKeyParams {
    #[serde(rename = "apiKey", default)]
    api_key: Option<String>,
}

/// Resolve the caller-supplied key or the configured default.
fn resolve_client(
    config: &GenerationConfig,
    api_key: Option<String>,
) -> Result<GenerationClient, Response> {
    let key = api_key
        .map(SecretString::from)
        .or_else(|| config.api_key.clone())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No API key provided"))?;
    GenerationClient::new(key, &config.base_url)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn list_models(State(state): State<AppState>, Query(params): Query<ApiKeyParams>) -> Response {
    let client = match resolve_client(&state.generation, params.api_key) {
        Ok(client) => client,
        Err(response) => return response,
    };

    match client.list_models().await {
        Ok(models) => Json(models).into_response(),
        Err(e) => {
            warn!(error = %e, "Model list fetch failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn upload_init_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut api_key: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };
        match field.name() {
            Some("apiKey") => match field.text().await {
                Ok(text) => api_key = Some(text),
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            },
            Some("file") => {
                let name = field
                    .file_name()
                    .unwrap_or("image.png")
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((name, bytes.to_vec())),
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "Missing file field");
    };
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "png".to_string());

    let client = match resolve_client(&state.generation, api_key) {
        Ok(client) => client,
        Err(response) => return response,
    };

    match client.upload_init_image(&file_name, &extension, bytes).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => {
            warn!(error = %e, "Init image upload failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
