//! HTTP API server.
//!
//! Exposes per-user document upload, YouTube transcript import, and quiz /
//! notes generation over a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/user/{user_id}/upload/pdf` | Upload a PDF or DOCX (multipart field `file`) and ingest it |
//! | `POST` | `/api/user/{user_id}/upload/youtube` | Fetch and cache a video transcript |
//! | `POST` | `/api/user/{user_id}/generate/quiz` | Generate (or fetch cached) quiz |
//! | `POST` | `/api/user/{user_id}/generate/notes` | Generate (or fetch cached) notes plus Markdown |
//! | `GET`  | `/api/user/{user_id}/files` | List uploaded documents |
//! | `DELETE` | `/api/user/{user_id}/clear` | Delete the user's workspace |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every `/api` request first sweeps expired entries from the content cache.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Transcript not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::chunk::Splitter;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::extract::DocumentKind;
use crate::llm::{create_llm, LlmClient};
use crate::models::{DifficultyFilter, GenerationReport, NotesDocument, QuizQuestion};
use crate::notes::{to_markdown, NotesGenerator, NotesParams};
use crate::pipeline::{secure_filename, DocumentPipeline};
use crate::quiz::{QuizGenerator, QuizParams};
use crate::workspace::{validate_user_id, WorkspaceManager};
use crate::youtube::{extract_video_id, transcript_text, TranscriptFetcher, YouTubeTranscriptClient};

/// Per-user async locks serializing upload, ingest, and clear.
///
/// Only weak handles are kept, so a user's entry lives as long as some
/// request holds its lock. Dead entries are pruned on every lookup.
#[derive(Default)]
pub struct UserLocks {
    inner: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn lock_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = map.get(user_id).and_then(Weak::upgrade) {
            return lock;
        }
        map.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        map.insert(user_id.to_string(), Arc::downgrade(&lock));
        lock
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<ContentCache>,
    pub pipeline: Arc<DocumentPipeline>,
    pub quiz: Arc<QuizGenerator>,
    pub notes: Arc<NotesGenerator>,
    pub transcripts: Arc<dyn TranscriptFetcher>,
    pub locks: Arc<UserLocks>,
}

impl AppState {
    /// Assemble state from explicit collaborators.
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        transcripts: Arc<dyn TranscriptFetcher>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.storage.base_dir)?;
        let cache = ContentCache::new(&config.storage.cache_dir, config.cache.ttl_secs)?;
        let pipeline = DocumentPipeline::new(
            WorkspaceManager::new(&config.storage.base_dir),
            embedder,
            Splitter::from_config(&config.chunking),
        );
        let quiz = QuizGenerator::new(llm.clone(), config.generation.max_questions_per_batch);
        let notes = NotesGenerator::new(llm);

        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            pipeline: Arc::new(pipeline),
            quiz: Arc::new(quiz),
            notes: Arc::new(notes),
            transcripts,
            locks: Arc::new(UserLocks::default()),
        })
    }
}

/// Build state with the providers selected in the configuration.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let llm = create_llm(&config.llm)?;
    let embedder = create_embedder(&config.embedding)?;
    let transcripts = YouTubeTranscriptClient::shared(&config.transcript)?;
    AppState::new(config.clone(), llm, embedder, transcripts)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_bytes;

    let api = Router::new()
        .route("/api/user/{user_id}/upload/pdf", post(handle_upload))
        .route("/api/user/{user_id}/upload/youtube", post(handle_youtube))
        .route("/api/user/{user_id}/generate/quiz", post(handle_quiz))
        .route("/api/user/{user_id}/generate/notes", post(handle_notes))
        .route("/api/user/{user_id}/files", get(handle_files))
        .route("/api/user/{user_id}/clear", delete(handle_clear))
        .layer(middleware::from_fn_with_state(state.clone(), sweep_cache));

    Router::new()
        .merge(api)
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "study server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn sweep_cache(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.cache.sweep() {
        Ok(0) => {}
        Ok(n) => debug!(removed = n, "swept expired cache entries"),
        Err(e) => warn!(error = %e, "cache sweep failed"),
    }
    next.run(request).await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Handler error carrying the HTTP status and machine-readable code.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Anything not classified by a handler is an upstream failure.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        warn!(error = %format!("{:#}", err), "request failed");
        upstream(format!("{:#}", err))
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn upstream(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "upstream",
        message: message.into(),
    }
}

fn check_user(user_id: &str) -> Result<(), ApiError> {
    validate_user_id(user_id).map_err(|e| bad_request(e.to_string()))
}

// ============ Request helpers ============

/// Null, empty strings, and empty collections count as cache misses.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn cached_value(cache: &ContentCache, key: &str) -> Result<Option<Value>, ApiError> {
    Ok(cache.get(key)?.filter(|v| !is_empty_value(v)))
}

fn field_usize(body: &Value, key: &str, default: usize) -> Result<usize, ApiError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| bad_request(format!("{} must be a non-negative integer", key))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| bad_request(format!("{} must be a non-negative integer", key))),
        Some(_) => Err(bad_request(format!("{} must be a non-negative integer", key))),
    }
}

fn field_threshold(body: &Value, default: f64) -> Result<f64, ApiError> {
    let value = match body.get("similarity_threshold") {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        Some(_) => f64::NAN,
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(bad_request("similarity_threshold must be a number between 0 and 1"));
    }
    Ok(value)
}

fn required_str<'a>(body: &'a Value, key: &str, missing: &str) -> Result<&'a str, ApiError> {
    body.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad_request(missing))
}

/// Format a threshold the way the cache keys expect (`0.85`, `1.0`).
pub fn threshold_key(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Where a `cache_id` points: a cached transcript or the user's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Transcript,
    Documents,
}

fn classify_cache_id(user_id: &str, cache_id: &str) -> Result<SourceKind, ApiError> {
    if cache_id.contains(['/', '\\', '\0']) {
        Err(bad_request("Invalid cache ID format"))
    } else if cache_id.starts_with(&format!("yt_{}_", user_id)) {
        Ok(SourceKind::Transcript)
    } else if cache_id.starts_with(&format!("doc_{}_", user_id)) {
        Ok(SourceKind::Documents)
    } else {
        Err(bad_request("Invalid cache ID format"))
    }
}

/// Source texts for generation: the cached transcript split into chunks,
/// or every chunk in the user's vector index.
fn source_chunks(
    state: &AppState,
    user_id: &str,
    cache_id: &str,
    kind: SourceKind,
) -> Result<Vec<String>, ApiError> {
    match kind {
        SourceKind::Transcript => {
            let transcript = cached_value(&state.cache, cache_id)?
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| not_found("Transcript not found"))?;
            let chunks = state.pipeline.splitter().split(&transcript);
            if chunks.is_empty() {
                return Err(not_found("Transcript not found"));
            }
            Ok(chunks)
        }
        SourceKind::Documents => {
            let chunks = state
                .pipeline
                .chunks(user_id)?
                .ok_or_else(|| not_found("No documents in vector store"))?;
            if chunks.is_empty() {
                return Err(not_found("No documents found"));
            }
            Ok(chunks)
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/user/{user_id}/upload/pdf ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    cache_id: String,
    user_id: String,
    file_type: &'static str,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    check_user(&user_id)?;
    let mut multipart = multipart.map_err(|_| bad_request("No file provided"))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("No file provided"))?;
    if filename.is_empty() {
        return Err(bad_request("No file selected"));
    }
    let (stored_name, kind) = secure_filename(&filename)
        .and_then(|name| {
            let kind = DocumentKind::from_path(std::path::Path::new(&name))?;
            Some((name, kind))
        })
        .ok_or_else(|| bad_request("Invalid file type. Only PDF and DOCX files are allowed."))?;

    let lock = state.locks.lock_for(&user_id);
    let _guard = lock.lock().await;

    state.pipeline.save_upload(&user_id, &stored_name, &bytes)?;
    let summary = state.pipeline.ingest(&user_id).await?;
    info!(
        user = %user_id,
        file = %stored_name,
        chunks_added = summary.chunks_added,
        chunks_total = summary.chunks_total,
        "upload ingested"
    );

    let cache_id = format!("doc_{}_{:x}", user_id, Md5::digest(&bytes));
    Ok(Json(UploadResponse {
        message: format!("{} processed successfully", stored_name),
        cache_id,
        user_id,
        file_type: kind.as_str(),
    }))
}

// ============ POST /api/user/{user_id}/upload/youtube ============

#[derive(Serialize)]
struct YouTubeResponse {
    message: String,
    cache_id: String,
    user_id: String,
}

async fn handle_youtube(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<YouTubeResponse>, ApiError> {
    check_user(&user_id)?;
    let Json(body) = body.map_err(|_| bad_request("No URL provided"))?;
    let url = required_str(&body, "url", "No URL provided")?;
    let video_id = extract_video_id(url).ok_or_else(|| bad_request("Invalid YouTube URL"))?;

    if video_id.contains(['/', '\\', '\0']) {
        return Err(bad_request("Invalid YouTube URL"));
    }
    let cache_id = format!("yt_{}_{}", user_id, video_id);
    if cached_value(&state.cache, &cache_id)?.is_some() {
        return Ok(Json(YouTubeResponse {
            message: "Transcript retrieved from cache".to_string(),
            cache_id,
            user_id,
        }));
    }

    let snippets = state.transcripts.fetch(&video_id).await?;
    let transcript = transcript_text(&snippets);
    state.cache.put(&cache_id, &transcript)?;
    info!(user = %user_id, video_id = %video_id, snippets = snippets.len(), "transcript cached");

    Ok(Json(YouTubeResponse {
        message: "YouTube transcript processed successfully".to_string(),
        cache_id,
        user_id,
    }))
}

// ============ POST /api/user/{user_id}/generate/quiz ============

#[derive(Serialize)]
struct QuizResponse {
    message: String,
    quiz: Value,
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<GenerationReport>,
}

async fn handle_quiz(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<QuizResponse>, ApiError> {
    check_user(&user_id)?;
    let Json(body) = body.map_err(|_| bad_request("No cache ID provided"))?;
    let cache_id = required_str(&body, "cache_id", "No cache ID provided")?;

    let generation = &state.config.generation;
    let num_questions = field_usize(&body, "num_questions", generation.default_num_questions)?;
    if num_questions > generation.max_questions {
        return Err(bad_request(format!(
            "Maximum {} questions allowed",
            generation.max_questions
        )));
    }
    if num_questions == 0 {
        return Err(bad_request("num_questions must be at least 1"));
    }
    let difficulty_raw = body.get("difficulty").and_then(|v| v.as_str()).unwrap_or("mixed");
    let difficulty =
        DifficultyFilter::parse(difficulty_raw).ok_or_else(|| bad_request("Invalid difficulty level"))?;
    let params = QuizParams {
        num_questions,
        difficulty,
        similarity_threshold: field_threshold(&body, generation.similarity_threshold)?,
        batch_size: field_usize(&body, "batch_size", generation.batch_size)?,
    };

    let source = classify_cache_id(&user_id, cache_id)?;
    let quiz_key = format!("{}_{}_{}", cache_id, num_questions, difficulty.as_str());
    if let Some(cached) = cached_value(&state.cache, &quiz_key)? {
        return Ok(Json(QuizResponse {
            message: "Quiz retrieved from cache".to_string(),
            quiz: cached,
            user_id,
            report: None,
        }));
    }

    let chunks = source_chunks(&state, &user_id, cache_id, source)?;
    let generated = state.quiz.generate(&chunks, &params).await;
    if generated.report.is_degraded() {
        warn!(user = %user_id, report = ?generated.report, "quiz generation degraded, not caching");
    } else {
        state.cache.put(&quiz_key, &generated.artifact)?;
    }

    Ok(Json(QuizResponse {
        message: "Quiz generated successfully".to_string(),
        quiz: quiz_value(&generated.artifact)?,
        user_id,
        report: Some(generated.report),
    }))
}

fn quiz_value(quiz: &[QuizQuestion]) -> Result<Value, ApiError> {
    serde_json::to_value(quiz).map_err(|e| upstream(e.to_string()))
}

// ============ POST /api/user/{user_id}/generate/notes ============

#[derive(Serialize)]
struct NotesResponse {
    message: String,
    notes: Value,
    markdown: String,
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<GenerationReport>,
}

async fn handle_notes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<NotesResponse>, ApiError> {
    check_user(&user_id)?;
    let Json(body) = body.map_err(|_| bad_request("No cache ID provided"))?;
    let cache_id = required_str(&body, "cache_id", "No cache ID provided")?;

    let generation = &state.config.generation;
    let params = NotesParams {
        similarity_threshold: field_threshold(&body, generation.similarity_threshold)?,
        batch_size: field_usize(&body, "batch_size", generation.batch_size)?,
    };

    let source = classify_cache_id(&user_id, cache_id)?;
    let notes_key = format!("{}_notes_{}", cache_id, threshold_key(params.similarity_threshold));
    if let Some(cached) = cached_value(&state.cache, &notes_key)? {
        let doc: NotesDocument = serde_json::from_value(cached.clone()).unwrap_or_default();
        return Ok(Json(NotesResponse {
            message: "Notes retrieved from cache".to_string(),
            notes: cached,
            markdown: to_markdown(&doc),
            user_id,
            report: None,
        }));
    }

    let chunks = source_chunks(&state, &user_id, cache_id, source)?;
    let generated = state.notes.generate(&chunks, &params).await;
    if generated.report.is_degraded() {
        warn!(user = %user_id, report = ?generated.report, "notes generation degraded, not caching");
    } else {
        state.cache.put(&notes_key, &generated.artifact)?;
    }

    Ok(Json(NotesResponse {
        message: "Notes generated successfully".to_string(),
        notes: serde_json::to_value(&generated.artifact).map_err(|e| upstream(e.to_string()))?,
        markdown: to_markdown(&generated.artifact),
        user_id,
        report: Some(generated.report),
    }))
}

// ============ GET /api/user/{user_id}/files ============

#[derive(Serialize)]
struct FilesResponse {
    user_id: String,
    files: Vec<String>,
    count: usize,
}

async fn handle_files(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<FilesResponse>, ApiError> {
    check_user(&user_id)?;
    let files: Vec<String> = state
        .pipeline
        .workspaces()
        .list_documents(&user_id)?
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    Ok(Json(FilesResponse {
        count: files.len(),
        user_id,
        files,
    }))
}

// ============ DELETE /api/user/{user_id}/clear ============

#[derive(Serialize)]
struct ClearResponse {
    message: String,
    user_id: String,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    check_user(&user_id)?;
    let lock = state.locks.lock_for(&user_id);
    let _guard = lock.lock().await;
    state.pipeline.workspaces().destroy(&user_id)?;
    info!(user = %user_id, "workspace cleared");
    Ok(Json(ClearResponse {
        message: format!("All data cleared for user {}", user_id),
        user_id,
    }))
}
