//! HTTP API for the helpdesk assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/crawl` | Crawl a URL into the knowledge base |
//! | `GET`  | `/api/documents` | List entries, newest first |
//! | `GET`  | `/api/documents/{id}` | One entry with its body |
//! | `DELETE` | `/api/documents/{id}` | Remove an entry |
//! | `POST` | `/api/search` | Ranked knowledge search |
//! | `POST` | `/api/chat` | Single-shot answer |
//! | `POST` | `/api/chat/stream` | Streamed answer, NDJSON envelopes |
//! | `GET`  | `/api/models` | Models offered by the language-model backend |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Streaming
//!
//! `/api/chat/stream` answers with `Content-Type: application/x-ndjson`, one
//! envelope per line: `metadata` (repeatable), `content`, and a single
//! terminal `done`. A client that disconnects drops the envelope stream and
//! with it the in-flight backend request.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the chat UI is served
//! separately.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use kb_helpdesk_core::chat::{ChatRequest, ChatResponse, Orchestrator};
use kb_helpdesk_core::store::Store;

use crate::ask::build_orchestrator;
use crate::config::Config;
use crate::crawl::{crawl, parse_crawl_url, CrawlOutcome};
use crate::kb::{delete_entry, get_entry, list_entries, EntryList, EntryResponse};
use crate::llm::FALLBACK_MODELS;
use crate::search::{search_documents, SearchResponse};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    orchestrator: Orchestrator,
}

impl AppState {
    fn store(&self) -> &dyn Store {
        self.orchestrator.store().as_ref()
    }
}

/// Starts the HTTP server on `[server].bind` with the configured file store
/// and Ollama backend. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let bind_addr = config.server.bind.clone();
    let app = build_router(config.clone(), orchestrator);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("KB helpdesk listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full router, for embedding or in-process tests.
pub fn build_router(config: Config, orchestrator: Orchestrator) -> Router {
    let state = AppState {
        config: Arc::new(config),
        orchestrator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/crawl", post(handle_crawl))
        .route("/api/documents", get(handle_list_documents))
        .route(
            "/api/documents/{id}",
            get(handle_get_document).delete(handle_delete_document),
        )
        .route("/api/search", post(handle_search))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/stream", post(handle_chat_stream))
        .route("/api/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    warn!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

/// Malformed or mistyped JSON bodies get the same error contract as other
/// input errors.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
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

// ============ POST /api/crawl ============

#[derive(Deserialize)]
struct CrawlRequest {
    #[serde(default)]
    url: String,
}

async fn handle_crawl(
    State(state): State<AppState>,
    payload: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Json<CrawlOutcome>, AppError> {
    let req = json_body(payload)?;
    let url = parse_crawl_url(&req.url).map_err(|e| bad_request(format!("{:#}", e)))?;
    let outcome = crawl(&state.config, state.store(), &url)
        .await
        .map_err(internal)?;
    Ok(Json(outcome))
}

// ============ /api/documents ============

async fn handle_list_documents(State(state): State<AppState>) -> Result<Json<EntryList>, AppError> {
    let list = list_entries(state.store()).await.map_err(internal)?;
    Ok(Json(list))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntryResponse>, AppError> {
    get_entry(state.store(), &id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
    id: String,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !delete_entry(state.store(), &id).await.map_err(internal)? {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(DeleteResponse { deleted: true, id }))
}

// ============ POST /api/search ============

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let req = json_body(payload)?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let search = &state.orchestrator.settings().search;
    let response = search_documents(search, state.store(), &req.query, req.limit)
        .await
        .map_err(internal)?;
    Ok(Json(response))
}

// ============ POST /api/chat, /api/chat/stream ============

fn check_chat_request(req: &ChatRequest) -> Result<(), AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    Ok(())
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = json_body(payload)?;
    check_chat_request(&req)?;
    Ok(Json(state.orchestrator.answer(&req).await))
}

async fn handle_chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(payload)?;
    check_chat_request(&req)?;

    let lines = state.orchestrator.answer_stream(req).map(|envelope| {
        serde_json::to_string(&envelope).map(|mut line| {
            line.push('\n');
            line
        })
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(lines))
        .map_err(|e| internal(e.into()))
}

// ============ GET /api/models ============

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<String>,
    default: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelsErrorBody {
    error: ErrorDetail,
    fallback_models: Vec<String>,
}

async fn handle_models(State(state): State<AppState>) -> Response {
    match state.orchestrator.backend().list_models().await {
        Ok(models) => Json(ModelsResponse {
            models,
            default: state.config.llm.model.clone(),
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "could not list models");
            let body = ModelsErrorBody {
                error: ErrorDetail {
                    code: "internal".to_string(),
                    message: format!("Failed to fetch models: {}", e),
                },
                fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
