//! OpenAI-compatible HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/v1/models` | Model list with the single RAG model |
//! | `POST` | `/api/v1/chat/completions` | Grounded chat, SSE or single response |
//! | `POST` | `/api/v1/ingest/file` | Multipart upload of one document (`file` field) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No messages provided" },
//!   "detail": "No messages provided" }
//! ```
//!
//! `detail` repeats the message for clients that expect FastAPI-style
//! errors. Codes: `bad_request`, `unsupported_format`, `extraction_failed`,
//! `empty_document` (400), `payload_too_large` (413),
//! `upstream_unavailable` (502), `vector_store_unavailable` (503),
//! `internal` (500, message redacted).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so that browser chat
//! front-ends can call the API directly.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use secure_rag_core::embedding::Embedder;
use secure_rag_core::models::ChatMessage;
use secure_rag_core::store::VectorStore;

use crate::chat::RagChatService;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::ingest::IngestionService;
use crate::llm::{LlmClient, StreamEvent};
use crate::sqlite_store::SqliteVectorStore;

const MODEL_CREATED: i64 = 1677610602;
const MODEL_OWNER: &str = "enterprise";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    index: VectorIndex,
    chat: RagChatService,
    ingest: IngestionService,
}

impl AppState {
    /// Wire the pipelines over an already-opened store and embedder.
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let index = VectorIndex::new(store, embedder, &config);
        let llm = LlmClient::new(&config.llm)?;
        Ok(Self {
            chat: RagChatService::new(index.clone(), llm),
            ingest: IngestionService::new(index.clone()),
            index,
            config: Arc::new(config),
        })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/models", get(handle_models))
        .route("/api/v1/chat/completions", post(handle_chat_completions))
        .route(
            "/api/v1/ingest/file",
            post(handle_ingest_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the configured store and embedder, then serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteVectorStore::open(&config.store).await?;
    let embedder = create_embedder(&config.embedding, config.store.dims)?;
    let state = AppState::new(config.clone(), Arc::new(store), embedder)?;
    state
        .index()
        .ensure_collection()
        .await
        .context("Failed to prepare collection")?;

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    info!(
        bind = %config.server.bind,
        collection = %config.store.collection,
        llm = %config.llm.base_url,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    detail: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.message.clone(),
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::UnsupportedFormat(_) => AppError::new(
                StatusCode::BAD_REQUEST,
                "unsupported_format",
                "Only PDF, TXT, MD files supported",
            ),
            RagError::ExtractionFailed(msg) => {
                AppError::new(StatusCode::BAD_REQUEST, "extraction_failed", msg)
            }
            RagError::EmptyDocument => {
                AppError::new(StatusCode::BAD_REQUEST, "empty_document", "File is empty")
            }
            e @ (RagError::NoMessagesProvided | RagError::InvalidRequest(_)) => {
                bad_request(e.to_string())
            }
            e @ RagError::VectorStoreUnavailable(_) => {
                error!(error = %e, "vector store unavailable");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "vector_store_unavailable",
                    e.to_string(),
                )
            }
            e @ RagError::UpstreamModelUnreachable(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream_unavailable", e.to_string())
            }
            RagError::UnexpectedInternal(e) => {
                error!(error = ?e, "internal error");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error",
                )
            }
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

// ============ GET /api/v1/models ============

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelCard>,
}

#[derive(Serialize)]
struct ModelCard {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

async fn handle_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: vec![ModelCard {
            id: state.config.server.model_id.clone(),
            object: "model",
            created: MODEL_CREATED,
            owned_by: MODEL_OWNER,
        }],
    })
}

// ============ POST /api/v1/chat/completions ============

fn default_stream() -> bool {
    true
}

/// Subset of the OpenAI chat request this server honours. Sampling fields
/// sent by clients are accepted and ignored.
#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default = "default_stream")]
    stream: bool,
}

#[derive(Serialize)]
struct ChatCompletionChunk<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: [ChunkChoice; 1],
}

#[derive(Serialize)]
struct ChunkChoice {
    index: u32,
    delta: ChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Serialize)]
struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletion {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: [CompletionChoice; 1],
}

#[derive(Serialize)]
struct CompletionChoice {
    index: u32,
    message: ChatMessage,
    finish_reason: &'static str,
}

fn chunk_event(
    id: &str,
    created: i64,
    model: &str,
    content: Option<String>,
    finish_reason: Option<&'static str>,
) -> Result<Event, Infallible> {
    let chunk = ChatCompletionChunk {
        id,
        object: "chat.completion.chunk",
        created,
        model,
        choices: [ChunkChoice {
            index: 0,
            delta: ChunkDelta { content },
            finish_reason,
        }],
    };
    let data = serde_json::to_string(&chunk).unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode completion chunk");
        "{}".to_string()
    });
    Ok(Event::default().data(data))
}

async fn handle_chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;

    let Some((last, history)) = request.messages.split_last() else {
        return Err(RagError::NoMessagesProvided.into());
    };

    let events = state.chat.chat_stream(&last.content, history).await?;

    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = chrono::Utc::now().timestamp();
    let model = request
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.server.model_id.clone());
    let base_url = state.chat.llm().base_url().to_string();

    if !request.stream {
        let content: String = events
            .map(|event| event.render(&base_url))
            .collect::<Vec<_>>()
            .await
            .concat();
        let completion = ChatCompletion {
            id,
            object: "chat.completion",
            created,
            model,
            choices: [CompletionChoice {
                index: 0,
                message: ChatMessage::assistant(content),
                finish_reason: "stop",
            }],
        };
        return Ok(Json(completion).into_response());
    }

    let (stream_id, stream_model) = (id.clone(), model.clone());
    let content = events.map(move |event: StreamEvent| {
        chunk_event(
            &stream_id,
            created,
            &stream_model,
            Some(event.render(&base_url)),
            None,
        )
    });
    let finish = stream::once(async move { chunk_event(&id, created, &model, None, Some("stop")) });
    let done = stream::once(async { Ok::<_, Infallible>(Event::default().data("[DONE]")) });

    Ok(Sse::new(content.chain(finish).chain(done))
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ============ POST /api/v1/ingest/file ============

#[derive(Debug, Serialize)]
struct IngestResponse {
    filename: String,
    status: &'static str,
    chunks_count: usize,
}

async fn handle_ingest_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("Uploaded file has no filename"))?;
        let mut upload = state.ingest.stage(&filename)?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            upload.write(&chunk).await?;
        }

        return match state.ingest.ingest_staged(upload).await {
            Ok(doc) => Ok(Json(IngestResponse {
                filename: doc.filename,
                status: "success",
                chunks_count: doc.chunks.len(),
            })),
            Err(e) => {
                if e.is_client_error() {
                    warn!(filename = %filename, error = %e, "ingestion rejected");
                } else {
                    error!(filename = %filename, error = ?e, "ingestion failed");
                }
                Err(e.into())
            }
        };
    }

    Err(bad_request("Missing multipart field 'file'"))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    let status = err.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "bad_request"
    };
    AppError::new(status, code, err.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_error_status_mapping() {
        let cases = [
            (RagError::UnsupportedFormat("exe".into()), StatusCode::BAD_REQUEST),
            (RagError::EmptyDocument, StatusCode::BAD_REQUEST),
            (RagError::ExtractionFailed("bad".into()), StatusCode::BAD_REQUEST),
            (RagError::NoMessagesProvided, StatusCode::BAD_REQUEST),
            (
                RagError::VectorStoreUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RagError::UnexpectedInternal(anyhow::anyhow!("secret path /etc/x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_internal_errors_are_redacted() {
        let err = AppError::from(RagError::UnexpectedInternal(anyhow::anyhow!(
            "secret path /etc/x"
        )));
        assert_eq!(err.message, "Internal server error");
    }

    #[test]
    fn test_unsupported_format_message() {
        let err = AppError::from(RagError::UnsupportedFormat("exe".into()));
        assert_eq!(err.message, "Only PDF, TXT, MD files supported");
        assert_eq!(err.code, "unsupported_format");
    }
}
