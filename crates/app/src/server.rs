//! JSON HTTP API over the document store and search orchestrator.
//!
//! | Method   | Path                          | Description                          |
//! |----------|-------------------------------|--------------------------------------|
//! | `POST`   | `/documents`                  | Process and index one document       |
//! | `GET`    | `/documents`                  | List indexed documents               |
//! | `POST`   | `/documents/batch`            | Process a batch of documents         |
//! | `GET`    | `/documents/memory-stats`     | Aggregate index statistics           |
//! | `GET`    | `/documents/{id}/stats`       | Per-document index statistics        |
//! | `DELETE` | `/documents/{id}`             | Evict a document (idempotent)        |
//! | `POST`   | `/search`                     | Tiered relevance search              |
//! | `POST`   | `/ask`                        | Evidence-grounded question answering |
//! | `GET`    | `/ping`                       | Health check with version            |
//!
//! Errors use one JSON shape:
//! `{ "success": false, "error": { "code": ..., "message": ... } }`.

use askdoc_core::{
    evidence, AnswerGenerator, DocumentStore, HttpRemoteIndex, IngestError, ProcessingRequest,
    SearchError, SearchOrchestrator, SearchResult, WebResult, WebSearcher,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const WEB_RESULT_LIMIT: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub orchestrator: Arc<SearchOrchestrator<HttpRemoteIndex>>,
    pub web: Arc<dyn WebSearcher>,
    pub generator: Arc<dyn AnswerGenerator>,
}

pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!(bind, "http server listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(handle_process).get(handle_list))
        .route("/documents/batch", post(handle_process_batch))
        .route("/documents/memory-stats", get(handle_memory_stats))
        .route("/documents/{id}/stats", get(handle_document_stats))
        .route("/documents/{id}", delete(handle_clear))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .route("/ping", get(handle_ping))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

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
            success: false,
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Hard rejections and a filePath that does not exist are the caller's
/// fault; everything else that escapes the pipeline is a server-side
/// failure.
fn classify_ingest_error(error: IngestError) -> AppError {
    let caller_fault = error.is_hard_rejection()
        || matches!(&error, IngestError::Io(io) if io.kind() == std::io::ErrorKind::NotFound);
    if caller_fault {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", error.to_string())
    } else {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "processing_failed",
            error.to_string(),
        )
    }
}

fn classify_search_error(error: SearchError) -> AppError {
    match error {
        SearchError::Request(message) => {
            AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
        }
        SearchError::NotFound(message) => {
            AppError::new(StatusCode::NOT_FOUND, "not_found", message)
        }
        SearchError::Timeout(after) => AppError::new(
            StatusCode::REQUEST_TIMEOUT,
            "timeout",
            format!("search timed out after {after:?}"),
        ),
        SearchError::Unavailable(message) | SearchError::BackendUnavailable(message) => {
            AppError::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
        }
        other => AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            other.to_string(),
        ),
    }
}

/// Maps answer-generation failures onto error codes by message content, so
/// callers can tell a missing provider credential from a network blip.
fn classify_answer_failure(message: &str) -> (StatusCode, &'static str) {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        (StatusCode::REQUEST_TIMEOUT, "timeout")
    } else if lower.contains("credential")
        || lower.contains("unauthorized")
        || lower.contains("api key")
    {
        (StatusCode::UNAUTHORIZED, "credentials")
    } else if lower.contains("connect") || lower.contains("network") || lower.contains("dns") {
        (StatusCode::BAD_GATEWAY, "network")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed")
    }
}

// ============ Documents ============

async fn handle_process(
    State(state): State<AppState>,
    Json(request): Json<ProcessingRequest>,
) -> Result<Response, AppError> {
    let stats = state
        .store
        .process_document(&request)
        .await
        .map_err(classify_ingest_error)?;
    Ok((StatusCode::CREATED, Json(stats)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    documents: Vec<ProcessingRequest>,
}

async fn handle_process_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Response, AppError> {
    if request.documents.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "batch must name at least one document",
        ));
    }
    let outcome = state.store.process_batch(request.documents).await;
    Ok(Json(outcome).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    documents: Vec<askdoc_core::IndexStats>,
    total: usize,
}

/// Only successfully processed documents appear here; rejected uploads are
/// never indexed.
async fn handle_list(State(state): State<AppState>) -> Json<ListResponse> {
    let mut documents: Vec<_> = state
        .store
        .snapshot(None)
        .await
        .iter()
        .map(|index| index.stats())
        .collect();
    documents.sort_by(|left, right| left.document_id.cmp(&right.document_id));
    Json(ListResponse {
        total: documents.len(),
        documents,
    })
}

async fn handle_document_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match state.store.stats(&id).await {
        Some(stats) => Ok(Json(stats).into_response()),
        None => Err(AppError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("document not indexed: {id}"),
        )),
    }
}

async fn handle_memory_stats(State(state): State<AppState>) -> Response {
    Json(state.store.memory_stats().await).into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearResponse {
    document_id: String,
    cleared: bool,
}

async fn handle_clear(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let cleared = state.store.clear(&id).await;
    Json(ClearResponse {
        document_id: id,
        cleared,
    })
    .into_response()
}

// ============ Search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(default)]
    document_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    results: Vec<SearchResult>,
    total_results: usize,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state
        .orchestrator
        .search(&request.query, request.document_ids.as_deref())
        .await
        .map_err(classify_search_error)?;
    Ok(Json(SearchResponse {
        total_results: results.len(),
        results,
    }))
}

// ============ Ask ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    query: String,
    user_id: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    web_search: bool,
    #[serde(default)]
    ai_provider: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskSources {
    documents: Vec<SearchResult>,
    web: Vec<WebResult>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    answer: String,
    sources: AskSources,
    evidence_type: askdoc_core::EvidenceType,
    confidence: f64,
    /// Wall-clock milliseconds spent producing this answer.
    response_time: u64,
    no_doc_evidence: bool,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bad_request",
            "query is empty",
        ));
    }
    let started = Instant::now();
    info!(
        user = %request.user_id,
        session = request.session_id.as_deref().unwrap_or("-"),
        provider = request.ai_provider.as_deref().unwrap_or("default"),
        web_search = request.web_search,
        "ask received"
    );

    // Search failures degrade to an empty document tier so the answer can
    // still report the absence of evidence instead of a hard error.
    let documents = match state.orchestrator.search(&request.query, None).await {
        Ok(results) => results,
        Err(SearchError::Request(message)) => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "bad_request",
                message,
            ));
        }
        Err(error) => {
            warn!(%error, "document search failed, answering without document evidence");
            Vec::new()
        }
    };

    let web = match evidence::web_search_role(documents.is_empty(), request.web_search) {
        Some(_) => match state.web.search_web(&request.query, WEB_RESULT_LIMIT).await {
            Ok(results) => results,
            Err(error) => {
                warn!(%error, "web search failed, continuing without web evidence");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let bundle = evidence::assemble(documents, web);
    let answer = state
        .generator
        .generate(&request.query, &bundle)
        .await
        .map_err(|error| {
            let (status, code) = classify_answer_failure(&error.to_string());
            AppError::new(status, code, error.to_string())
        })?;

    Ok(Json(AskResponse {
        answer,
        evidence_type: bundle.evidence_type,
        confidence: bundle.confidence,
        response_time: started.elapsed().as_millis() as u64,
        no_doc_evidence: bundle.no_doc_evidence,
        sources: AskSources {
            documents: bundle.document_sources,
            web: bundle.web_sources,
        },
    }))
}

// ============ Ping ============

#[derive(Serialize)]
struct PingResponse {
    status: String,
    version: String,
}

async fn handle_ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
