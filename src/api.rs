use crate::document::{DocumentRecord, SearchResult};
use crate::engine::Searcher;
use crate::error::Error;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// ========== Request/Response Types ==========

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub length: u32,
}

impl From<DocumentRecord> for DocumentResponse {
    fn from(record: DocumentRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            body: record.body,
            url: record.url,
            length: record.length,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_documents: u64,
    pub total_terms: usize,
    pub avg_document_length: f64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

// ========== Error Handling ==========

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MalformedInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        if status.is_server_error() {
            tracing::error!("API error: {}", message);
        }

        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::MalformedInput(rejection.body_text()))
    }
}

// ========== Handlers ==========

#[derive(Clone)]
struct AppState {
    searcher: Arc<Searcher>,
    default_limit: usize,
}

async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success("OK"))
}

async fn search_documents(
    State(state): State<AppState>,
    query: Result<Query<SearchRequest>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(req) = query?;
    let limit = req.limit.unwrap_or(state.default_limit);
    let results = state.searcher.search_results(&req.q, limit)?;

    Ok(Json(ApiResponse::success(SearchResponse {
        query: req.q,
        total: results.len(),
        results,
    })))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.searcher.document(&id)?;
    Ok(Json(ApiResponse::success(DocumentResponse::from(record))))
}

async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.searcher.stats()?;

    Ok(Json(ApiResponse::success(StatsResponse {
        total_documents: stats.total_documents,
        total_terms: stats.total_terms,
        avg_document_length: stats.avg_document_length,
    })))
}

// ========== Router ==========

/// Read-only JSON search API. Document ids may contain `/`, so the
/// document route captures the rest of the path.
pub fn create_router(searcher: Arc<Searcher>, default_limit: usize) -> Router {
    let state = AppState {
        searcher,
        default_limit,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/search", get(search_documents))
        .route("/documents/*id", get(get_document))
        .route("/stats", get(get_stats))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
