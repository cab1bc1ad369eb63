//! HTTP surface built on axum.

use super::RequestGateway;
use crate::error::BackendError;
use crate::types::{InferenceRequest, InferenceResult, Readiness, Task};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<RequestGateway>;

/// Body accepted by both task endpoints: `text` plus any generation knobs.
#[derive(Debug, Deserialize)]
struct TaskBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(flatten)]
    parameters: BTreeMap<String, Value>,
}

impl TaskBody {
    fn into_request(self, task: Task) -> InferenceRequest {
        InferenceRequest {
            text: self.text.unwrap_or_default(),
            task,
            parameters: self.parameters,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummarizeResponse {
    summary: String,
    original_length: usize,
    summary_length: usize,
}

#[derive(Debug, Serialize)]
struct TranslateResponse {
    translated_text: String,
    original_text: String,
    source_lang: String,
    target_lang: String,
}

/// An error rendered as `{"detail": ...}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
    retry_after: Option<u64>,
}

impl ApiError {
    fn from_backend(err: &BackendError, default_retry_secs: u64) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            detail: err.public_message(default_retry_secs),
            retry_after: err
                .is_transient()
                .then(|| err.retry_after(default_retry_secs)),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
            retry_after: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "detail": self.detail }))).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Build the axum Router with the service endpoints.
pub fn router(gateway: SharedGateway) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/summarize", post(summarize_handler))
        .route("/translate", post(translate_handler))
        .with_state(gateway)
}

/// Service descriptor.
async fn root_handler(State(gw): State<SharedGateway>) -> Json<Value> {
    let backend = gw.backend();
    let operations: Vec<&str> = [
        (Task::Summarize, "POST /summarize"),
        (Task::Translate, "POST /translate"),
    ]
    .into_iter()
    .filter(|(task, _)| backend.supports(*task))
    .map(|(_, route)| route)
    .chain(["GET /health"])
    .collect();

    Json(json!({
        "status": "ok",
        "service": "summarizer",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": {
            "kind": backend.describe(),
            "name": backend.name(),
            "readiness": gw.tracker().readiness(),
        },
        "operations": operations,
        "uptime_secs": gw.uptime_secs(),
    }))
}

/// Health check. Always 200; the body carries the readiness.
async fn health_handler(State(gw): State<SharedGateway>) -> Json<Value> {
    let status = match gw.tracker().readiness() {
        Readiness::Ready => "healthy",
        Readiness::Loading => "loading",
        Readiness::Unavailable => "unavailable",
    };
    Json(json!({
        "status": status,
        "model_loaded": gw.tracker().is_ready(),
    }))
}

async fn run_task(
    gw: &RequestGateway,
    task: Task,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<(InferenceRequest, InferenceResult), ApiError> {
    let Json(body) = payload?;
    let request = body.into_request(task);
    let result = gw
        .handle(request.clone())
        .await
        .map_err(|e| ApiError::from_backend(&e, gw.retry_after_secs()))?;
    Ok((request, result))
}

async fn summarize_handler(
    State(gw): State<SharedGateway>,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<Json<SummarizeResponse>, ApiError> {
    let (_, result) = run_task(&gw, Task::Summarize, payload).await?;
    Ok(Json(SummarizeResponse {
        summary: result.output_text,
        original_length: result.input_length,
        summary_length: result.output_length,
    }))
}

async fn translate_handler(
    State(gw): State<SharedGateway>,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let (request, result) = run_task(&gw, Task::Translate, payload).await?;
    Ok(Json(TranslateResponse {
        translated_text: result.output_text,
        original_text: request.text,
        source_lang: result.source_lang.unwrap_or_default(),
        target_lang: result.target_lang.unwrap_or_default(),
    }))
}

/// Serve the router on `listener` until `shutdown` resolves.
///
/// `max_concurrency` caps in-flight requests across all routes; 0 disables
/// the cap.
pub async fn serve<F>(
    gateway: SharedGateway,
    listener: TcpListener,
    max_concurrency: usize,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut app = router(gateway);
    if max_concurrency > 0 {
        app = app.layer(GlobalConcurrencyLimitLayer::new(max_concurrency));
    }
    let app = app.layer(TraceLayer::new_for_http());

    let addr = listener.local_addr()?;
    info!(%addr, max_concurrency, "Summarizer listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
