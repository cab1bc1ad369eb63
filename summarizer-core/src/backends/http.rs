//! HTTP plumbing shared by the remote adapters.

use crate::config::ApiToken;
use crate::error::BackendError;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Longest upstream body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Build the shared client. Per-call ceilings are set on each request.
pub(crate) fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| BackendError::internal(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn with_auth(builder: RequestBuilder, token: Option<&ApiToken>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token.expose()),
        None => builder,
    }
}

/// Map a non-success upstream status to the appropriate `BackendError`.
///
/// 503 means the model is cold-starting on the provider side.
pub(crate) fn map_http_error(status: StatusCode, body: &str) -> BackendError {
    match status.as_u16() {
        503 => {
            let estimate = estimated_time_secs(body);
            debug!(body = %truncate(body), estimate = ?estimate, "Upstream model loading (503)");
            BackendError::Loading {
                retry_after_secs: estimate,
            }
        }
        status => BackendError::Upstream {
            status,
            message: upstream_message(body),
        },
    }
}

/// Map a transport-level failure.
pub(crate) fn map_transport_error(err: reqwest::Error, ceiling: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::timeout(ceiling)
    } else if err.is_connect() {
        BackendError::Unavailable {
            reason: format!("Connection to upstream failed: {err}"),
        }
    } else if err.is_decode() {
        BackendError::internal(format!("Failed to decode upstream response: {err}"))
    } else {
        BackendError::Upstream {
            status: 502,
            message: format!("Upstream request failed: {err}"),
        }
    }
}

/// Send a request and return the body of a successful response as JSON.
pub(crate) async fn send_json(
    request: RequestBuilder,
    ceiling: Duration,
) -> Result<Value, BackendError> {
    let response = request
        .timeout(ceiling)
        .send()
        .await
        .map_err(|e| map_transport_error(e, ceiling))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, ceiling))?;

    if !status.is_success() {
        return Err(map_http_error(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        BackendError::internal(format!(
            "Invalid JSON from upstream: {e} (body: {})",
            truncate(&body)
        ))
    })
}

/// Hugging Face style `{"estimated_time": 20.3}` cold-start hint.
fn estimated_time_secs(body: &str) -> Option<u64> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("estimated_time")?
        .as_f64()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

/// Prefer the provider's `{"error": ..}` message, else the raw body.
fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| match v.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(o)) => o.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    });
    match message {
        Some(m) => m,
        None if body.trim().is_empty() => "Upstream returned an empty error body".to_string(),
        None => truncate(body),
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
