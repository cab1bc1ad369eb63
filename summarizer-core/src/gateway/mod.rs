//! # Request Gateway
//!
//! The single entry point between the HTTP surface and the configured
//! inference backend. Every request goes through the same pipeline:
//! validation, readiness short-circuit, parameter merge, one bounded backend
//! call, and composition of the result. The gateway holds no per-request
//! state; the readiness tracker and the adapter's own handle are the only
//! shared state.

mod server;

pub use server::{SharedGateway, router, serve};

use crate::backends::{InferenceBackend, load_with_retry};
use crate::composer;
use crate::config::{GatewayConfig, RetryConfig};
use crate::error::BackendError;
use crate::readiness::ReadinessTracker;
use crate::types::{BackendKind, GenerationParams, InferenceRequest, InferenceResult, Readiness, Task};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Normalizes one backend behind a single request/response contract.
pub struct RequestGateway {
    backend: Arc<dyn InferenceBackend>,
    tracker: Arc<ReadinessTracker>,
    config: GatewayConfig,
    started_at: Instant,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("backend", &self.backend.name())
            .field("kind", &self.backend.describe())
            .field("readiness", &self.tracker.readiness())
            .field("config", &self.config)
            .finish()
    }
}

impl RequestGateway {
    /// Wrap a backend. The tracker starts in the kind's initial state.
    pub fn new(backend: Arc<dyn InferenceBackend>, config: GatewayConfig) -> Self {
        let tracker = Arc::new(ReadinessTracker::new(backend.describe()));
        Self {
            backend,
            tracker,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    pub fn tracker(&self) -> &Arc<ReadinessTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Default delay advertised with transient errors.
    pub fn retry_after_secs(&self) -> u64 {
        self.config.retry_after_secs
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Drive the backend's load phase and publish the outcome to the tracker.
    ///
    /// A local model gets one attempt. A serverless function is retried with
    /// backoff, reporting unavailable between attempts. Hosted APIs have no
    /// load phase.
    pub async fn load_backend(&self, retry: &RetryConfig) -> Result<(), BackendError> {
        let kind = self.backend.describe();
        if !kind.requires_local_readiness() {
            return Ok(());
        }

        self.tracker.mark_loading();
        let started = Instant::now();
        let result = match kind {
            BackendKind::ServerlessGpu => {
                load_with_retry(self.backend.as_ref(), retry, |e| {
                    self.tracker.mark_unavailable(e.to_string());
                })
                .await
            }
            _ => self.backend.load().await,
        };

        match &result {
            Ok(()) => {
                self.tracker.mark_ready();
                info!(
                    backend = %kind,
                    name = %self.backend.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backend load complete"
                );
            }
            Err(e) => {
                self.tracker.mark_unavailable(e.to_string());
                error!(backend = %kind, error = %e, "Backend load failed");
            }
        }
        result
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, request: InferenceRequest) -> Result<InferenceResult, BackendError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "inference",
            %request_id,
            task = %request.task,
            backend = %self.backend.describe(),
        );
        self.handle_inner(request).instrument(span).await
    }

    async fn handle_inner(&self, request: InferenceRequest) -> Result<InferenceResult, BackendError> {
        let started = Instant::now();
        let result = self.run(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(r) => info!(
                latency_ms,
                input_length = r.input_length,
                output_length = r.output_length,
                "Inference succeeded"
            ),
            Err(e @ BackendError::Internal { message }) => error!(
                latency_ms,
                error = e.kind(),
                detail = %message,
                "Inference failed"
            ),
            Err(e) => warn!(latency_ms, error = e.kind(), detail = %e, "Inference failed"),
        }
        result
    }

    async fn run(&self, request: &InferenceRequest) -> Result<InferenceResult, BackendError> {
        validate_request(request, &self.config, self.backend.as_ref())?;

        if self.backend.describe().requires_local_readiness() && !self.tracker.is_ready() {
            return Err(match self.tracker.readiness() {
                Readiness::Unavailable => BackendError::Unavailable {
                    reason: self
                        .tracker
                        .unavailable_reason()
                        .unwrap_or_else(|| "backend failed to load".to_string()),
                },
                _ => BackendError::Loading {
                    retry_after_secs: None,
                },
            });
        }

        let params = GenerationParams::merge(&request.parameters, &self.backend.param_limits())?;
        let ceiling = self.backend.call_timeout(&params);

        let output = tokio::time::timeout(
            ceiling,
            self.backend.infer(request.task, &request.text, &params),
        )
        .await
        .map_err(|_| BackendError::timeout(ceiling))?
        .inspect_err(|e| {
            if e.is_transient() {
                self.tracker.mark_unavailable(e.to_string());
            }
        })?;

        let languages = self.backend.languages();
        Ok(composer::compose(
            request.task,
            &request.text,
            output,
            languages.as_ref(),
        ))
    }
}

/// Check a request against input bounds and backend capabilities.
///
/// Runs before any backend work; a failure here never reaches the adapter.
pub fn validate_request(
    request: &InferenceRequest,
    config: &GatewayConfig,
    backend: &dyn InferenceBackend,
) -> Result<(), BackendError> {
    if request.text.trim().chars().count() < request.task.min_chars() {
        return Err(BackendError::invalid_input("Text is too short or empty"));
    }
    let length = request.text.chars().count();
    if length > config.max_input_chars {
        return Err(BackendError::invalid_input(format!(
            "Text is too long ({length} characters, maximum {})",
            config.max_input_chars
        )));
    }
    if !backend.supports(request.task) {
        return Err(BackendError::invalid_input(match request.task {
            Task::Translate => "Translation is not supported by the configured backend".to_string(),
            task => format!("Task '{task}' is not supported by the configured backend"),
        }));
    }
    Ok(())
}
