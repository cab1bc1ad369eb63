//! Inference backend adapters.
//!
//! Provides concrete implementations of the `InferenceBackend` trait for:
//! - An in-process local model (`local`)
//! - A third-party hosted inference API (`hosted`)
//! - A remote serverless GPU function (`serverless`)
//!
//! Every adapter classifies its provider's failures into `BackendError` at
//! this boundary. Use `create_backend()` to instantiate the configured one.

pub mod hosted;
mod http;
pub mod local;
pub mod mock;
mod prompt;
pub mod serverless;

use crate::config::{BackendConfig, DeploymentConfig, RetryConfig};
use crate::error::BackendError;
use crate::types::{BackendKind, BackendOutput, GenerationParams, LanguagePair, ParamLimits, Task};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use hosted::HostedApiBackend;
pub use local::{CommandModel, ExtractiveModel, LocalModel, LocalModelBackend};
pub use mock::MockBackend;
pub use serverless::ServerlessBackend;

/// Uniform interface over one concrete inference provider.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Which kind of provider this is.
    fn describe(&self) -> BackendKind;

    /// Model or endpoint identifier, for logs and the service descriptor.
    fn name(&self) -> &str;

    /// Whether the provider can perform the given task.
    fn supports(&self, task: Task) -> bool;

    /// Valid ranges for generation parameters.
    fn param_limits(&self) -> ParamLimits {
        ParamLimits::default()
    }

    /// Statically configured translation languages.
    fn languages(&self) -> Option<LanguagePair> {
        None
    }

    /// Ceiling the gateway applies around a single `infer` call.
    fn call_timeout(&self, params: &GenerationParams) -> Duration;

    /// Bring the backend to a servable state (load weights, warm a container).
    async fn load(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Run one inference call.
    async fn infer(
        &self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<BackendOutput, BackendError>;
}

/// Create the backend selected by the configuration.
pub fn create_backend(
    config: &BackendConfig,
    deployment: &DeploymentConfig,
) -> Result<Arc<dyn InferenceBackend>, BackendError> {
    match config.kind {
        BackendKind::LocalModel => Ok(Arc::new(LocalModelBackend::from_config(&config.local))),
        BackendKind::HostedApi => Ok(Arc::new(HostedApiBackend::new(&config.hosted)?)),
        BackendKind::ServerlessGpu => Ok(Arc::new(ServerlessBackend::new(
            &config.serverless,
            Duration::from_secs(deployment.idle_timeout_secs),
        )?)),
    }
}

/// Drive `backend.load()` with exponential backoff between failed attempts.
///
/// `on_failure` is invoked with each failure so the caller can publish it
/// (typically to the readiness tracker) before the next attempt.
pub async fn load_with_retry<F>(
    backend: &dyn InferenceBackend,
    config: &RetryConfig,
    mut on_failure: F,
) -> Result<(), BackendError>
where
    F: FnMut(&BackendError),
{
    let mut attempt = 0;
    loop {
        match backend.load().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                on_failure(&e);
                if attempt >= config.max_retries || matches!(e, BackendError::InvalidInput { .. }) {
                    return Err(e);
                }
                let backoff = config.backoff(attempt);
                tracing::warn!(
                    backend = %backend.name(),
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying backend load"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
