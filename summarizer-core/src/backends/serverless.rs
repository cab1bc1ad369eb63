//! Serverless GPU function adapter.
//!
//! Invokes a remote function endpoint with `{"prompt", "max_tokens",
//! "temperature"}` and reads `{"generated_text"}` back. The first call after
//! the provider has scaled the function to zero pays for container start and
//! model load, so calls are bounded by a cold ceiling unless the adapter has
//! seen a success within the idle window.

use super::InferenceBackend;
use super::http::{build_client, send_json, with_auth};
use super::prompt;
use crate::config::{ApiToken, ServerlessConfig};
use crate::error::BackendError;
use crate::types::{BackendKind, BackendOutput, GenerationParams, LanguagePair, Task};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Adapter for a remote serverless inference function.
pub struct ServerlessBackend {
    client: Client,
    url: String,
    api_token: Option<ApiToken>,
    cold_timeout: Duration,
    warm_timeout: Duration,
    idle_timeout: Duration,
    warmup: bool,
    languages: LanguagePair,
    last_success: Mutex<Option<Instant>>,
}

impl ServerlessBackend {
    /// `idle_timeout` is how long the provider keeps an idle container warm.
    pub fn new(config: &ServerlessConfig, idle_timeout: Duration) -> Result<Self, BackendError> {
        let url = config.url.clone().ok_or_else(|| {
            BackendError::internal("Serverless backend selected without a function URL")
        })?;
        Ok(Self {
            client: build_client(Duration::from_secs(30))?,
            url,
            api_token: config.api_token.clone(),
            cold_timeout: Duration::from_secs(config.cold_timeout_secs),
            warm_timeout: Duration::from_secs(config.warm_timeout_secs),
            idle_timeout,
            warmup: config.warmup,
            languages: config.languages(),
            last_success: Mutex::new(None),
        })
    }

    /// Whether a container is expected to still be warm.
    pub fn is_warm(&self) -> bool {
        self.last_success
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|at| at.elapsed() < self.idle_timeout)
    }

    fn record_success(&self) {
        if let Ok(mut last) = self.last_success.lock() {
            *last = Some(Instant::now());
        }
    }

    fn current_ceiling(&self) -> Duration {
        if self.is_warm() {
            self.warm_timeout
        } else {
            self.cold_timeout
        }
    }

    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<BackendOutput, BackendError> {
        let ceiling = self.current_ceiling();
        let body = json!({
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        debug!(
            url = %self.url,
            warm = self.is_warm(),
            ceiling_secs = ceiling.as_secs(),
            "Invoking serverless function"
        );

        let request = with_auth(self.client.post(&self.url).json(&body), self.api_token.as_ref());
        let json = send_json(request, ceiling).await?;
        let output = Self::parse_response(&json)?;
        self.record_success();
        Ok(output)
    }

    fn parse_response(body: &Value) -> Result<BackendOutput, BackendError> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(BackendError::internal(format!(
                "Serverless function reported an error: {error}"
            )));
        }
        let text = body
            .get("generated_text")
            .or_else(|| body.get("summary"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::internal("Serverless response missing 'generated_text'")
            })?;
        let reported_length = body
            .get("summary_length")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        Ok(BackendOutput {
            text: text.to_string(),
            reported_length,
        })
    }
}

#[async_trait]
impl InferenceBackend for ServerlessBackend {
    fn describe(&self) -> BackendKind {
        BackendKind::ServerlessGpu
    }

    fn name(&self) -> &str {
        &self.url
    }

    fn supports(&self, _task: Task) -> bool {
        true
    }

    fn languages(&self) -> Option<LanguagePair> {
        Some(self.languages.clone())
    }

    fn call_timeout(&self, _params: &GenerationParams) -> Duration {
        self.current_ceiling()
    }

    async fn load(&self) -> Result<(), BackendError> {
        if !self.warmup {
            return Ok(());
        }
        info!(url = %self.url, ceiling_secs = self.cold_timeout.as_secs(), "Warming serverless function");
        let started = Instant::now();
        self.invoke("ping", 1, 0.0).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Serverless function warm"
        );
        Ok(())
    }

    async fn infer(
        &self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<BackendOutput, BackendError> {
        let prompt = prompt::build(task, text, &self.languages);
        self.invoke(&prompt, params.max_tokens, params.temperature)
            .await
    }
}
