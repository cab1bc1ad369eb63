//! Hosted inference API adapter.
//!
//! Talks to a task-specific model endpoint in the Hugging Face Inference API
//! format: `{"inputs": .., "parameters": {..}}` in, `[{"summary_text": ..}]`
//! or `[{"translation_text": ..}]` out. The provider keeps models warm on its
//! side, so there is no local load phase; a cold model shows up per call as
//! HTTP 503.

use super::InferenceBackend;
use super::http::{build_client, send_json, with_auth};
use crate::config::{ApiToken, HostedApiConfig};
use crate::error::BackendError;
use crate::types::{BackendKind, BackendOutput, GenerationParams, LanguagePair, Task};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Adapter for a third-party hosted inference API.
pub struct HostedApiBackend {
    client: Client,
    summarize_url: String,
    translate_url: Option<String>,
    api_token: Option<ApiToken>,
    timeout: Duration,
    languages: LanguagePair,
}

impl HostedApiBackend {
    pub fn new(config: &HostedApiConfig) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout.min(Duration::from_secs(10)))?,
            summarize_url: config.summarize_url.clone(),
            translate_url: config.translate_url.clone(),
            api_token: config.api_token.clone(),
            timeout,
            languages: config.languages(),
        })
    }

    fn url_for(&self, task: Task) -> Result<&str, BackendError> {
        match task {
            Task::Summarize => Ok(&self.summarize_url),
            Task::Translate => self.translate_url.as_deref().ok_or_else(|| {
                BackendError::invalid_input("Translation is not supported by the configured backend")
            }),
        }
    }

    /// Build the provider request body for a task.
    fn request_body(task: Task, text: &str, params: &GenerationParams) -> Value {
        let mut body = json!({
            "inputs": text,
            "options": { "wait_for_model": false },
        });
        if task == Task::Summarize {
            body["parameters"] = json!({
                "max_length": params.max_length,
                "min_length": params.min_length,
                "do_sample": false,
            });
        }
        body
    }

    /// Extract the generated text from a provider response.
    fn parse_response(task: Task, body: &Value) -> Result<BackendOutput, BackendError> {
        let item = match body {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(body),
            _ => None,
        }
        .ok_or_else(|| BackendError::internal("Upstream response has no results"))?;

        let primary = match task {
            Task::Summarize => "summary_text",
            Task::Translate => "translation_text",
        };
        let text = item
            .get(primary)
            .or_else(|| item.get("generated_text"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::internal(format!("Upstream response missing '{primary}'"))
            })?;

        let reported_length = item
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
impl InferenceBackend for HostedApiBackend {
    fn describe(&self) -> BackendKind {
        BackendKind::HostedApi
    }

    fn name(&self) -> &str {
        &self.summarize_url
    }

    fn supports(&self, task: Task) -> bool {
        self.url_for(task).is_ok()
    }

    fn languages(&self) -> Option<LanguagePair> {
        self.translate_url.as_ref().map(|_| self.languages.clone())
    }

    fn call_timeout(&self, _params: &GenerationParams) -> Duration {
        self.timeout
    }

    async fn infer(
        &self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<BackendOutput, BackendError> {
        let url = self.url_for(task)?;
        let body = Self::request_body(task, text, params);

        debug!(url = %url, task = %task, "Sending hosted inference request");

        let request = with_auth(self.client.post(url).json(&body), self.api_token.as_ref());
        let json = send_json(request, self.timeout).await?;
        Self::parse_response(task, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_summarize() {
        let body = HostedApiBackend::request_body(
            Task::Summarize,
            "Some text",
            &GenerationParams::default(),
        );
        assert_eq!(body["inputs"], "Some text");
        assert_eq!(body["parameters"]["max_length"], 150);
        assert_eq!(body["parameters"]["min_length"], 30);
        assert_eq!(body["parameters"]["do_sample"], false);
        assert_eq!(body["options"]["wait_for_model"], false);
    }

    #[test]
    fn test_request_body_translate_has_no_length_knobs() {
        let body =
            HostedApiBackend::request_body(Task::Translate, "Hello", &GenerationParams::default());
        assert!(body.get("parameters").is_none());
    }

    #[test]
    fn test_parse_summary_array() {
        let out = HostedApiBackend::parse_response(
            Task::Summarize,
            &json!([{"summary_text": "Short."}]),
        )
        .unwrap();
        assert_eq!(out.text, "Short.");
        assert_eq!(out.reported_length, None);
    }

    #[test]
    fn test_parse_translation_object() {
        let out = HostedApiBackend::parse_response(
            Task::Translate,
            &json!({"translation_text": "Bonjour"}),
        )
        .unwrap();
        assert_eq!(out.text, "Bonjour");
    }

    #[test]
    fn test_parse_generated_text_fallback() {
        let out = HostedApiBackend::parse_response(
            Task::Summarize,
            &json!([{"generated_text": "Gist."}]),
        )
        .unwrap();
        assert_eq!(out.text, "Gist.");
    }

    #[test]
    fn test_parse_malformed_is_internal() {
        let err = HostedApiBackend::parse_response(Task::Summarize, &json!([])).unwrap_err();
        assert!(matches!(err, BackendError::Internal { .. }));

        let err =
            HostedApiBackend::parse_response(Task::Summarize, &json!([{"label": "POSITIVE"}]))
                .unwrap_err();
        assert!(matches!(err, BackendError::Internal { .. }));
    }

    #[test]
    fn test_translate_unsupported_without_url() {
        let config = HostedApiConfig {
            translate_url: None,
            ..HostedApiConfig::default()
        };
        let backend = HostedApiBackend::new(&config).unwrap();
        assert!(backend.supports(Task::Summarize));
        assert!(!backend.supports(Task::Translate));
        assert!(backend.languages().is_none());
    }
}
