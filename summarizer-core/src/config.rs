//! Configuration system for the summarizer gateway.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. The process reads `summarizer.toml` from the working directory
//! (or an explicit path), then `SUMMARIZER_`-prefixed variables, then the
//! plain deployment variables `PORT`, `BACKEND`, and `HF_API_TOKEN`.

use crate::error::ConfigError;
use crate::types::{BackendKind, LanguagePair};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "summarizer.toml";

/// Top-level configuration for the summarizer service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub gateway: GatewayConfig,
    pub deployment: DeploymentConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Request-handling policy of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Delay advertised to callers when the backend is loading.
    pub retry_after_secs: u64,
    /// Longest input accepted, in characters.
    pub max_input_chars: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry_after_secs: 20,
            max_input_chars: 20_000,
        }
    }
}

/// Which backend serves requests, and the settings for each kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub local: LocalModelConfig,
    pub hosted: HostedApiConfig,
    pub serverless: ServerlessConfig,
    /// Backoff for startup loads of remote backends.
    pub load_retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::HostedApi,
            local: LocalModelConfig::default(),
            hosted: HostedApiConfig::default(),
            serverless: ServerlessConfig::default(),
            load_retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(base.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Local inference runtime selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalRuntime {
    /// Built-in deterministic lead-sentence extractor.
    Extractive,
    /// External inference executable driven over stdin/stdout.
    Command,
}

/// Settings for the in-process model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModelConfig {
    pub runtime: LocalRuntime,
    /// Identifier reported in the service descriptor.
    pub model_id: String,
    /// Executable for the `command` runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// Arguments passed on every generation call.
    pub args: Vec<String>,
    /// Arguments used once at load time to verify the executable runs.
    pub probe_args: Vec<String>,
    /// Fixed part of the generation timeout.
    pub timeout_base_secs: u64,
    /// Additional timeout per requested output unit.
    pub timeout_per_token_ms: u64,
    pub source_lang: String,
    pub target_lang: String,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            runtime: LocalRuntime::Extractive,
            model_id: "extractive-lead".to_string(),
            program: None,
            args: Vec::new(),
            probe_args: vec!["--version".to_string()],
            timeout_base_secs: 60,
            timeout_per_token_ms: 25,
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
        }
    }
}

impl LocalModelConfig {
    /// Generation-length heuristic: base + per-unit cost of the requested output.
    pub fn timeout_for(&self, max_length: u32) -> Duration {
        Duration::from_secs(self.timeout_base_secs)
            + Duration::from_millis(self.timeout_per_token_ms * u64::from(max_length))
    }

    pub fn languages(&self) -> LanguagePair {
        LanguagePair::new(&self.source_lang, &self.target_lang)
    }
}

/// Settings for the third-party hosted inference API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostedApiConfig {
    pub summarize_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<ApiToken>,
    pub timeout_secs: u64,
    pub source_lang: String,
    pub target_lang: String,
}

impl Default for HostedApiConfig {
    fn default() -> Self {
        Self {
            summarize_url:
                "https://api-inference.huggingface.co/models/sshleifer/distilbart-cnn-12-6"
                    .to_string(),
            translate_url: Some(
                "https://api-inference.huggingface.co/models/Helsinki-NLP/opus-mt-en-fr"
                    .to_string(),
            ),
            api_token: None,
            timeout_secs: 30,
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
        }
    }
}

impl HostedApiConfig {
    pub fn languages(&self) -> LanguagePair {
        LanguagePair::new(&self.source_lang, &self.target_lang)
    }
}

/// Settings for the remote serverless GPU function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerlessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<ApiToken>,
    /// Ceiling for invocations that may hit a cold container.
    pub cold_timeout_secs: u64,
    /// Ceiling for invocations against a warm container.
    pub warm_timeout_secs: u64,
    /// Send one warm-up invocation at startup.
    pub warmup: bool,
    pub source_lang: String,
    pub target_lang: String,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_token: None,
            cold_timeout_secs: 600,
            warm_timeout_secs: 60,
            warmup: true,
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
        }
    }
}

impl ServerlessConfig {
    pub fn languages(&self) -> LanguagePair {
        LanguagePair::new(&self.source_lang, &self.target_lang)
    }
}

/// Deployment shape of the process.
///
/// Consumed by the entry point only; the gateway never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    /// Idle time after which a serverless container is assumed cold.
    pub idle_timeout_secs: u64,
    /// Maximum in-flight HTTP requests (0 = unlimited).
    pub max_concurrency: usize,
    pub min_containers: u32,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            gpu: None,
            cpu: None,
            memory_mb: None,
            idle_timeout_secs: 300,
            max_concurrency: 0,
            min_containers: 0,
        }
    }
}

/// Logging output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable output.
    pub json: bool,
    /// Directory for daily-rolling JSON log files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// A bearer credential. Never printed or serialized in clear.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<redacted>)")
    }
}

impl Serialize for ApiToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<redacted>")
    }
}

impl ServiceConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.max_input_chars == 0 {
            return Err(invalid("gateway.max_input_chars must be positive"));
        }

        match self.backend.kind {
            BackendKind::HostedApi => {
                let hosted = &self.backend.hosted;
                check_url("backend.hosted.summarize_url", &hosted.summarize_url)?;
                if let Some(url) = &hosted.translate_url {
                    check_url("backend.hosted.translate_url", url)?;
                }
                if hosted.timeout_secs == 0 {
                    return Err(invalid("backend.hosted.timeout_secs must be positive"));
                }
            }
            BackendKind::ServerlessGpu => {
                let serverless = &self.backend.serverless;
                let url = serverless
                    .url
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingField {
                        field: "backend.serverless.url".to_string(),
                    })?;
                check_url("backend.serverless.url", url)?;
                if serverless.warm_timeout_secs == 0 || serverless.cold_timeout_secs == 0 {
                    return Err(invalid("backend.serverless timeouts must be positive"));
                }
                if serverless.cold_timeout_secs < serverless.warm_timeout_secs {
                    return Err(invalid(
                        "backend.serverless.cold_timeout_secs must not be shorter than warm_timeout_secs",
                    ));
                }
            }
            BackendKind::LocalModel => {
                let local = &self.backend.local;
                if local.runtime == LocalRuntime::Command {
                    match &local.program {
                        Some(program) if !program.as_os_str().is_empty() => {}
                        _ => {
                            return Err(ConfigError::MissingField {
                                field: "backend.local.program".to_string(),
                            });
                        }
                    }
                }
                if local.timeout_base_secs == 0 {
                    return Err(invalid("backend.local.timeout_base_secs must be positive"));
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        message: format!("{field} is not a valid URL: {e}"),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            message: format!("{field} must use http or https"),
        });
    }
    Ok(())
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. `PORT`, `BACKEND`, `HF_API_TOKEN`
/// 2. Environment variables prefixed with `SUMMARIZER_` (`SUMMARIZER_SERVER__PORT`, ...)
/// 3. The explicit config file, or `summarizer.toml` in the working directory
/// 4. Built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment
        .merge(Env::prefixed("SUMMARIZER_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
        .merge(Env::raw().only(&["BACKEND"]).map(|_| "backend.kind".into()))
        .merge(
            Env::raw()
                .only(&["HF_API_TOKEN"])
                .map(|_| "backend.hosted.api_token".into()),
        );

    let config: ServiceConfig = figment
        .extract()
        .map_err(|e| ConfigError::Parse(Box::new(e)))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.backend.kind, BackendKind::HostedApi);
        assert_eq!(config.gateway.retry_after_secs, 20);
        assert_eq!(config.backend.hosted.timeout_secs, 30);
        assert_eq!(config.backend.serverless.cold_timeout_secs, 600);
        assert_eq!(config.deployment.idle_timeout_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ServiceConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let restored: ServiceConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.server.port, config.server.port);
        assert_eq!(restored.backend.kind, config.backend.kind);
        assert_eq!(
            restored.backend.hosted.summarize_url,
            config.backend.hosted.summarize_url
        );
    }

    #[test]
    fn test_api_token_is_redacted() {
        let token = ApiToken::new("hf_secret");
        assert_eq!(format!("{token:?}"), "ApiToken(<redacted>)");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"<redacted>\"");
        assert_eq!(token.expose(), "hf_secret");
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(0), Duration::from_millis(2_000));
        assert_eq!(retry.backoff(1), Duration::from_millis(4_000));
        assert_eq!(retry.backoff(10), Duration::from_millis(60_000));
    }

    #[test]
    fn test_local_timeout_heuristic() {
        let local = LocalModelConfig::default();
        assert_eq!(local.timeout_for(0), Duration::from_secs(60));
        assert_eq!(local.timeout_for(200), Duration::from_secs(65));
    }

    #[test]
    fn test_validate_serverless_requires_url() {
        let mut config = ServiceConfig::default();
        config.backend.kind = BackendKind::ServerlessGpu;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "backend.serverless.url"));

        config.backend.serverless.url = Some("https://example.modal.run".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_serverless_timeout_order() {
        let mut config = ServiceConfig::default();
        config.backend.kind = BackendKind::ServerlessGpu;
        config.backend.serverless.url = Some("https://example.modal.run".into());
        config.backend.serverless.cold_timeout_secs = 10;
        config.backend.serverless.warm_timeout_secs = 60;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_command_runtime_requires_program() {
        let mut config = ServiceConfig::default();
        config.backend.kind = BackendKind::LocalModel;
        config.backend.local.runtime = LocalRuntime::Command;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = ServiceConfig::default();
        config.backend.hosted.summarize_url = "ftp://models.example".into();
        assert!(config.validate().is_err());
        config.backend.hosted.summarize_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_config_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [server]
                port = 9000

                [backend]
                kind = "local_model"

                [gateway]
                retry_after_secs = 45
                "#,
            )?;
            jail.set_env("SUMMARIZER_GATEWAY__MAX_INPUT_CHARS", "500");
            jail.set_env("PORT", "7070");

            let config = load_config(None).map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 7070);
            assert_eq!(config.backend.kind, BackendKind::LocalModel);
            assert_eq!(config.gateway.retry_after_secs, 45);
            assert_eq!(config.gateway.max_input_chars, 500);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_plain_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("BACKEND", "serverless_gpu");
            jail.set_env("SUMMARIZER_BACKEND__SERVERLESS__URL", "https://fn.example.run");
            jail.set_env("HF_API_TOKEN", "hf_abc");

            let config = load_config(None).map_err(|e| e.to_string())?;
            assert_eq!(config.backend.kind, BackendKind::ServerlessGpu);
            assert_eq!(
                config.backend.serverless.url.as_deref(),
                Some("https://fn.example.run")
            );
            assert_eq!(
                config.backend.hosted.api_token.as_ref().map(ApiToken::expose),
                Some("hf_abc")
            );
            Ok(())
        });
    }
}
