//! Error types for the summarizer gateway.
//!
//! Uses `thiserror` for public API error types. `BackendError` is the
//! classified taxonomy every adapter reports in; the HTTP layer only maps it
//! to status codes and never re-interprets it.

use std::path::PathBuf;

/// Classified failure of an inference request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Backend is loading")]
    Loading { retry_after_secs: Option<u64> },

    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Backend call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BackendError {
    /// Timeout for a ceiling, in whole seconds rounded up.
    pub fn timeout(ceiling: std::time::Duration) -> Self {
        let secs = ceiling.as_secs() + u64::from(ceiling.subsec_nanos() > 0);
        Self::Timeout { timeout_secs: secs }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code the error maps to on the external surface.
    ///
    /// Upstream statuses are passed through when they are valid error codes;
    /// anything else collapses to 502.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::Loading { .. } | Self::Unavailable { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::Upstream { status, .. } if (400..=599).contains(status) => *status,
            Self::Upstream { .. } => 502,
            Self::Internal { .. } => 500,
        }
    }

    /// Whether the caller can expect the condition to clear by itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Loading { .. } | Self::Unavailable { .. })
    }

    /// Short machine-readable class name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::Loading { .. } => "backend_loading",
            Self::Unavailable { .. } => "backend_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Upstream { .. } => "upstream_error",
            Self::Internal { .. } => "internal",
        }
    }

    /// Message that is safe to return to the caller.
    ///
    /// `retry_after_secs` is the hint used for transient errors that carry no
    /// upstream estimate of their own.
    pub fn public_message(&self, retry_after_secs: u64) -> String {
        match self {
            Self::InvalidInput { message } => message.clone(),
            Self::Loading { .. } | Self::Unavailable { .. } => format!(
                "Model is loading, please retry in {} seconds",
                self.retry_after(retry_after_secs)
            ),
            Self::Timeout { timeout_secs } => {
                format!("Inference timed out after {timeout_secs} seconds")
            }
            Self::Upstream { message, .. } => message.clone(),
            Self::Internal { .. } => "Inference failed due to an internal error".to_string(),
        }
    }

    /// Retry delay advertised to the caller for transient errors.
    pub fn retry_after(&self, default_secs: u64) -> u64 {
        match self {
            Self::Loading {
                retry_after_secs: Some(secs),
            } => *secs,
            _ => default_secs,
        }
    }
}

/// Errors raised by local model runtimes.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model load failed: {message}")]
    LoadFailed { message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("Task not supported by this model: {task}")]
    UnsupportedTask { task: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

/// Top-level error type for the summarizer core library.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A type alias for results using the top-level `SummarizerError`.
pub type Result<T> = std::result::Result<T, SummarizerError>;
