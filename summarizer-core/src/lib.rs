//! # Summarizer Core
//!
//! Core library for the summarizer gateway.
//! Provides the inference backend adapters, readiness tracking, the request
//! gateway and its HTTP surface, configuration, and fundamental types.

pub mod backends;
pub mod composer;
pub mod config;
pub mod error;
pub mod gateway;
pub mod readiness;
pub mod types;

// Re-export commonly used types at the crate root.
pub use backends::{InferenceBackend, MockBackend, create_backend};
pub use config::{ServiceConfig, load_config};
pub use error::{BackendError, ConfigError, ModelError, Result, SummarizerError};
pub use gateway::{RequestGateway, SharedGateway};
pub use readiness::ReadinessTracker;
pub use types::{
    BackendKind, BackendOutput, BackendState, GenerationParams, InferenceRequest,
    InferenceResult, LanguagePair, ParamLimits, Readiness, Task,
};
