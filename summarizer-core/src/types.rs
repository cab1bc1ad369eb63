//! Fundamental types shared by the gateway, the adapters, and the HTTP layer.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The inference operation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Summarize,
    Translate,
}

impl Task {
    /// Minimum trimmed length, in characters, accepted for this task.
    pub fn min_chars(&self) -> usize {
        match self {
            Task::Summarize => 10,
            Task::Translate => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Summarize => "summarize",
            Task::Translate => "translate",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of provider sits behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[serde(alias = "LOCAL_MODEL")]
    LocalModel,
    #[serde(alias = "SERVERLESS_GPU")]
    ServerlessGpu,
    #[serde(alias = "HOSTED_API")]
    HostedApi,
}

impl BackendKind {
    /// Whether the backend has a load phase that must finish before traffic
    /// is accepted.
    pub fn requires_local_readiness(&self) -> bool {
        matches!(self, BackendKind::LocalModel | BackendKind::ServerlessGpu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalModel => "local_model",
            BackendKind::ServerlessGpu => "serverless_gpu",
            BackendKind::HostedApi => "hosted_api",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "local_model" | "local" => Ok(BackendKind::LocalModel),
            "serverless_gpu" | "serverless" => Ok(BackendKind::ServerlessGpu),
            "hosted_api" | "hosted" => Ok(BackendKind::HostedApi),
            other => Err(format!(
                "unknown backend '{other}' (expected local_model, serverless_gpu or hosted_api)"
            )),
        }
    }
}

/// Readiness of the configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Loading,
    Ready,
    Unavailable,
}

/// Point-in-time view of the backend as seen by the readiness tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendState {
    pub readiness: Readiness,
    pub backend_kind: BackendKind,
}

/// A normalized inference request, as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub text: String,
    pub task: Task,
    /// Task-specific knobs. Unknown keys are ignored.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl InferenceRequest {
    pub fn new(task: Task, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            task,
            parameters: BTreeMap::new(),
        }
    }

    pub fn summarize(text: impl Into<String>) -> Self {
        Self::new(Task::Summarize, text)
    }

    pub fn translate(text: impl Into<String>) -> Self {
        Self::new(Task::Translate, text)
    }

    /// Set a single parameter, replacing any previous value.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Inclusive range a backend accepts for a numeric knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

/// Ranges a backend declares valid for generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamLimits {
    pub max_length: Range<u32>,
    pub min_length: Range<u32>,
    pub max_tokens: Range<u32>,
    pub temperature: Range<f32>,
}

impl Default for ParamLimits {
    fn default() -> Self {
        Self {
            max_length: Range::new(1, 1024),
            min_length: Range::new(0, 1024),
            max_tokens: Range::new(1, 4096),
            temperature: Range::new(0.0, 2.0),
        }
    }
}

/// Generation knobs after defaults, caller overrides, and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_length: u32,
    pub min_length: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 150,
            min_length: 30,
            max_tokens: 150,
            temperature: 0.7,
        }
    }
}

impl GenerationParams {
    /// Merge caller-supplied knobs over the defaults and clamp them into the
    /// backend's declared ranges.
    ///
    /// Unknown keys are ignored. A known key holding a non-numeric value is
    /// rejected as invalid input.
    pub fn merge(
        overrides: &BTreeMap<String, Value>,
        limits: &ParamLimits,
    ) -> Result<Self, BackendError> {
        let mut params = Self::default();

        for (key, value) in overrides {
            match key.as_str() {
                "max_length" => params.max_length = as_u32(key, value)?,
                "min_length" => params.min_length = as_u32(key, value)?,
                "max_tokens" => params.max_tokens = as_u32(key, value)?,
                "temperature" => params.temperature = as_f32(key, value)?,
                _ => {
                    tracing::debug!(parameter = %key, "Ignoring unknown generation parameter");
                }
            }
        }

        params.max_length = limits.max_length.clamp(params.max_length);
        params.min_length = limits
            .min_length
            .clamp(params.min_length)
            .min(params.max_length);
        params.max_tokens = limits.max_tokens.clamp(params.max_tokens);
        params.temperature = limits.temperature.clamp(params.temperature);
        Ok(params)
    }
}

fn as_u32(key: &str, value: &Value) -> Result<u32, BackendError> {
    if value.is_null() {
        return Ok(GenerationParams::default_for(key));
    }
    let number = value
        .as_f64()
        .ok_or_else(|| BackendError::invalid_input(format!("Parameter '{key}' must be a number")))?;
    if number.is_sign_negative() {
        return Ok(0);
    }
    Ok(number.min(u32::MAX as f64) as u32)
}

fn as_f32(key: &str, value: &Value) -> Result<f32, BackendError> {
    if value.is_null() {
        return Ok(GenerationParams::default().temperature);
    }
    value
        .as_f64()
        .map(|n| n as f32)
        .ok_or_else(|| BackendError::invalid_input(format!("Parameter '{key}' must be a number")))
}

impl GenerationParams {
    fn default_for(key: &str) -> u32 {
        let defaults = Self::default();
        match key {
            "max_length" => defaults.max_length,
            "min_length" => defaults.min_length,
            _ => defaults.max_tokens,
        }
    }
}

/// Statically configured language tags for translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Raw generation returned by an adapter, before composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub text: String,
    /// Length claimed by the provider, if any. Kept for logging only.
    pub reported_length: Option<usize>,
}

impl BackendOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reported_length: None,
        }
    }
}

/// The normalized result handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub output_text: String,
    pub input_length: usize,
    pub output_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
}
