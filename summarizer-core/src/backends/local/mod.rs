//! In-process model backend.
//!
//! The adapter owns a single model handle, created exactly once by `load()`
//! and read-only from the gateway's point of view afterwards. Inference runs
//! behind an async mutex: local runtimes are not assumed to be reentrant, so
//! concurrent requests queue for the model. A caller that gives up releases
//! its place, and any child process it started is killed.

mod command;
mod extractive;

pub use command::CommandModel;
pub use extractive::ExtractiveModel;

use super::InferenceBackend;
use crate::config::{LocalModelConfig, LocalRuntime};
use crate::error::{BackendError, ModelError};
use crate::types::{BackendKind, BackendOutput, GenerationParams, LanguagePair, Task};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};

/// A loaded local inference runtime.
#[async_trait]
pub trait LocalModel: Send {
    fn supports(&self, task: Task) -> bool;

    async fn generate(
        &mut self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError>;
}

/// Pending construction of a model.
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<Box<dyn LocalModel>, ModelError>> + Send>>;

/// Constructs the model. Invoked at most once per successful load.
pub type ModelLoader = Arc<dyn Fn() -> LoadFuture + Send + Sync>;

type ModelHandle = Arc<Mutex<Box<dyn LocalModel>>>;

/// Adapter for a model running inside this process.
pub struct LocalModelBackend {
    model_id: String,
    tasks: Vec<Task>,
    languages: LanguagePair,
    timeout_base: Duration,
    timeout_per_token: Duration,
    loader: ModelLoader,
    handle: OnceCell<ModelHandle>,
}

impl LocalModelBackend {
    /// Build the adapter for the configured runtime. Nothing is loaded yet.
    pub fn from_config(config: &LocalModelConfig) -> Self {
        let (tasks, loader): (Vec<Task>, ModelLoader) = match config.runtime {
            LocalRuntime::Extractive => (
                vec![Task::Summarize],
                Arc::new(|| -> LoadFuture {
                    Box::pin(async {
                        Ok::<_, ModelError>(Box::new(ExtractiveModel::new()) as Box<dyn LocalModel>)
                    })
                }),
            ),
            LocalRuntime::Command => {
                let config = config.clone();
                (
                    vec![Task::Summarize, Task::Translate],
                    Arc::new(move || -> LoadFuture {
                        let config = config.clone();
                        Box::pin(async move {
                            let model = CommandModel::load(&config).await?;
                            Ok::<_, ModelError>(Box::new(model) as Box<dyn LocalModel>)
                        })
                    }),
                )
            }
        };
        Self {
            model_id: config.model_id.clone(),
            tasks,
            languages: config.languages(),
            timeout_base: Duration::from_secs(config.timeout_base_secs),
            timeout_per_token: Duration::from_millis(config.timeout_per_token_ms),
            loader,
            handle: OnceCell::new(),
        }
    }

    /// Build the adapter around a custom loader.
    pub fn with_loader(
        model_id: impl Into<String>,
        tasks: Vec<Task>,
        timeout_base: Duration,
        loader: ModelLoader,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            tasks,
            languages: LanguagePair::new("en", "fr"),
            timeout_base,
            timeout_per_token: Duration::ZERO,
            loader,
            handle: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }
}

fn map_model_error(err: ModelError) -> BackendError {
    match err {
        ModelError::UnsupportedTask { task } => {
            BackendError::invalid_input(format!("Task '{task}' is not supported by the local model"))
        }
        ModelError::LoadFailed { message } => BackendError::Unavailable { reason: message },
        other => BackendError::internal(other.to_string()),
    }
}

#[async_trait]
impl InferenceBackend for LocalModelBackend {
    fn describe(&self) -> BackendKind {
        BackendKind::LocalModel
    }

    fn name(&self) -> &str {
        &self.model_id
    }

    fn supports(&self, task: Task) -> bool {
        self.tasks.contains(&task)
    }

    fn languages(&self) -> Option<LanguagePair> {
        self.supports(Task::Translate)
            .then(|| self.languages.clone())
    }

    fn call_timeout(&self, params: &GenerationParams) -> Duration {
        self.timeout_base + self.timeout_per_token * params.max_length
    }

    async fn load(&self) -> Result<(), BackendError> {
        if self.is_loaded() {
            return Ok(());
        }

        info!(model = %self.model_id, "Loading local model");
        let started = Instant::now();
        // Concurrent callers wait on the same initialization.
        self.handle
            .get_or_try_init(|| async {
                let model = (self.loader)().await.map_err(|e| {
                    error!(model = %self.model_id, error = %e, "Local model failed to load");
                    map_model_error(e)
                })?;
                Ok::<_, BackendError>(Arc::new(Mutex::new(model)))
            })
            .await?;
        info!(
            model = %self.model_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Local model loaded"
        );
        Ok(())
    }

    async fn infer(
        &self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<BackendOutput, BackendError> {
        let handle = self.handle.get().cloned().ok_or(BackendError::Loading {
            retry_after_secs: None,
        })?;

        let mut model = handle.lock().await;
        if !model.supports(task) {
            return Err(map_model_error(ModelError::UnsupportedTask {
                task: task.to_string(),
            }));
        }
        let generated = model
            .generate(task, text, params)
            .await
            .map_err(map_model_error)?;

        Ok(BackendOutput::new(generated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoModel;

    #[async_trait]
    impl LocalModel for EchoModel {
        fn supports(&self, task: Task) -> bool {
            task == Task::Summarize
        }

        async fn generate(
            &mut self,
            _task: Task,
            text: &str,
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            if text.contains("oom") {
                return Err(ModelError::Generation {
                    message: "out of memory".into(),
                });
            }
            Ok(format!("  {}  ", text.to_uppercase()))
        }
    }

    fn echo_backend(loads: Arc<AtomicUsize>) -> LocalModelBackend {
        LocalModelBackend::with_loader(
            "echo",
            vec![Task::Summarize],
            Duration::from_secs(5),
            Arc::new(move || -> LoadFuture {
                loads.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok::<_, ModelError>(Box::new(EchoModel) as Box<dyn LocalModel>) })
            }),
        )
    }

    #[tokio::test]
    async fn test_infer_before_load_reports_loading() {
        let backend = echo_backend(Arc::new(AtomicUsize::new(0)));
        let err = backend
            .infer(Task::Summarize, "hello", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Loading { .. }));
    }

    #[tokio::test]
    async fn test_load_once_then_infer() {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = echo_backend(Arc::clone(&loads));
        backend.load().await.unwrap();
        backend.load().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let out = backend
            .infer(Task::Summarize, "hello", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out.text, "  HELLO  ");
    }

    #[tokio::test]
    async fn test_generation_failure_is_internal() {
        let backend = echo_backend(Arc::new(AtomicUsize::new(0)));
        backend.load().await.unwrap();
        let err = backend
            .infer(Task::Summarize, "oom please", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_load_failure_surfaces() {
        let backend = LocalModelBackend::with_loader(
            "broken",
            vec![Task::Summarize],
            Duration::from_secs(5),
            Arc::new(|| -> LoadFuture {
                Box::pin(async {
                    Err::<Box<dyn LocalModel>, _>(ModelError::LoadFailed {
                        message: "weights not found".into(),
                    })
                })
            }),
        );
        let err = backend.load().await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
        assert!(!backend.is_loaded());
    }

    /// Records how many `generate` calls overlap.
    struct GaugedModel {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocalModel for GaugedModel {
        fn supports(&self, _task: Task) -> bool {
            true
        }

        async fn generate(
            &mut self,
            _task: Task,
            text: &str,
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let pause = if text.contains("stall") { 5_000 } else { 20 };
            tokio::time::sleep(Duration::from_millis(pause)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    fn gauged_backend(peak: Arc<AtomicUsize>) -> LocalModelBackend {
        let active = Arc::new(AtomicUsize::new(0));
        LocalModelBackend::with_loader(
            "gauged",
            vec![Task::Summarize],
            Duration::from_secs(5),
            Arc::new(move || -> LoadFuture {
                let model = GaugedModel {
                    active: Arc::clone(&active),
                    peak: Arc::clone(&peak),
                };
                Box::pin(async move {
                    Ok::<_, ModelError>(Box::new(model) as Box<dyn LocalModel>)
                })
            }),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_serialized() {
        let peak = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(gauged_backend(Arc::clone(&peak)));
        backend.load().await.unwrap();

        let mut calls = tokio::task::JoinSet::new();
        for i in 0..6 {
            let backend = Arc::clone(&backend);
            calls.spawn(async move {
                backend
                    .infer(Task::Summarize, &format!("request {i}"), &GenerationParams::default())
                    .await
            });
        }
        while let Some(result) = calls.join_next().await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abandoned_call_releases_model() {
        let backend = gauged_backend(Arc::new(AtomicUsize::new(0)));
        backend.load().await.unwrap();

        let params = GenerationParams::default();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            backend.infer(Task::Summarize, "stall here", &params),
        )
        .await;
        assert!(abandoned.is_err());

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            backend.infer(Task::Summarize, "quick", &params),
        )
        .await
        .expect("model stayed locked after the caller gave up")
        .unwrap();
        assert_eq!(next.text, "quick");
    }

    #[tokio::test]
    async fn test_concurrent_loads_run_loader_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = echo_backend(Arc::clone(&loads));
        let (a, b) = tokio::join!(backend.load(), backend.load());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_timeout_scales_with_length() {
        let config = LocalModelConfig::default();
        let backend = LocalModelBackend::from_config(&config);
        let params = GenerationParams {
            max_length: 200,
            ..GenerationParams::default()
        };
        assert_eq!(backend.call_timeout(&params), config.timeout_for(200));
    }

    #[test]
    fn test_extractive_runtime_is_summarize_only() {
        let backend = LocalModelBackend::from_config(&LocalModelConfig::default());
        assert!(backend.supports(Task::Summarize));
        assert!(!backend.supports(Task::Translate));
        assert!(backend.languages().is_none());
    }
}
