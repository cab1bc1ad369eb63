//! Scripted backend for tests and benchmarks.

use super::InferenceBackend;
use crate::error::BackendError;
use crate::types::{BackendKind, BackendOutput, GenerationParams, LanguagePair, Task};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One recorded `infer` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub task: Task,
    pub text: String,
    pub params: GenerationParams,
}

/// A backend whose outcomes are queued up front.
///
/// Queued outcomes are returned in order; once the queue is empty every call
/// returns the fallback outcome (`"Mock summary."` unless overridden).
pub struct MockBackend {
    kind: BackendKind,
    tasks: Vec<Task>,
    outcomes: Mutex<VecDeque<Result<BackendOutput, BackendError>>>,
    fallback: Result<BackendOutput, BackendError>,
    load_results: Mutex<VecDeque<Result<(), BackendError>>>,
    load_delay: Duration,
    delay: Duration,
    timeout: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_call: Mutex<Option<MockCall>>,
    loads: AtomicUsize,
}

/// Decrements the in-flight count when an `infer` call ends or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            tasks: vec![Task::Summarize, Task::Translate],
            outcomes: Mutex::new(VecDeque::new()),
            fallback: Ok(BackendOutput::new("Mock summary.")),
            load_results: Mutex::new(VecDeque::new()),
            load_delay: Duration::ZERO,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(30),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            last_call: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    /// Always return the given text.
    pub fn with_response(mut self, text: &str) -> Self {
        self.fallback = Ok(BackendOutput::new(text));
        self
    }

    /// Always fail with the given error.
    pub fn with_error(mut self, error: BackendError) -> Self {
        self.fallback = Err(error);
        self
    }

    /// Queue outcomes returned before the fallback.
    pub fn with_outcomes(self, outcomes: Vec<Result<BackendOutput, BackendError>>) -> Self {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.extend(outcomes);
        }
        self
    }

    /// Attach a provider-claimed length to the fallback response.
    pub fn with_reported_length(mut self, length: usize) -> Self {
        if let Ok(output) = &mut self.fallback {
            output.reported_length = Some(length);
        }
        self
    }

    /// Restrict the supported tasks.
    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sleep this long inside every `infer` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ceiling reported through `call_timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Outcomes of successive `load` calls; once exhausted, loads succeed.
    pub fn with_load_results(self, results: Vec<Result<(), BackendError>>) -> Self {
        if let Ok(mut queue) = self.load_results.lock() {
            queue.extend(results);
        }
        self
    }

    /// Sleep this long inside every `load` call.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most `infer` calls ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.last_call.lock().ok().and_then(|call| call.clone())
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn describe(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        "mock-model"
    }

    fn supports(&self, task: Task) -> bool {
        self.tasks.contains(&task)
    }

    fn languages(&self) -> Option<LanguagePair> {
        self.supports(Task::Translate)
            .then(|| LanguagePair::new("en", "fr"))
    }

    fn call_timeout(&self, _params: &GenerationParams) -> Duration {
        self.timeout
    }

    async fn load(&self) -> Result<(), BackendError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.load_results
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(Ok(()))
    }

    async fn infer(
        &self,
        task: Task,
        text: &str,
        params: &GenerationParams,
    ) -> Result<BackendOutput, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        if let Ok(mut last) = self.last_call.lock() {
            *last = Some(MockCall {
                task,
                text: text.to_string(),
                params: *params,
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_outcomes_then_fallback() {
        let backend = MockBackend::new(BackendKind::HostedApi)
            .with_response("steady")
            .with_outcomes(vec![Err(BackendError::Timeout { timeout_secs: 1 })]);
        let params = GenerationParams::default();

        let first = backend.infer(Task::Summarize, "a", &params).await;
        assert!(matches!(first, Err(BackendError::Timeout { .. })));
        let second = backend.infer(Task::Summarize, "b", &params).await.unwrap();
        assert_eq!(second.text, "steady");

        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.last_call().unwrap().text, "b");
    }

    #[tokio::test]
    async fn test_peak_in_flight_tracks_overlap() {
        let backend = MockBackend::new(BackendKind::HostedApi).with_delay(Duration::from_millis(20));
        let params = GenerationParams::default();
        let (a, b) = tokio::join!(
            backend.infer(Task::Summarize, "a", &params),
            backend.infer(Task::Summarize, "b", &params)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(backend.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_load_results_are_consumed_in_order() {
        let backend = MockBackend::new(BackendKind::LocalModel)
            .with_load_results(vec![Err(BackendError::internal("first"))]);
        assert!(backend.load().await.is_err());
        assert!(backend.load().await.is_ok());
        assert_eq!(backend.load_count(), 2);
    }
}
