//! Backend readiness tracking.
//!
//! The tracker owns the only piece of cross-request mutable state in the
//! gateway. Queries are lock-free so that no adapter, however slow, can stall
//! `/health` or the gateway's readiness short-circuit.

use crate::types::{BackendKind, BackendState, Readiness};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{info, warn};

const LOADING: u8 = 0;
const READY: u8 = 1;
const UNAVAILABLE: u8 = 2;

/// Tracks whether the configured backend can accept traffic.
///
/// Readiness is sticky: once `mark_ready()` has been called, the tracker keeps
/// reporting ready even if a later call reports the backend unavailable.
/// Readiness means "can accept traffic", not "last call succeeded".
#[derive(Debug)]
pub struct ReadinessTracker {
    kind: BackendKind,
    state: AtomicU8,
    ever_ready: AtomicBool,
    last_reason: Mutex<Option<String>>,
}

impl ReadinessTracker {
    /// Create a tracker in the initial state for the given backend kind.
    ///
    /// Backends with a load phase start as loading; hosted APIs start ready.
    pub fn new(kind: BackendKind) -> Self {
        let tracker = Self {
            kind,
            state: AtomicU8::new(LOADING),
            ever_ready: AtomicBool::new(false),
            last_reason: Mutex::new(None),
        };
        if !kind.requires_local_readiness() {
            tracker.mark_ready();
        }
        tracker
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// True once the backend has finished loading at least once.
    pub fn is_ready(&self) -> bool {
        self.ever_ready.load(Ordering::Acquire)
    }

    /// Current readiness as reported to `/health`.
    pub fn readiness(&self) -> Readiness {
        if self.is_ready() {
            return Readiness::Ready;
        }
        match self.state.load(Ordering::Acquire) {
            UNAVAILABLE => Readiness::Unavailable,
            READY => Readiness::Ready,
            _ => Readiness::Loading,
        }
    }

    pub fn state(&self) -> BackendState {
        BackendState {
            readiness: self.readiness(),
            backend_kind: self.kind,
        }
    }

    /// Record that a load has started. Ignored once the backend has been ready.
    pub fn mark_loading(&self) {
        if self.is_ready() {
            return;
        }
        self.state.store(LOADING, Ordering::Release);
        info!(backend = %self.kind, "Backend loading");
    }

    pub fn mark_ready(&self) {
        self.state.store(READY, Ordering::Release);
        let was_ready = self.ever_ready.swap(true, Ordering::AcqRel);
        if let Ok(mut reason) = self.last_reason.lock() {
            *reason = None;
        }
        if !was_ready {
            info!(backend = %self.kind, "Backend ready");
        }
    }

    /// Record that the backend cannot currently serve.
    ///
    /// Before the first successful load this makes the tracker report
    /// unavailable; afterwards the reason is only kept for diagnostics.
    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(backend = %self.kind, reason = %reason, "Backend reported unavailable");
        if !self.is_ready() {
            self.state.store(UNAVAILABLE, Ordering::Release);
        }
        if let Ok(mut last) = self.last_reason.lock() {
            *last = Some(reason);
        }
    }

    /// The most recent unavailability reason, if any.
    pub fn unavailable_reason(&self) -> Option<String> {
        self.last_reason.lock().ok().and_then(|r| r.clone())
    }
}
