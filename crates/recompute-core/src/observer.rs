/*
 * observer.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Engine observer for tracing, diagnostics and UI feedback.
 */

//! Observer abstraction for engine scheduling events.
//!
//! The [`EngineObserver`] trait lets an engine report what its scheduler is
//! doing (dispatches, coalesced requests, reverts, cancellation) without
//! depending on a specific observability implementation. The editor can use
//! it to drive a busy indicator; tests use it to count events.

use crate::backend::CallKind;
use crate::error::BackendError;

/// Observer for engine scheduling events.
///
/// All methods have empty default implementations, allowing observers
/// to implement only the events they care about.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: backend calls complete on tokio
/// tasks and report from there.
pub trait EngineObserver: Send + Sync {
    /// Called when a backend call is dispatched.
    ///
    /// # Arguments
    ///
    /// * `engine` - Label of the engine
    /// * `call` - One-based index of the call
    /// * `kind` - Why the call was issued
    fn on_dispatch(&self, _engine: &str, _call: u64, _kind: CallKind) {}

    /// Called when an `update()` request is absorbed into a pending
    /// trailing call instead of dispatching.
    fn on_coalesce(&self, _engine: &str) {}

    /// Called when a backend call succeeds.
    fn on_success(&self, _engine: &str, _call: u64, _kind: CallKind) {}

    /// Called when a backend call fails.
    fn on_failure(&self, _engine: &str, _call: u64, _kind: CallKind, _error: &BackendError) {}

    /// Called after tracked parameters were restored to the last good
    /// snapshot.
    ///
    /// # Arguments
    ///
    /// * `engine` - Label of the engine
    /// * `changed` - Names of the parameters whose value changed
    fn on_revert(&self, _engine: &str, _changed: &[String]) {}

    /// Called when a backend response is discarded because its generation
    /// was superseded by cancel/finish.
    fn on_stale(&self, _engine: &str, _call: u64, _generation: u64) {}

    /// Called when the engine is cancelled.
    fn on_cancel(&self, _engine: &str) {}

    /// Called when a commit completes successfully.
    ///
    /// # Arguments
    ///
    /// * `engine` - Label of the engine
    /// * `outputs` - Number of results produced
    fn on_commit(&self, _engine: &str, _outputs: usize) {}
}

/// No-op observer implementation.
///
/// This is the default observer used when no other is specified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl NoopObserver {
    /// Create a new no-op observer.
    pub fn new() -> Self {
        Self
    }
}

impl EngineObserver for NoopObserver {
    // All methods use default empty implementations
}

/// Tracing observer that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Create a new tracing observer.
    pub fn new() -> Self {
        Self
    }
}

impl EngineObserver for TracingObserver {
    fn on_dispatch(&self, engine: &str, call: u64, kind: CallKind) {
        tracing::debug!(engine = engine, call = call, kind = kind.as_str(), "Dispatching backend call");
    }

    fn on_coalesce(&self, engine: &str) {
        tracing::trace!(engine = engine, "Update coalesced into pending call");
    }

    fn on_success(&self, engine: &str, call: u64, kind: CallKind) {
        tracing::debug!(engine = engine, call = call, kind = kind.as_str(), "Backend call succeeded");
    }

    fn on_failure(&self, engine: &str, call: u64, kind: CallKind, error: &BackendError) {
        match kind {
            CallKind::Resync => tracing::error!(
                engine = engine,
                call = call,
                error = %error,
                "Resynchronization call failed"
            ),
            _ => tracing::warn!(
                engine = engine,
                call = call,
                kind = kind.as_str(),
                error = %error,
                "Backend call failed, reverting"
            ),
        }
    }

    fn on_revert(&self, engine: &str, changed: &[String]) {
        tracing::info!(engine = engine, changed = ?changed, "Reverted to last good parameters");
    }

    fn on_stale(&self, engine: &str, call: u64, generation: u64) {
        tracing::debug!(
            engine = engine,
            call = call,
            generation = generation,
            "Discarding stale backend response"
        );
    }

    fn on_cancel(&self, engine: &str) {
        tracing::info!(engine = engine, "Engine cancelled");
    }

    fn on_commit(&self, engine: &str, outputs: usize) {
        tracing::info!(engine = engine, outputs = outputs, "Commit completed");
    }
}
