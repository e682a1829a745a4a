/*
 * backend.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The computation backend consumed by the recompute engine.
 */

//! Backend collaborator interface.
//!
//! The geometry backend is an opaque service that turns parameters into
//! results. The engine needs three things from it:
//!
//! - [`RecomputeBackend::recompute`] - a fast, interactive-quality update
//! - [`RecomputeBackend::commit`] - the authoritative final computation
//! - [`RecomputeBackend::restore_baseline`] - undo everything back to the
//!   pre-interaction state
//!
//! Backends are async via `async_trait` so they can be implemented over
//! worker threads, IPC, or a WASM bridge alike.

use async_trait::async_trait;
use recompute_cancel::Cancellation;

use crate::error::BackendError;
use crate::params::Parameters;

/// Why the engine is issuing a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// First call of a chain, dispatched from an idle engine
    Update,
    /// Coalesced follow-up reflecting edits made while a call was in flight
    Trailing,
    /// Silent call re-applying the last good parameters after a revert
    Resync,
}

impl CallKind {
    /// Convert to a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Update => "update",
            CallKind::Trailing => "trailing",
            CallKind::Resync => "resync",
        }
    }
}

/// Everything a backend needs for one interactive recomputation.
#[derive(Debug, Clone)]
pub struct RecomputeRequest {
    /// Parameters as they were when the call was dispatched
    pub parameters: Parameters,
    /// Engine generation the call belongs to
    pub generation: u64,
    /// One-based index of this call among the engine's backend calls
    pub call: u64,
    /// Why the call was issued
    pub kind: CallKind,
    /// Tripped when the owning operation is cancelled or finished
    pub cancellation: Cancellation,
}

/// A committed result whose visual swap can be deferred.
///
/// A command commits every engine first and only then calls `show()` on all
/// results, or `cancel()` on the ones already produced if a sibling failed.
pub trait Presentable: Send {
    /// Swap the committed result into the visible scene.
    fn show(&mut self);

    /// Undo the visual commit of this result.
    fn cancel(&mut self);
}

impl<T: Presentable + ?Sized> Presentable for Box<T> {
    fn show(&mut self) {
        (**self).show()
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}

/// The external computation service driven by a recompute engine.
#[async_trait]
pub trait RecomputeBackend: Send + Sync + 'static {
    /// Visual handle produced by an interactive update.
    type Visual: Send + 'static;

    /// Final result produced by a commit.
    type Output: Presentable + 'static;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "backend"
    }

    /// Synchronous pre-check run before any call is dispatched.
    ///
    /// Return [`BackendError::NoOp`] when the parameters describe an
    /// operation that changes nothing. Runs on a copy of the parameters with
    /// the engine's state lock released, so it may read the engine.
    fn check(&self, _parameters: &Parameters) -> Result<(), BackendError> {
        Ok(())
    }

    /// Interactive-quality recomputation (may use cheap approximations).
    async fn recompute(
        &self,
        request: RecomputeRequest,
    ) -> Result<Vec<Self::Visual>, BackendError>;

    /// Authoritative recomputation producing the final results.
    async fn commit(&self, parameters: Parameters) -> Result<Vec<Self::Output>, BackendError>;

    /// Synchronously restore the pre-operation state. Must not fail.
    fn restore_baseline(&self);
}
