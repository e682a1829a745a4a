/*
 * recompute-core
 * Copyright (c) 2025 Posit, PBC
 *
 * Coalescing, reverting recomputation engine for interactive parametric
 * operations.
 *
 * A command edits parameters and calls `update()` on every change. The
 * engine keeps at most one backend call in flight, collapses bursts of
 * edits into one trailing call, rolls tracked parameters back when the
 * backend rejects them, and discards responses that arrive after the
 * operation was cancelled.
 */

pub mod backend;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod observer;
pub mod params;
pub mod scene;

pub use backend::{CallKind, Presentable, RecomputeBackend, RecomputeRequest};
pub use command::{Command, CommitStep};
pub use config::EngineConfig;
pub use engine::{EngineBuilder, Lifecycle, Phase, RecomputeEngine, UpdateOutcome};
pub use error::{BackendError, EngineError, Result};
pub use observer::{EngineObserver, NoopObserver, TracingObserver};
pub use params::{ParamValue, Parameters, Snapshot, TrackedKeys};
pub use scene::{BatchedInvalidation, MutationBatch, NoopScene, Scene};

pub use recompute_cancel::{Cancellable, CancellableRegistor, Cancellation};
