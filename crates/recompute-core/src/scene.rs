/*
 * scene.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Batched-mutation scope over the visual scene.
 */

//! Scene collaborator interface.
//!
//! The engine never touches the visual representation itself, but it wraps
//! every backend update in a [`MutationBatch`] so the scene can defer
//! redraw until the whole block of visual mutations is done.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A scene that can batch visual mutations.
pub trait Scene: Send + Sync {
    /// Enter a batch. Batches may nest.
    fn begin_batch(&self);

    /// Leave a batch. The outermost `end_batch` flushes deferred redraws.
    fn end_batch(&self);
}

/// RAII guard for one batch.
///
/// The batch ends when the guard is dropped, including on early return or
/// when the future holding it is dropped mid-call.
pub struct MutationBatch {
    scene: Arc<dyn Scene>,
}

impl MutationBatch {
    /// Begin a batch on `scene`.
    pub fn begin(scene: Arc<dyn Scene>) -> Self {
        scene.begin_batch();
        Self { scene }
    }
}

impl Drop for MutationBatch {
    fn drop(&mut self) {
        self.scene.end_batch();
    }
}

/// Scene that ignores batching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScene;

impl Scene for NoopScene {
    fn begin_batch(&self) {}
    fn end_batch(&self) {}
}

/// Scene adapter that coalesces invalidation signals.
///
/// Mutations call [`BatchedInvalidation::mark_dirty`]; outside a batch the
/// redraw callback fires immediately, inside a batch it fires once when the
/// outermost batch ends (and only if something was marked dirty).
pub struct BatchedInvalidation<F: Fn() + Send + Sync> {
    depth: AtomicUsize,
    dirty: AtomicBool,
    invalidate: F,
}

impl<F: Fn() + Send + Sync> BatchedInvalidation<F> {
    /// Wrap a redraw callback.
    pub fn new(invalidate: F) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            invalidate,
        }
    }

    /// Record a visual mutation.
    pub fn mark_dirty(&self) {
        if self.depth.load(Ordering::SeqCst) == 0 {
            (self.invalidate)();
        } else {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl<F: Fn() + Send + Sync> Scene for BatchedInvalidation<F> {
    fn begin_batch(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn end_batch(&self) {
        let previous = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        if previous <= 1 && self.dirty.swap(false, Ordering::SeqCst) {
            (self.invalidate)();
        }
    }
}
