/*
 * recompute-cancel
 * Copyright (c) 2025 Posit, PBC
 *
 * Cancellable-resource framework for interactive editing operations.
 *
 * An interactive operation (dragging a gizmo, typing a value) owns many
 * resources that must all be torn down together when the user presses
 * ESC or ENTER. This crate provides the pieces to compose them:
 *
 * - Cancellable: the cancel/finish capability every participant implements
 * - CancellablePromise: a future whose outcome is decided externally
 * - CancellableRegistor: a registrar that cancels/finishes everything it holds
 * - Cancellation: a token handed to in-flight backend work
 */

mod cancellation;
mod promise;
mod registor;
mod resource;

pub use cancellation::Cancellation;
pub use promise::{
    CancellablePromise, PromiseError, PromiseHandle, PromiseHooks, PromiseState, Resolver,
};
pub use registor::{CancellableRegistor, RegistorState};
pub use resource::Cancellable;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate leaves its data consistent before
/// any call that could panic, so a poisoned lock is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
