/*
 * resource.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The cancel/finish capability shared by every disposable resource.
 */

//! The [`Cancellable`] capability.
//!
//! Anything that takes part in an interactive operation and must be torn
//! down when the operation ends implements this trait: promises, engines,
//! cancellation tokens and registrars themselves. A registrar is simply a
//! homogeneous list over this capability.

use std::sync::Arc;

/// A resource that can be cancelled or driven to completion.
///
/// Both methods are terminal and mutually exclusive: once one of them has
/// taken effect, every later call to either is a no-op. Implementations must
/// not panic and must not block waiting for in-flight work.
pub trait Cancellable: Send + Sync {
    /// Abort the resource, undoing any visible side effects it has made.
    fn cancel(&self);

    /// Complete the resource, keeping whatever state it has produced.
    fn finish(&self);
}

impl<T: Cancellable + ?Sized> Cancellable for Arc<T> {
    fn cancel(&self) {
        (**self).cancel()
    }

    fn finish(&self) {
        (**self).finish()
    }
}

impl<T: Cancellable + ?Sized> Cancellable for Box<T> {
    fn cancel(&self) {
        (**self).cancel()
    }

    fn finish(&self) {
        (**self).finish()
    }
}
