/*
 * cancellation.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Token tripped when the operation behind a backend call ends.
 */

//! Cancellation for in-flight backend work.
//!
//! A [`Cancellation`] is tripped when the operation that issued a backend
//! call is cancelled or finished. Backends may observe it to stop early;
//! the engine itself never relies on that and discards stale results
//! regardless.

use tokio_util::sync::CancellationToken;

use crate::resource::Cancellable;

/// Shared token for one engine generation. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: CancellationToken,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the operation has ended.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Trip the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    /// Wait until the token is tripped.
    ///
    /// Backends typically race this against their own work with
    /// `tokio::select!`.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// A token tripped together with this one, but cancellable on its own.
    ///
    /// Lets a backend stop one sub-task without ending the whole call.
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }
}

impl Cancellable for Cancellation {
    fn cancel(&self) {
        Cancellation::cancel(self)
    }

    // Finishing lets the work run to completion.
    fn finish(&self) {}
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self { inner: token }
    }
}
