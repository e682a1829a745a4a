/*
 * promise.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * A future whose outcome is decided by an external cancel/finish signal.
 */

//! Cancellable promises.
//!
//! A [`CancellablePromise`] wraps asynchronous work that is *driven to
//! completion* from outside, typically a user gesture that ends with ESC
//! or ENTER. The executor that creates the promise receives a [`Resolver`]
//! and hands back [`PromiseHooks`]; calling [`CancellablePromise::cancel`]
//! or [`CancellablePromise::finish`] runs the matching hook, which in turn
//! decides how (and when) the resolver settles the promise.
//!
//! ```ignore
//! let promise = CancellablePromise::new(|resolver| {
//!     let on_cancel = resolver.clone();
//!     let on_finish = resolver;
//!     PromiseHooks::new()
//!         .on_cancel(move || { on_cancel.reject("gesture aborted"); })
//!         .on_finish(move || { on_finish.resolve(drag.current_offset()); })
//! });
//! registor.register(Arc::new(promise.handle()));
//! let offset = promise.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::lock;
use crate::resource::Cancellable;

/// Lifecycle of a [`CancellablePromise`].
///
/// Independent of whether the wrapped computation has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Neither `cancel()` nor `finish()` has been called yet
    Pending,
    /// `cancel()` was called first
    Cancelled,
    /// `finish()` was called first
    Finished,
}

impl PromiseState {
    /// Whether the state can still change.
    pub fn is_pending(self) -> bool {
        matches!(self, PromiseState::Pending)
    }
}

/// Error produced when awaiting a [`CancellablePromise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseError {
    /// The executor rejected the promise
    Rejected(String),
    /// Every resolver was dropped without settling the promise
    Abandoned,
}

impl std::fmt::Display for PromiseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromiseError::Rejected(reason) => write!(f, "Promise rejected: {}", reason),
            PromiseError::Abandoned => write!(f, "Promise abandoned without settling"),
        }
    }
}

impl std::error::Error for PromiseError {}

type Hook = Box<dyn FnOnce() + Send>;

/// Side effects supplied by a promise executor.
///
/// Each hook runs at most once, and at most one of the two ever runs.
#[derive(Default)]
pub struct PromiseHooks {
    on_cancel: Option<Hook>,
    on_finish: Option<Hook>,
}

impl PromiseHooks {
    /// Hooks that do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback invoked by `cancel()`.
    pub fn on_cancel(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// Set the callback invoked by `finish()`.
    pub fn on_finish(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }
}

impl std::fmt::Debug for PromiseHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseHooks")
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

/// Settles a [`CancellablePromise`]. Clones share the same slot; the first
/// `resolve` or `reject` wins.
pub struct Resolver<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T, PromiseError>>>>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Resolver<T> {
    /// Resolve the promise with a value. Returns `false` if it was already
    /// settled or nobody is awaiting it any more.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the promise. Returns `false` if it was already settled or
    /// nobody is awaiting it any more.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Err(PromiseError::Rejected(reason.into())))
    }

    /// Whether `resolve` or `reject` has already been called.
    pub fn is_settled(&self) -> bool {
        lock(&self.slot).is_none()
    }

    fn settle(&self, outcome: Result<T, PromiseError>) -> bool {
        match lock(&self.slot).take() {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }
}

struct Control {
    state: PromiseState,
    hooks: PromiseHooks,
}

/// Cancel/finish side of a [`CancellablePromise`], detachable from the
/// future so it can be registered while the promise is being awaited.
#[derive(Clone)]
pub struct PromiseHandle {
    control: Arc<Mutex<Control>>,
}

impl PromiseHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> PromiseState {
        lock(&self.control).state
    }

    /// Run the executor's cancel hook, if still pending.
    pub fn cancel(&self) {
        self.transition(PromiseState::Cancelled);
    }

    /// Run the executor's finish hook, if still pending.
    pub fn finish(&self) {
        self.transition(PromiseState::Finished);
    }

    fn transition(&self, target: PromiseState) {
        let hook = {
            let mut control = lock(&self.control);
            if !control.state.is_pending() {
                return;
            }
            control.state = target;
            let hooks = std::mem::take(&mut control.hooks);
            match target {
                PromiseState::Cancelled => hooks.on_cancel,
                PromiseState::Finished => hooks.on_finish,
                PromiseState::Pending => None,
            }
        };

        tracing::trace!(state = ?target, "Promise settled by external signal");

        // Hooks run outside the lock so they may call back into the handle.
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl std::fmt::Debug for PromiseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl Cancellable for PromiseHandle {
    fn cancel(&self) {
        PromiseHandle::cancel(self)
    }

    fn finish(&self) {
        PromiseHandle::finish(self)
    }
}

/// A future with externally-driven `cancel()` and `finish()`.
pub struct CancellablePromise<T> {
    handle: PromiseHandle,
    receiver: oneshot::Receiver<Result<T, PromiseError>>,
}

impl<T> CancellablePromise<T> {
    /// Create a promise from an executor.
    ///
    /// The executor is called immediately with a [`Resolver`] and returns the
    /// hooks to run on `cancel()` / `finish()`.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> PromiseHooks,
    {
        let (sender, receiver) = oneshot::channel();
        let resolver = Resolver {
            slot: Arc::new(Mutex::new(Some(sender))),
        };
        let hooks = executor(resolver);

        Self {
            handle: PromiseHandle {
                control: Arc::new(Mutex::new(Control {
                    state: PromiseState::Pending,
                    hooks,
                })),
            },
            receiver,
        }
    }

    /// A promise that is already resolved and has no side effects.
    pub fn resolved(value: T) -> Self {
        Self::new(|resolver| {
            resolver.resolve(value);
            PromiseHooks::new()
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PromiseState {
        self.handle.state()
    }

    /// Run the executor's cancel hook, if still pending.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Run the executor's finish hook, if still pending.
    pub fn finish(&self) {
        self.handle.finish();
    }

    /// A clonable handle sharing this promise's cancel/finish state.
    pub fn handle(&self) -> PromiseHandle {
        self.handle.clone()
    }
}

impl<T: Send> Cancellable for CancellablePromise<T> {
    fn cancel(&self) {
        self.handle.cancel();
    }

    fn finish(&self) {
        self.handle.finish();
    }
}

impl<T> Future for CancellablePromise<T> {
    type Output = Result<T, PromiseError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(PromiseError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for CancellablePromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellablePromise")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_promise(
        cancels: Arc<AtomicUsize>,
        finishes: Arc<AtomicUsize>,
    ) -> CancellablePromise<&'static str> {
        CancellablePromise::new(move |resolver| {
            let on_cancel = resolver.clone();
            PromiseHooks::new()
                .on_cancel(move || {
                    cancels.fetch_add(1, Ordering::SeqCst);
                    on_cancel.reject("escape");
                })
                .on_finish(move || {
                    finishes.fetch_add(1, Ordering::SeqCst);
                    resolver.resolve("enter");
                })
        })
    }

    #[test]
    fn test_new_promise_is_pending() {
        let promise = CancellablePromise::<()>::new(|_| PromiseHooks::new());
        assert_eq!(promise.state(), PromiseState::Pending);
    }

    #[test]
    fn test_finish_runs_finish_hook_and_resolves() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(cancels.clone(), finishes.clone());

        promise.finish();

        assert_eq!(promise.state(), PromiseState::Finished);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
        assert_eq!(pollster::block_on(promise), Ok("enter"));
    }

    #[test]
    fn test_cancel_runs_cancel_hook_and_rejects() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(cancels.clone(), finishes.clone());

        promise.cancel();

        assert_eq!(promise.state(), PromiseState::Cancelled);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(
            pollster::block_on(promise),
            Err(PromiseError::Rejected("escape".to_string()))
        );
    }

    #[test]
    fn test_cancel_and_finish_are_mutually_exclusive() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(cancels.clone(), finishes.clone());

        promise.cancel();
        promise.cancel();
        promise.finish();

        assert_eq!(promise.state(), PromiseState::Cancelled);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(finishes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handle_shares_state() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let finishes = Arc::new(AtomicUsize::new(0));
        let promise = counting_promise(cancels, finishes.clone());
        let handle = promise.handle();

        handle.finish();
        handle.finish();

        assert_eq!(promise.state(), PromiseState::Finished);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_settlement_wins() {
        let promise = CancellablePromise::new(|resolver| {
            assert!(resolver.resolve(1));
            assert!(resolver.is_settled());
            assert!(!resolver.resolve(2));
            assert!(!resolver.reject("late"));
            PromiseHooks::new()
        });
        assert_eq!(pollster::block_on(promise), Ok(1));
    }

    #[test]
    fn test_dropped_resolver_abandons() {
        let promise = CancellablePromise::<u32>::new(|_resolver| PromiseHooks::new());
        assert_eq!(pollster::block_on(promise), Err(PromiseError::Abandoned));
    }

    #[test]
    fn test_resolved_constructor() {
        let promise = CancellablePromise::resolved(7);
        assert_eq!(promise.state(), PromiseState::Pending);
        assert_eq!(pollster::block_on(promise), Ok(7));
    }

    #[test]
    fn test_settlement_independent_of_state() {
        // Hooks that do not settle leave the wrapped computation in charge.
        let mut resolver_slot = None;
        let promise = CancellablePromise::new(|resolver| {
            resolver_slot = Some(resolver);
            PromiseHooks::new()
        });
        promise.cancel();
        assert_eq!(promise.state(), PromiseState::Cancelled);

        let resolver = resolver_slot.unwrap();
        resolver.resolve("late value");
        assert_eq!(pollster::block_on(promise), Ok("late value"));
    }

    #[test]
    fn test_hook_may_reenter_handle() {
        let handle_slot: Arc<Mutex<Option<PromiseHandle>>> = Arc::new(Mutex::new(None));
        let reentry = handle_slot.clone();
        let promise = CancellablePromise::<()>::new(move |_| {
            PromiseHooks::new().on_cancel(move || {
                if let Some(handle) = reentry.lock().unwrap().as_ref() {
                    handle.finish();
                }
            })
        });
        *handle_slot.lock().unwrap() = Some(promise.handle());

        promise.cancel();
        assert_eq!(promise.state(), PromiseState::Cancelled);
    }

    #[test]
    fn test_promise_error_display() {
        assert!(
            PromiseError::Rejected("boom".to_string())
                .to_string()
                .contains("boom")
        );
        assert!(PromiseError::Abandoned.to_string().contains("abandoned"));
    }
}
