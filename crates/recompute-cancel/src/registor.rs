/*
 * registor.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Aggregates cancellable resources into one cancel/finish unit.
 */

//! Resource registrar for interactive operations.
//!
//! A command creates one [`CancellableRegistor`] per interactive operation,
//! registers every engine, promise and other disposable resource as it is
//! created, and later calls exactly one of [`CancellableRegistor::cancel`]
//! (ESC, tool switch) or [`CancellableRegistor::finish`] (ENTER).

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use crate::lock;
use crate::resource::Cancellable;

/// Lifecycle of a [`CancellableRegistor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistorState {
    /// Accepting registrations
    Open,
    /// `cancel()` has run
    Cancelled,
    /// `finish()` has run
    Finished,
}

impl RegistorState {
    fn action(self) -> &'static str {
        match self {
            RegistorState::Open => "open",
            RegistorState::Cancelled => "cancel",
            RegistorState::Finished => "finish",
        }
    }
}

struct Inner {
    state: RegistorState,
    resources: Vec<Arc<dyn Cancellable>>,
}

/// An ordered, append-only set of cancellable resources.
pub struct CancellableRegistor {
    inner: Mutex<Inner>,
}

impl CancellableRegistor {
    /// Create an empty, open registrar.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RegistorState::Open,
                resources: Vec::new(),
            }),
        }
    }

    /// Register a resource and hand it back, so call sites can
    /// register-and-keep-a-handle in one expression.
    ///
    /// Registering the same `Arc` twice is a no-op. A resource registered
    /// after the registrar has been cancelled or finished is cancelled or
    /// finished immediately instead of being stored.
    pub fn register<R: Cancellable + 'static>(&self, resource: Arc<R>) -> Arc<R> {
        let entry: Arc<dyn Cancellable> = resource.clone();

        let late_state = {
            let mut inner = lock(&self.inner);
            if inner
                .resources
                .iter()
                .any(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&entry)))
            {
                return resource;
            }
            match inner.state {
                RegistorState::Open => {
                    inner.resources.push(entry.clone());
                    None
                }
                terminal => Some(terminal),
            }
        };

        if let Some(state) = late_state {
            tracing::debug!(
                action = state.action(),
                "Resource registered after registrar terminated"
            );
            apply_isolated(&entry, state, None);
        }

        resource
    }

    /// Cancel every registered resource in registration order.
    pub fn cancel(&self) {
        self.terminate(RegistorState::Cancelled);
    }

    /// Finish every registered resource in registration order.
    pub fn finish(&self) {
        self.terminate(RegistorState::Finished);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistorState {
        lock(&self.inner).state
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        lock(&self.inner).resources.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).resources.is_empty()
    }

    fn terminate(&self, target: RegistorState) {
        // The lock is released before resources run, so a resource may
        // register further resources from inside its own cancel/finish.
        let resources = {
            let mut inner = lock(&self.inner);
            if inner.state != RegistorState::Open {
                return;
            }
            inner.state = target;
            inner.resources.clone()
        };

        tracing::debug!(
            action = target.action(),
            count = resources.len(),
            "Terminating registered resources"
        );

        let failures = resources
            .iter()
            .enumerate()
            .filter(|(index, resource)| !apply_isolated(resource, target, Some(*index)))
            .count();

        if failures > 0 {
            tracing::warn!(
                action = target.action(),
                failures = failures,
                "Some resources failed while terminating"
            );
        }
    }
}

impl Default for CancellableRegistor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellableRegistor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("CancellableRegistor")
            .field("state", &inner.state)
            .field("resources", &inner.resources.len())
            .finish()
    }
}

impl Cancellable for CancellableRegistor {
    fn cancel(&self) {
        CancellableRegistor::cancel(self)
    }

    fn finish(&self) {
        CancellableRegistor::finish(self)
    }
}

/// Run one resource's cancel/finish, containing any panic. Returns `false`
/// if the resource panicked.
fn apply_isolated(
    resource: &Arc<dyn Cancellable>,
    target: RegistorState,
    index: Option<usize>,
) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| match target {
        RegistorState::Cancelled => resource.cancel(),
        RegistorState::Finished => resource.finish(),
        RegistorState::Open => {}
    }));

    match outcome {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                action = target.action(),
                resource = ?index,
                panic = %panic_message(payload.as_ref()),
                "Resource panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the order in which resources were cancelled/finished.
    struct Recorder {
        id: usize,
        log: Arc<Mutex<Vec<(usize, &'static str)>>>,
    }

    impl Cancellable for Recorder {
        fn cancel(&self) {
            self.log.lock().unwrap().push((self.id, "cancel"));
        }

        fn finish(&self) {
            self.log.lock().unwrap().push((self.id, "finish"));
        }
    }

    fn recorders(
        count: usize,
    ) -> (
        Vec<Arc<Recorder>>,
        Arc<Mutex<Vec<(usize, &'static str)>>>,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let items = (0..count)
            .map(|id| {
                Arc::new(Recorder {
                    id,
                    log: log.clone(),
                })
            })
            .collect();
        (items, log)
    }

    #[test]
    fn test_register_returns_same_resource() {
        let registor = CancellableRegistor::new();
        let (items, _) = recorders(1);
        let returned = registor.register(items[0].clone());
        assert!(Arc::ptr_eq(&returned, &items[0]));
        assert_eq!(registor.len(), 1);
    }

    #[test]
    fn test_cancel_in_registration_order() {
        let registor = CancellableRegistor::new();
        let (items, log) = recorders(3);
        for item in &items {
            registor.register(item.clone());
        }

        registor.cancel();

        assert_eq!(
            *log.lock().unwrap(),
            vec![(0, "cancel"), (1, "cancel"), (2, "cancel")]
        );
        assert_eq!(registor.state(), RegistorState::Cancelled);
    }

    #[test]
    fn test_finish_in_registration_order() {
        let registor = CancellableRegistor::new();
        let (items, log) = recorders(2);
        for item in &items {
            registor.register(item.clone());
        }

        registor.finish();

        assert_eq!(*log.lock().unwrap(), vec![(0, "finish"), (1, "finish")]);
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registor = CancellableRegistor::new();
        let (items, log) = recorders(1);
        registor.register(items[0].clone());
        registor.register(items[0].clone());

        assert_eq!(registor.len(), 1);
        registor.cancel();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_twice_same_as_once() {
        let registor = CancellableRegistor::new();
        let (items, log) = recorders(2);
        for item in &items {
            registor.register(item.clone());
        }

        registor.cancel();
        registor.cancel();
        registor.finish();

        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(registor.state(), RegistorState::Cancelled);
    }

    #[test]
    fn test_late_registration_is_terminated_immediately() {
        let registor = CancellableRegistor::new();
        registor.finish();

        let (items, log) = recorders(1);
        registor.register(items[0].clone());

        assert_eq!(*log.lock().unwrap(), vec![(0, "finish")]);
        assert!(registor.is_empty());
    }

    #[test]
    fn test_empty_registor_cancel_is_harmless() {
        let registor = CancellableRegistor::default();
        registor.cancel();
        assert_eq!(registor.state(), RegistorState::Cancelled);
    }

    #[test]
    fn test_nested_registor() {
        let outer = CancellableRegistor::new();
        let inner = outer.register(Arc::new(CancellableRegistor::new()));
        let (items, log) = recorders(1);
        inner.register(items[0].clone());

        outer.cancel();

        assert_eq!(inner.state(), RegistorState::Cancelled);
        assert_eq!(*log.lock().unwrap(), vec![(0, "cancel")]);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u32), "non-string panic payload");
    }
}
