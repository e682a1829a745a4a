/*
 * tests/common/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Scripted backend whose calls are released one at a time by the test.
 */

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use recompute_core::{
    BackendError, CallKind, EngineObserver, ParamValue, Parameters, Presentable,
    RecomputeBackend, RecomputeEngine, RecomputeRequest, TrackedKeys,
};
use tokio::sync::{mpsc, oneshot};

/// Shared log of presentation events, e.g. `show:extrude`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// One backend call waiting for the test to answer it.
pub struct PendingCall {
    pub request: RecomputeRequest,
    reply: oneshot::Sender<Result<Vec<f64>, BackendError>>,
}

impl PendingCall {
    pub fn distance(&self) -> f64 {
        distance(&self.request.parameters)
    }

    pub fn kind(&self) -> CallKind {
        self.request.kind
    }

    pub fn resolve(self) {
        let d = self.distance();
        let _ = self.reply.send(Ok(vec![d]));
    }

    pub fn reject(self, reason: &str) {
        let _ = self.reply.send(Err(BackendError::validation(reason)));
    }
}

/// Committed result that records show/cancel in the event log.
pub struct Shape {
    pub label: String,
    pub distance: f64,
    log: EventLog,
}

impl Presentable for Shape {
    fn show(&mut self) {
        push(&self.log, format!("show:{}", self.label));
    }

    fn cancel(&mut self) {
        push(&self.log, format!("cancel:{}", self.label));
    }
}

pub struct Scripted {
    label: String,
    calls: mpsc::UnboundedSender<PendingCall>,
    commit_failures: Mutex<VecDeque<BackendError>>,
    stall_commit: AtomicBool,
    pub restored: AtomicUsize,
    pub log: EventLog,
}

impl Scripted {
    /// Make the next commit fail.
    pub fn fail_next_commit(&self, reason: &str) {
        self.commit_failures
            .lock()
            .unwrap()
            .push_back(BackendError::failed(reason));
    }

    /// Make the next commit never complete.
    pub fn stall_next_commit(&self) {
        self.stall_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecomputeBackend for Scripted {
    type Visual = f64;
    type Output = Shape;

    fn name(&self) -> &str {
        &self.label
    }

    fn check(&self, parameters: &Parameters) -> Result<(), BackendError> {
        if distance(parameters) == 0.0 {
            return Err(BackendError::NoOp("zero distance".into()));
        }
        Ok(())
    }

    async fn recompute(&self, request: RecomputeRequest) -> Result<Vec<f64>, BackendError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingCall { request, reply })
            .map_err(|_| BackendError::failed("test harness gone"))?;
        rx.await
            .unwrap_or_else(|_| Err(BackendError::failed("call dropped")))
    }

    async fn commit(&self, parameters: Parameters) -> Result<Vec<Shape>, BackendError> {
        if self.stall_commit.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.commit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        push(&self.log, format!("commit:{}", self.label));
        Ok(vec![Shape {
            label: self.label.clone(),
            distance: distance(&parameters),
            log: self.log.clone(),
        }])
    }

    fn restore_baseline(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
        push(&self.log, format!("restore:{}", self.label));
    }
}

/// Engine tracking `distance` (initially 1.0) plus the receiving end of its
/// backend calls.
pub struct Harness {
    pub engine: Arc<RecomputeEngine<Scripted>>,
    pub calls: mpsc::UnboundedReceiver<PendingCall>,
}

impl Harness {
    pub fn new(label: &str) -> Self {
        Self::with_log(label, EventLog::default(), None)
    }

    pub fn with_log(
        label: &str,
        log: EventLog,
        observer: Option<Arc<dyn EngineObserver>>,
    ) -> Self {
        let (tx, calls) = mpsc::unbounded_channel();
        let backend = Scripted {
            label: label.to_string(),
            calls: tx,
            commit_failures: Mutex::new(VecDeque::new()),
            stall_commit: AtomicBool::new(false),
            restored: AtomicUsize::new(0),
            log,
        };
        let mut builder = RecomputeEngine::builder(backend)
            .label(label)
            .parameters(Parameters::new().with("distance", 1.0).with("label", "edge"))
            .tracked_keys(TrackedKeys::new(["distance"]));
        if let Some(observer) = observer {
            builder = builder.observer(observer);
        }
        Self {
            engine: Arc::new(builder.build().unwrap()),
            calls,
        }
    }

    /// Wait for the next backend call.
    pub async fn next_call(&mut self) -> PendingCall {
        tokio::time::timeout(Duration::from_secs(5), self.calls.recv())
            .await
            .expect("timed out waiting for a backend call")
            .expect("backend dropped")
    }

    /// Check that no backend call is waiting.
    pub fn assert_no_call(&mut self) {
        assert!(self.calls.try_recv().is_err(), "unexpected backend call");
    }

    pub fn distance(&self) -> f64 {
        self.engine
            .get("distance")
            .and_then(|v| v.as_f64())
            .unwrap()
    }
}

/// Counts observer events.
#[derive(Default)]
pub struct Counting {
    pub dispatched: AtomicUsize,
    pub coalesced: AtomicUsize,
    pub stale: AtomicUsize,
    pub reverts: AtomicUsize,
}

impl EngineObserver for Counting {
    fn on_dispatch(&self, _engine: &str, _call: u64, _kind: CallKind) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn on_coalesce(&self, _engine: &str) {
        self.coalesced.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stale(&self, _engine: &str, _call: u64, _generation: u64) {
        self.stale.fetch_add(1, Ordering::SeqCst);
    }

    fn on_revert(&self, _engine: &str, _changed: &[String]) {
        self.reverts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Yield until `condition` holds.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never held");
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn push(log: &EventLog, event: String) {
    log.lock().unwrap().push(event);
}

fn distance(parameters: &Parameters) -> f64 {
    parameters
        .get("distance")
        .and_then(ParamValue::as_f64)
        .unwrap_or_default()
}
