/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Coalescing update/commit/cancel engine.
 */

//! The recompute engine.
//!
//! A [`RecomputeEngine`] owns the parameters of one interactive operation and
//! drives a [`RecomputeBackend`] as those parameters change. It guarantees:
//!
//! - at most one backend call in flight; edits arriving while busy collapse
//!   into a single trailing call
//! - a failed call never leaks to the caller: tracked parameters are reverted
//!   to the last good snapshot and a silent resync call re-applies them
//! - responses that arrive after `cancel()`/`finish()` are discarded
//!
//! # Phases
//!
//! ```text
//! Idle ──update──▶ Running ──ok──▶ Idle
//!                    │  ▲  └─update─▶ RunningWithPending ──ok──▶ Running (trailing)
//!                    │  └────────────────────────────────────────────┘
//!                    └─err─▶ Reverting ──ok──▶ Idle
//!                                 └─err──▶ Idle (Poisoned)
//! ```
//!
//! Backend calls run on tokio tasks, so a call makes progress whether or not
//! the future returned by [`RecomputeEngine::update`] is polled.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use recompute_cancel::{Cancellable, Cancellation};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::backend::{CallKind, Presentable, RecomputeBackend, RecomputeRequest};
use crate::config::EngineConfig;
use crate::error::{BackendError, EngineError, Result};
use crate::observer::{EngineObserver, NoopObserver};
use crate::params::{ParamValue, Parameters, Snapshot, TrackedKeys};
use crate::scene::{MutationBatch, NoopScene, Scene};

/// Scheduling phase of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No backend call outstanding
    Idle,
    /// One backend call in flight
    Running,
    /// One call in flight and at least one more request waiting for it
    RunningWithPending,
    /// A call failed; parameters were reverted and the resync call is in flight
    Reverting,
}

/// Lifecycle of an engine as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Accepting updates
    Active,
    /// Cancelled; tracked parameters are back at their baseline
    Cancelled,
    /// Finished, normally after a confirmed commit; visual state left as is
    Finished,
    /// The resync call after a revert failed
    Poisoned,
}

impl Lifecycle {
    /// Check if no further updates will be accepted.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Lifecycle::Active)
    }
}

/// How an `update()` request settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Every backend call in the chain succeeded
    Applied,
    /// A call failed and tracked parameters were rolled back
    Reverted,
    /// The backend reported that the parameters change nothing
    NoOp,
    /// The engine was cancelled or finished before the chain settled
    Cancelled,
}

type Waiter = oneshot::Sender<Result<UpdateOutcome>>;

struct State<V> {
    parameters: Parameters,
    baseline: Snapshot,
    last_good: Option<Snapshot>,
    // Tracked values the outstanding call was dispatched with
    in_flight: Option<Snapshot>,
    visuals: Vec<V>,
    phase: Phase,
    lifecycle: Lifecycle,
    generation: u64,
    call_count: u64,
    commit_count: u64,
    committing: bool,
    // Set when the current chain went through a revert
    reverted: bool,
    // Update requested while the resync call was in flight
    pending_after_resync: bool,
    waiters: Vec<Waiter>,
    cancellation: Cancellation,
}

impl<V> State<V> {
    fn invalid(&self, operation: &'static str) -> EngineError {
        if self.lifecycle == Lifecycle::Poisoned {
            return EngineError::Poisoned;
        }
        EngineError::InvalidState {
            operation,
            phase: self.phase,
            lifecycle: self.lifecycle,
        }
    }
}

struct Shared<B: RecomputeBackend> {
    label: String,
    backend: B,
    tracked_keys: TrackedKeys,
    scene: Arc<dyn Scene>,
    observer: Arc<dyn EngineObserver>,
    runtime: Handle,
    phase_tx: watch::Sender<Phase>,
    state: Mutex<State<B::Visual>>,
}

/// Work to do once the state lock is released.
#[derive(Default)]
struct Effects {
    dispatch: Option<RecomputeRequest>,
    settle: Option<(Vec<Waiter>, Result<UpdateOutcome>)>,
    reverted: Option<Vec<String>>,
}

/// Clears the committing flag, also when the commit future is dropped.
struct CommitGuard<'a, V> {
    state: &'a Mutex<State<V>>,
}

impl<V> Drop for CommitGuard<'_, V> {
    fn drop(&mut self) {
        lock(self.state).committing = false;
    }
}

/// Coalescing, reverting driver for one interactive operation.
pub struct RecomputeEngine<B: RecomputeBackend> {
    shared: Arc<Shared<B>>,
}

/// Builder for [`RecomputeEngine`].
pub struct EngineBuilder<B: RecomputeBackend> {
    backend: B,
    config: EngineConfig,
    scene: Arc<dyn Scene>,
    observer: Arc<dyn EngineObserver>,
    runtime: Option<Handle>,
}

impl<B: RecomputeBackend> EngineBuilder<B> {
    /// Set the label used in logs and observer events.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    /// Set the initial parameters.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.config.parameters = parameters;
        self
    }

    /// Set the parameters subject to snapshot and revert.
    pub fn tracked_keys(mut self, keys: TrackedKeys) -> Self {
        self.config.tracked_keys = keys;
        self
    }

    /// Replace label, parameters and tracked keys with a loaded config.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Wrap every backend update in a batch on `scene`.
    pub fn scene(mut self, scene: Arc<dyn Scene>) -> Self {
        self.scene = scene;
        self
    }

    /// Report scheduling events to `observer`.
    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Spawn backend calls on `handle` instead of the ambient runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the engine.
    ///
    /// Fails if a tracked key is not a parameter, or if no runtime was given
    /// and the caller is not inside a tokio runtime.
    pub fn build(self) -> Result<RecomputeEngine<B>> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|e| EngineError::Config(format!("no tokio runtime: {}", e)))?,
        };

        let EngineConfig {
            label,
            tracked_keys,
            parameters,
        } = self.config;
        let baseline = parameters.snapshot(&tracked_keys);
        let (phase_tx, _) = watch::channel(Phase::Idle);

        tracing::debug!(engine = %label, tracked = tracked_keys.len(), "Engine created");

        Ok(RecomputeEngine {
            shared: Arc::new(Shared {
                label,
                backend: self.backend,
                tracked_keys,
                scene: self.scene,
                observer: self.observer,
                runtime,
                phase_tx,
                state: Mutex::new(State {
                    parameters,
                    baseline,
                    last_good: None,
                    in_flight: None,
                    visuals: Vec::new(),
                    phase: Phase::Idle,
                    lifecycle: Lifecycle::Active,
                    generation: 0,
                    call_count: 0,
                    commit_count: 0,
                    committing: false,
                    reverted: false,
                    pending_after_resync: false,
                    waiters: Vec::new(),
                    cancellation: Cancellation::new(),
                }),
            }),
        })
    }
}

impl<B: RecomputeBackend> RecomputeEngine<B> {
    /// Start building an engine around `backend`.
    pub fn builder(backend: B) -> EngineBuilder<B> {
        EngineBuilder {
            backend,
            config: EngineConfig::default(),
            scene: Arc::new(NoopScene),
            observer: Arc::new(NoopObserver),
            runtime: None,
        }
    }

    /// Create an engine from a config with no scene and no observer.
    pub fn new(backend: B, config: EngineConfig) -> Result<Self> {
        Self::builder(backend).config(config).build()
    }

    /// Request a recomputation with the current parameters.
    ///
    /// The phase transition happens immediately; the returned future only
    /// waits for the chain of backend calls to drain. Requests made while a
    /// call is in flight are coalesced into one trailing call, and all of them
    /// settle together when the engine is next idle.
    pub fn update(&self) -> impl Future<Output = Result<UpdateOutcome>> + Send + use<B> {
        let scheduled = self.schedule_update();
        async move {
            match scheduled {
                Err(ready) => ready,
                // A dropped sender means the engine went away mid-chain
                Ok(rx) => rx.await.unwrap_or(Ok(UpdateOutcome::Cancelled)),
            }
        }
    }

    // Ok: wait on the receiver. Err: already settled.
    fn schedule_update(
        &self,
    ) -> std::result::Result<oneshot::Receiver<Result<UpdateOutcome>>, Result<UpdateOutcome>> {
        let shared = &self.shared;
        let idle_parameters = {
            let state = lock(&shared.state);
            if state.lifecycle.is_terminal() || state.committing {
                return Err(Err(state.invalid("update")));
            }
            (state.phase == Phase::Idle).then(|| state.parameters.clone())
        };

        // Only a call about to be dispatched is checked; coalesced requests
        // are served by the trailing call.
        if let Some(parameters) = idle_parameters
            && let Err(BackendError::NoOp(reason)) = shared.backend.check(&parameters)
        {
            tracing::debug!(engine = %shared.label, reason = %reason, "Update is a no-op");
            return Err(Ok(UpdateOutcome::NoOp));
        }

        let mut state = lock(&shared.state);
        if state.lifecycle.is_terminal() || state.committing {
            return Err(Err(state.invalid("update")));
        }

        let (tx, rx) = oneshot::channel();
        let mut request = None;
        match state.phase {
            Phase::Idle => {
                state.reverted = false;
                shared.set_phase(&mut state, Phase::Running);
                request = Some(shared.next_request(&mut state, CallKind::Update));
            }
            Phase::Running => shared.set_phase(&mut state, Phase::RunningWithPending),
            Phase::RunningWithPending => {}
            Phase::Reverting => state.pending_after_resync = true,
        }
        state.waiters.push(tx);
        drop(state);

        match request {
            Some(request) => shared.dispatch(request),
            None => shared.observer.on_coalesce(&shared.label),
        }
        Ok(rx)
    }

    /// Wait until no update is outstanding.
    pub async fn settled(&self) {
        let mut rx = self.shared.phase_tx.subscribe();
        // The sender lives as long as the engine; an error means it is gone
        let _ = rx.wait_for(|phase| *phase == Phase::Idle).await;
    }

    /// Run the authoritative computation.
    ///
    /// Only legal while idle and active. The engine stays active afterwards
    /// so the caller can still cancel it, or commit again, if a sibling
    /// engine fails; call [`finish`](Self::finish) once the outputs are shown.
    /// On failure the interactive state is left intact.
    pub async fn commit(&self) -> Result<Vec<B::Output>> {
        let shared = &self.shared;
        let (parameters, generation) = {
            let state = lock(&shared.state);
            if state.lifecycle.is_terminal() || state.phase != Phase::Idle || state.committing {
                return Err(state.invalid("commit"));
            }
            (state.parameters.clone(), state.generation)
        };

        shared.backend.check(&parameters)?;

        let committing = {
            let mut state = lock(&shared.state);
            if state.generation != generation
                || state.phase != Phase::Idle
                || state.committing
            {
                return Err(state.invalid("commit"));
            }
            state.committing = true;
            state.commit_count += 1;
            CommitGuard {
                state: &shared.state,
            }
        };

        tracing::debug!(engine = %shared.label, "Committing");
        let result = shared.backend.commit(parameters).await;
        drop(committing);

        let state = lock(&shared.state);
        if state.generation != generation {
            // Cancelled or finished while the commit was running
            let err = state.invalid("commit");
            drop(state);
            if let Ok(mut outputs) = result {
                for output in outputs.iter_mut() {
                    output.cancel();
                }
            }
            return Err(err);
        }
        drop(state);

        match result {
            Ok(outputs) => {
                shared.observer.on_commit(&shared.label, outputs.len());
                Ok(outputs)
            }
            Err(error) => {
                tracing::warn!(engine = %shared.label, error = %error, "Commit failed");
                Err(error.into())
            }
        }
    }

    /// Abandon the operation and restore the baseline.
    ///
    /// Synchronous and idempotent. Any in-flight backend call keeps running
    /// but its response is discarded. Outstanding `update()` futures settle
    /// with [`UpdateOutcome::Cancelled`]. A poisoned engine can still be
    /// cancelled.
    pub fn cancel(&self) {
        let shared = &self.shared;
        let mut state = lock(&shared.state);
        if !matches!(state.lifecycle, Lifecycle::Active | Lifecycle::Poisoned) {
            return;
        }

        state.generation += 1;
        state.lifecycle = Lifecycle::Cancelled;
        state.pending_after_resync = false;
        state.in_flight = None;
        shared.set_phase(&mut state, Phase::Idle);
        let baseline = state.baseline.clone();
        state.parameters.restore(&baseline);
        let waiters = std::mem::take(&mut state.waiters);
        let cancellation = state.cancellation.clone();
        drop(state);

        cancellation.cancel();
        shared.backend.restore_baseline();
        settle(waiters, Ok(UpdateOutcome::Cancelled));
        shared.observer.on_cancel(&shared.label);
    }

    /// Stop accepting updates and keep the current visual state.
    ///
    /// Outstanding `update()` futures settle with
    /// [`UpdateOutcome::Cancelled`]. No-op unless the engine is active.
    pub fn finish(&self) {
        let shared = &self.shared;
        let mut state = lock(&shared.state);
        if state.lifecycle != Lifecycle::Active {
            return;
        }

        state.generation += 1;
        state.lifecycle = Lifecycle::Finished;
        state.pending_after_resync = false;
        state.in_flight = None;
        shared.set_phase(&mut state, Phase::Idle);
        let waiters = std::mem::take(&mut state.waiters);
        let cancellation = state.cancellation.clone();
        drop(state);

        cancellation.cancel();
        settle(waiters, Ok(UpdateOutcome::Cancelled));
        tracing::debug!(engine = %shared.label, "Engine finished");
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// The backend driven by this engine.
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Names of the tracked parameters.
    pub fn tracked_keys(&self) -> &TrackedKeys {
        &self.shared.tracked_keys
    }

    /// A copy of the current parameters.
    pub fn parameters(&self) -> Parameters {
        lock(&self.shared.state).parameters.clone()
    }

    /// Current value of one parameter.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        lock(&self.shared.state).parameters.get(name).cloned()
    }

    /// Set one parameter. Takes effect on the next dispatched call.
    pub fn set(&self, name: impl Into<String>, value: impl Into<ParamValue>) {
        lock(&self.shared.state).parameters.set(name, value);
    }

    /// Edit several parameters at once.
    pub fn with_parameters_mut<R>(&self, f: impl FnOnce(&mut Parameters) -> R) -> R {
        f(&mut lock(&self.shared.state).parameters)
    }

    /// Snapshot taken after the most recent successful call.
    pub fn last_good(&self) -> Option<Snapshot> {
        lock(&self.shared.state).last_good.clone()
    }

    /// Inspect the visuals returned by the most recent successful call.
    pub fn with_visuals<R>(&self, f: impl FnOnce(&[B::Visual]) -> R) -> R {
        f(&lock(&self.shared.state).visuals)
    }

    /// Number of recompute calls issued, resync calls included.
    pub fn call_count(&self) -> u64 {
        lock(&self.shared.state).call_count
    }

    /// Number of commit calls issued.
    pub fn commit_count(&self) -> u64 {
        lock(&self.shared.state).commit_count
    }

    /// Current scheduling phase.
    pub fn phase(&self) -> Phase {
        lock(&self.shared.state).phase
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        lock(&self.shared.state).lifecycle
    }

    /// Generation counter; bumped by `cancel()` and `finish()`.
    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }
}

impl<B: RecomputeBackend> Shared<B> {
    fn set_phase(&self, state: &mut State<B::Visual>, phase: Phase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn next_request(&self, state: &mut State<B::Visual>, kind: CallKind) -> RecomputeRequest {
        state.call_count += 1;
        state.in_flight = Some(state.parameters.snapshot(&self.tracked_keys));
        RecomputeRequest {
            parameters: state.parameters.clone(),
            generation: state.generation,
            call: state.call_count,
            kind,
            cancellation: state.cancellation.clone(),
        }
    }

    fn dispatch(self: &Arc<Self>, request: RecomputeRequest) {
        self.observer
            .on_dispatch(&self.label, request.call, request.kind);

        let (generation, call, kind) = (request.generation, request.call, request.kind);
        let worker = Arc::clone(self);
        let call_task = self.runtime.spawn(async move {
            let _batch = MutationBatch::begin(Arc::clone(&worker.scene));
            worker.backend.recompute(request).await
        });

        // A panicking call must still settle the chain
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = match call_task.await {
                Ok(result) => result,
                Err(error) => {
                    tracing::error!(engine = %shared.label, call, error = %error, "Backend call aborted");
                    Err(BackendError::failed(format!("backend call aborted: {}", error)))
                }
            };
            shared.complete(generation, call, kind, result);
        });
    }

    fn complete(
        self: &Arc<Self>,
        generation: u64,
        call: u64,
        kind: CallKind,
        result: std::result::Result<Vec<B::Visual>, BackendError>,
    ) {
        let mut state = lock(&self.state);
        if state.generation != generation {
            drop(state);
            self.observer.on_stale(&self.label, call, generation);
            return;
        }

        let mut effects = Effects::default();
        let error = match result {
            Ok(visuals) => {
                self.on_call_succeeded(&mut state, &mut effects);
                state.visuals = visuals;
                None
            }
            Err(error) => {
                self.on_call_failed(&mut state, &mut effects, kind, &error);
                Some(error)
            }
        };
        drop(state);

        match &error {
            None => self.observer.on_success(&self.label, call, kind),
            Some(e) => self.observer.on_failure(&self.label, call, kind, e),
        }
        if let Some(changed) = effects.reverted {
            self.observer.on_revert(&self.label, &changed);
        }
        if let Some(request) = effects.dispatch {
            self.dispatch(request);
        }
        if let Some((waiters, outcome)) = effects.settle {
            if let Err(e) = &outcome {
                tracing::error!(engine = %self.label, error = %e, "Engine poisoned");
            }
            settle(waiters, outcome);
        }
    }

    fn on_call_succeeded(&self, state: &mut State<B::Visual>, effects: &mut Effects) {
        if let Some(snapshot) = state.in_flight.take() {
            state.last_good = Some(snapshot);
        }

        let follow_up = match state.phase {
            Phase::RunningWithPending => true,
            Phase::Reverting => std::mem::take(&mut state.pending_after_resync),
            Phase::Running | Phase::Idle => false,
        };

        if follow_up {
            self.set_phase(state, Phase::Running);
            effects.dispatch = Some(self.next_request(state, CallKind::Trailing));
        } else {
            self.set_phase(state, Phase::Idle);
            let outcome = if state.reverted {
                UpdateOutcome::Reverted
            } else {
                UpdateOutcome::Applied
            };
            effects.settle = Some((std::mem::take(&mut state.waiters), Ok(outcome)));
        }
    }

    fn on_call_failed(
        &self,
        state: &mut State<B::Visual>,
        effects: &mut Effects,
        kind: CallKind,
        error: &BackendError,
    ) {
        if kind == CallKind::Resync {
            state.lifecycle = Lifecycle::Poisoned;
            state.pending_after_resync = false;
            self.set_phase(state, Phase::Idle);
            effects.settle = Some((
                std::mem::take(&mut state.waiters),
                Err(EngineError::ResyncFailed(error.clone())),
            ));
            return;
        }

        // The pending request, if any, is served by the resync call: the
        // revert overwrites the values a trailing call would have read.
        state.reverted = true;
        self.set_phase(state, Phase::Reverting);
        let changed = match state.last_good.clone() {
            Some(snapshot) => state.parameters.restore(&snapshot),
            None => Vec::new(),
        };
        effects.reverted = Some(changed);
        effects.dispatch = Some(self.next_request(state, CallKind::Resync));
    }
}

impl<B: RecomputeBackend> Cancellable for RecomputeEngine<B> {
    fn cancel(&self) {
        RecomputeEngine::cancel(self);
    }

    fn finish(&self) {
        RecomputeEngine::finish(self);
    }
}

impl<B: RecomputeBackend> std::fmt::Debug for RecomputeEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("RecomputeEngine")
            .field("label", &self.shared.label)
            .field("phase", &state.phase)
            .field("lifecycle", &state.lifecycle)
            .field("generation", &state.generation)
            .field("call_count", &state.call_count)
            .finish()
    }
}

fn settle(waiters: Vec<Waiter>, outcome: Result<UpdateOutcome>) {
    for waiter in waiters {
        // The caller may have dropped its future
        let _ = waiter.send(outcome.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
