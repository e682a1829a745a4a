/*
 * command.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * All-or-nothing orchestration of several engines.
 */

//! Interactive command driver.
//!
//! A [`Command`] owns the registrar for one user-facing operation and the
//! engines that take part in it. Abort cancels everything; confirm commits
//! every engine and only swaps results into view once all of them succeeded.

use std::sync::Arc;

use async_trait::async_trait;
use recompute_cancel::{Cancellable, CancellableRegistor, RegistorState};

use crate::backend::{Presentable, RecomputeBackend};
use crate::engine::RecomputeEngine;
use crate::error::Result;

/// Object-safe view of an engine for confirmation.
#[async_trait]
pub trait CommitStep: Cancellable {
    /// Label used in logs.
    fn label(&self) -> &str;

    /// Wait until no update is outstanding.
    async fn settled(&self);

    /// Commit and type-erase the outputs.
    async fn commit_outputs(&self) -> Result<Vec<Box<dyn Presentable>>>;
}

#[async_trait]
impl<B: RecomputeBackend> CommitStep for RecomputeEngine<B> {
    fn label(&self) -> &str {
        RecomputeEngine::label(self)
    }

    async fn settled(&self) {
        RecomputeEngine::settled(self).await
    }

    async fn commit_outputs(&self) -> Result<Vec<Box<dyn Presentable>>> {
        let outputs = self.commit().await?;
        Ok(outputs
            .into_iter()
            .map(|output| Box::new(output) as Box<dyn Presentable>)
            .collect())
    }
}

/// One interactive operation over any number of engines.
pub struct Command {
    label: String,
    registor: Arc<CancellableRegistor>,
    steps: Vec<Arc<dyn CommitStep>>,
}

impl Command {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            registor: Arc::new(CancellableRegistor::new()),
            steps: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register an engine and include it in confirmation.
    pub fn add_engine<B: RecomputeBackend>(
        &mut self,
        engine: Arc<RecomputeEngine<B>>,
    ) -> Arc<RecomputeEngine<B>> {
        let engine = self.registor.register(engine);
        self.steps.push(engine.clone());
        engine
    }

    /// Register any other resource torn down with the command.
    pub fn register<R: Cancellable + 'static>(&self, resource: Arc<R>) -> Arc<R> {
        self.registor.register(resource)
    }

    /// The registrar owned by this command.
    pub fn registor(&self) -> &Arc<CancellableRegistor> {
        &self.registor
    }

    pub fn state(&self) -> RegistorState {
        self.registor.state()
    }

    /// Commit every engine and show the results.
    ///
    /// Engines are committed in the order they were added. If any commit
    /// fails, the outputs already produced are cancelled, the registrar and
    /// every engine stay active so the user can adjust and retry, and the
    /// error is returned. An engine whose parameters are a no-op
    /// contributes nothing. Returns the number of outputs shown.
    pub async fn confirm(&self) -> Result<usize> {
        for step in &self.steps {
            step.settled().await;
        }

        let mut outputs: Vec<Box<dyn Presentable>> = Vec::new();
        for step in &self.steps {
            match step.commit_outputs().await {
                Ok(produced) => outputs.extend(produced),
                Err(error) if error.is_no_op() => {
                    tracing::debug!(command = %self.label, engine = %step.label(), "Nothing to commit");
                }
                Err(error) => {
                    tracing::warn!(
                        command = %self.label,
                        engine = %step.label(),
                        error = %error,
                        undone = outputs.len(),
                        "Commit failed, undoing committed results"
                    );
                    for output in outputs.iter_mut() {
                        output.cancel();
                    }
                    return Err(error);
                }
            }
        }

        for output in outputs.iter_mut() {
            output.show();
        }
        self.registor.finish();

        tracing::info!(command = %self.label, outputs = outputs.len(), "Command confirmed");
        Ok(outputs.len())
    }

    /// Cancel everything the command registered.
    pub fn abort(&self) {
        tracing::info!(command = %self.label, "Command aborted");
        self.registor.cancel();
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("label", &self.label)
            .field("engines", &self.steps.len())
            .field("registor", &self.registor)
            .finish()
    }
}
