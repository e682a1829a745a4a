//! Error types for recompute-core

use crate::engine::{Lifecycle, Phase};

/// Failure reported by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Parameters describe an operation that would change nothing
    /// (e.g. a zero move distance). Callers treat this as "nothing to do".
    #[error("No-op: {0}")]
    NoOp(String),

    /// Parameters are individually valid but the combination was rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Any other backend failure.
    #[error("Backend failed: {0}")]
    Failed(String),
}

impl BackendError {
    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a Failed error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Check if this is a no-op signal rather than a failure.
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }
}

/// Error surfaced by a [`RecomputeEngine`](crate::RecomputeEngine) to the
/// command driving it.
///
/// Ordinary interactive update failures never appear here; they are
/// recovered inside the engine by reverting to the last good parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Nothing to do for the current parameters.
    #[error("Nothing to commit: {0}")]
    NoOp(String),

    /// The authoritative commit computation failed.
    #[error("Commit failed: {0}")]
    Backend(#[source] BackendError),

    /// Protocol misuse, e.g. committing while an update is outstanding.
    #[error("Cannot {operation} while engine is {phase:?} ({lifecycle:?})")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Scheduling phase at the time
        phase: Phase,
        /// Lifecycle state at the time
        lifecycle: Lifecycle,
    },

    /// The resynchronization call after a revert failed; no consistent
    /// state can be certified any more.
    #[error("Resynchronization after revert failed: {0}")]
    ResyncFailed(#[source] BackendError),

    /// The engine was poisoned by an earlier resynchronization failure.
    #[error("Engine is poisoned by an earlier resynchronization failure")]
    Poisoned,

    /// A tracked key is not present on the parameters.
    #[error("Tracked key '{0}' is not a known parameter")]
    UnknownTrackedKey(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Check if this error only means "nothing to do".
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }

    /// Check if the engine can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResyncFailed(_) | Self::Poisoned | Self::InvalidState { .. }
        )
    }
}

impl From<BackendError> for EngineError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NoOp(reason) => EngineError::NoOp(reason),
            other => EngineError::Backend(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::validation("profile self-intersects");
        assert!(err.to_string().contains("self-intersects"));
        assert!(!err.is_no_op());
        assert!(BackendError::NoOp("zero distance".into()).is_no_op());
    }

    #[test]
    fn test_no_op_conversion() {
        let err: EngineError = BackendError::NoOp("zero distance".into()).into();
        assert!(err.is_no_op());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_failure_conversion() {
        let err: EngineError = BackendError::failed("kernel crashed").into();
        assert!(matches!(err, EngineError::Backend(BackendError::Failed(_))));
        assert!(err.to_string().contains("kernel crashed"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = EngineError::InvalidState {
            operation: "commit",
            phase: Phase::Running,
            lifecycle: Lifecycle::Active,
        };
        let msg = err.to_string();
        assert!(msg.contains("commit"));
        assert!(msg.contains("Running"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resync_failure_is_fatal() {
        assert!(EngineError::ResyncFailed(BackendError::failed("x")).is_fatal());
        assert!(EngineError::Poisoned.is_fatal());
    }
}
