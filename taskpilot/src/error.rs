//! Error taxonomy for planning, routing and execution.
//!
//! Only [`OrchestratorError::EmptyGoal`], [`OrchestratorError::EmptyPlanRejected`],
//! [`OrchestratorError::InvalidPlan`], [`OrchestratorError::RunInProgress`] and
//! [`OrchestratorError::BackendBusy`] are ever returned before a run starts.
//! The remaining variants describe conditions captured into step results, or
//! the error behind an [`AbortReason`](crate::core::types::AbortReason).

use std::time::Duration;

use thiserror::Error;

use crate::core::types::BackendKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// No routable backend exists for a step. Terminal, never retried.
    #[error("no backend available for {wanted} (fallback vision backend is not registered)")]
    BackendUnavailable { wanted: BackendKind },

    /// A backend reported `success = false` or returned an error.
    #[error("step {step} failed: {message}")]
    StepExecutionFailed { step: usize, message: String },

    /// A backend call exceeded the per-step timeout.
    #[error("step {step} timed out after {:.1}s", timeout.as_secs_f64())]
    StepTimedOut { step: usize, timeout: Duration },

    /// The planning collaborator produced an unusable response.
    #[error("plan response could not be used: {0}")]
    PlanParseFailed(String),

    #[error("plan has no steps")]
    EmptyPlanRejected,

    #[error("plan is invalid: {0}")]
    InvalidPlan(String),

    #[error("goal is empty")]
    EmptyGoal,

    /// A critical step failed and the remaining steps were skipped.
    #[error("critical step {step} failed, aborting run: {description}")]
    CriticalStepAbort { step: usize, description: String },

    #[error("run cancelled after {completed_through} step(s)")]
    Cancelled { completed_through: usize },

    /// Another plan is already executing on this executor.
    #[error("another run is already in progress")]
    RunInProgress,

    /// A timed-out backend call has not returned after cancellation, so no
    /// other backend call may start.
    #[error("backend call for step {step} is still running after cancellation")]
    BackendBusy { step: usize },

    #[error("run rejected: {0}")]
    RunRejected(String),

    #[error("backend category {0} cannot be registered")]
    ReservedBackend(BackendKind),
}
