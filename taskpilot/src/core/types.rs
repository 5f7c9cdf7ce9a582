//! Shared deterministic types for planning, routing and execution.
//!
//! These types define stable contracts between components and are serialized
//! verbatim into the history document, so field names must remain stable.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrchestratorError;

/// Backend category a step can be routed to.
///
/// `Hybrid` is a pseudo-backend implemented by the router: it decomposes its
/// description and dispatches each clause to one of the real categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Vision,
    Structured,
    Learning,
    Hybrid,
}

impl BackendKind {
    /// Categories that can hold a registered implementation.
    pub const REGISTRABLE: [BackendKind; 3] = [
        BackendKind::Vision,
        BackendKind::Structured,
        BackendKind::Learning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Vision => "vision",
            BackendKind::Structured => "structured",
            BackendKind::Learning => "learning",
            BackendKind::Hybrid => "hybrid",
        }
    }

    /// Parse a category name, accepting the legacy module names
    /// (`self_operating`, `comprehensive`, `vlm`) used by older planners.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vision" | "self_operating" => Some(BackendKind::Vision),
            "structured" | "comprehensive" => Some(BackendKind::Structured),
            "learning" | "vlm" => Some(BackendKind::Learning),
            "hybrid" => Some(BackendKind::Hybrid),
            _ => None,
        }
    }

    /// One-line description of what the category is good at.
    pub fn strengths(self) -> &'static str {
        match self {
            BackendKind::Vision => {
                "screen-driven control: visual navigation, clicking UI elements, browsing, scrolling"
            }
            BackendKind::Structured => {
                "structured commands: launching and closing apps, file operations, system settings"
            }
            BackendKind::Learning => {
                "observation and learning: watching workflows, detecting patterns, remembering"
            }
            BackendKind::Hybrid => {
                "compound instructions: splits the description into clauses and routes each one"
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// Declared execution strategy of a plan.
///
/// Every strategy currently executes sequentially: the vision backend drives a
/// single shared input focus, so steps never overlap. `Parallel` is accepted
/// and recorded but reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Hybrid,
    Parallel,
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    Ai,
    Heuristic,
}

/// Result of classifying one task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationAnalysis {
    pub task: String,
    /// Category chosen by the last matching rule (may be `hybrid`).
    pub recommended_backend: BackendKind,
    /// Category chosen by the last matching single-category rule; never `hybrid`.
    pub direct_backend: BackendKind,
    pub requires_vision: bool,
    pub requires_learning: bool,
    pub requires_multi_step_planning: bool,
    pub complexity: Complexity,
    pub reasoning: String,
}

/// One unit of planned work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position within the plan.
    pub index: usize,
    pub description: String,
    pub target_backend: BackendKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Indices of earlier steps this one relies on.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// A failed critical step halts the rest of the run.
    pub critical: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Ordered steps derived from a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
    pub strategy: Strategy,
    pub success_criteria: String,
    pub complexity: Complexity,
    pub source: PlanSource,
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: Step,
    /// `None` when no backend could be resolved for the step.
    pub backend_used: Option<BackendKind>,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub output: Value,
    pub error: Option<String>,
}

/// Lifecycle of a single plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Aborted,
    PartialFailure,
}


/// Why a run stopped before attempting every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// A critical step ran and failed.
    CriticalStepFailed { step: usize, description: String },
    /// A critical step had no routable backend.
    BackendUnavailable { step: usize, backend: BackendKind },
    /// Cancellation was observed after `completed_through` steps were attempted.
    Cancelled { completed_through: usize },
    /// The backend call of `step` timed out and did not return after cancellation.
    BackendStillRunning { step: usize },
    /// The run was refused before any step was attempted.
    Rejected { reason: String },
}

impl AbortReason {
    /// The error this abort corresponds to.
    pub fn to_error(&self) -> OrchestratorError {
        match self {
            AbortReason::CriticalStepFailed { step, description } => {
                OrchestratorError::CriticalStepAbort {
                    step: *step,
                    description: description.clone(),
                }
            }
            AbortReason::BackendUnavailable { backend, .. } => {
                OrchestratorError::BackendUnavailable { wanted: *backend }
            }
            AbortReason::Cancelled { completed_through } => OrchestratorError::Cancelled {
                completed_through: *completed_through,
            },
            AbortReason::BackendStillRunning { step } => {
                OrchestratorError::BackendBusy { step: *step }
            }
            AbortReason::Rejected { reason } => OrchestratorError::RunRejected(reason.clone()),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::BackendUnavailable { step, .. } => {
                write!(f, "{} at critical step {step}", self.to_error())
            }
            _ => write!(f, "{}", self.to_error()),
        }
    }
}

/// Summary of one plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub goal: String,
    /// Number of steps in the plan, attempted or not.
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub duration_seconds: f64,
    /// False if any attempted step failed.
    pub overall_success: bool,
    pub state: RunState,
    pub abort_reason: Option<AbortReason>,
    pub step_results: Vec<StepResult>,
}

impl ExecutionResult {
    /// Result for a run refused before execution began.
    pub fn rejected(goal: &str, total_steps: usize, reason: impl Into<String>) -> Self {
        Self {
            goal: goal.to_string(),
            total_steps,
            completed_steps: 0,
            failed_steps: 0,
            duration_seconds: 0.0,
            overall_success: false,
            state: RunState::Aborted,
            abort_reason: Some(AbortReason::Rejected {
                reason: reason.into(),
            }),
            step_results: Vec::new(),
        }
    }

    /// Results of the steps that failed, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.step_results.iter().filter(|result| !result.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_canonical_and_legacy_names() {
        assert_eq!(BackendKind::parse("vision"), Some(BackendKind::Vision));
        assert_eq!(BackendKind::parse("self_operating"), Some(BackendKind::Vision));
        assert_eq!(BackendKind::parse(" Comprehensive "), Some(BackendKind::Structured));
        assert_eq!(BackendKind::parse("vlm"), Some(BackendKind::Learning));
        assert_eq!(BackendKind::parse("hybrid"), Some(BackendKind::Hybrid));
        assert_eq!(BackendKind::parse("telepathy"), None);
    }

    #[test]
    fn abort_reason_serializes_with_kind_tag() {
        let reason = AbortReason::BackendUnavailable {
            step: 2,
            backend: BackendKind::Structured,
        };
        let value = serde_json::to_value(&reason).expect("serialize");
        assert_eq!(value["kind"], "backend_unavailable");
        assert_eq!(value["backend"], "structured");
        assert_eq!(
            reason.to_string(),
            "no backend available for structured (fallback vision backend is not registered) \
             at critical step 2"
        );
    }

    #[test]
    fn abort_reason_messages_come_from_the_error_taxonomy() {
        let critical = AbortReason::CriticalStepFailed {
            step: 3,
            description: "click ok".to_string(),
        };
        assert_eq!(
            critical.to_error(),
            OrchestratorError::CriticalStepAbort {
                step: 3,
                description: "click ok".to_string()
            }
        );
        assert_eq!(critical.to_string(), critical.to_error().to_string());

        let cancelled = AbortReason::Cancelled {
            completed_through: 1,
        };
        assert_eq!(cancelled.to_string(), "run cancelled after 1 step(s)");

        let stuck = AbortReason::BackendStillRunning { step: 2 };
        assert_eq!(stuck.to_error(), OrchestratorError::BackendBusy { step: 2 });

        let rejected = AbortReason::Rejected {
            reason: "goal is empty".to_string(),
        };
        assert_eq!(rejected.to_string(), "run rejected: goal is empty");
    }

    #[test]
    fn rejected_result_is_aborted_without_steps() {
        let result = ExecutionResult::rejected("goal", 3, "busy");
        assert_eq!(result.state, RunState::Aborted);
        assert!(!result.overall_success);
        assert_eq!(result.total_steps, 3);
        assert!(result.step_results.is_empty());
    }
}
