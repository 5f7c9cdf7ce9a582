//! Plan execution under a run-to-completion state machine.
//!
//! `NotStarted -> Running -> {Completed | Aborted | PartialFailure}`
//!
//! - A failed critical step stops the run (`Aborted`); later steps are never attempted.
//! - A failed non-critical step is recorded and the run continues (`PartialFailure`).
//! - Cancellation is observed only between steps.
//! - Each backend call runs on a worker thread bounded by the step timeout; on
//!   timeout the step fails and the backend's cancel token is tripped.
//! - At most one backend call is in flight. After a timeout the executor waits
//!   up to `cancel_grace` for the worker to return; if it is still running the
//!   run aborts, and later runs are rejected until it has returned.
//!
//! Only one plan runs at a time per executor. The run lock is taken with
//! `try_lock`, so a concurrent or nested run is rejected instead of blocking.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendResponse, CancelToken, ExecContext};
use crate::core::invariants::validate_plan;
use crate::core::types::{AbortReason, ExecutionResult, Plan, RunState, Step, StepResult, Strategy};
use crate::error::OrchestratorError;
use crate::router::{BackendHandle, Router};

/// Called with `(step_index, total_steps, description)` right before a step runs.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize, &str) + 'a;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on a single backend call.
    pub step_timeout: Duration,
    /// How long a cancelled backend call may take to return before the run
    /// gives up waiting on it.
    pub cancel_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

/// Clears the in-flight marker when the worker thread ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Runs plans against a [`Router`].
#[derive(Debug)]
pub struct Executor {
    router: Router,
    config: ExecutorConfig,
    run_lock: Mutex<()>,
    active_cancel: Mutex<Option<CancelToken>>,
    /// Step index of the backend call still running on a worker, 0 when none.
    in_flight: Arc<AtomicUsize>,
}

impl Executor {
    pub fn new(router: Router, config: ExecutorConfig) -> Self {
        Self {
            router,
            config,
            run_lock: Mutex::new(()),
            active_cancel: Mutex::new(None),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// True while a plan is executing.
    pub fn is_running(&self) -> bool {
        matches!(self.run_lock.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// True when no backend call is running, including calls left over from a
    /// step that timed out.
    pub fn is_backend_idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Request cancellation of the active run. Returns false when idle.
    ///
    /// The step in flight finishes; no further step starts.
    pub fn cancel(&self) -> bool {
        match self.active_cancel_slot().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Execute `plan`, invoking `progress` before each step.
    ///
    /// Errors only when the plan is rejected before any step runs.
    pub fn execute(
        &self,
        plan: &Plan,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<ExecutionResult, OrchestratorError> {
        self.execute_with_start(plan, progress, || {})
    }

    /// Like [`Executor::execute`], calling `on_start` once the run has been
    /// accepted and before the first step. Rejected runs never call it.
    #[instrument(skip_all, fields(goal = %plan.goal, steps = plan.steps.len()))]
    pub fn execute_with_start(
        &self,
        plan: &Plan,
        mut progress: Option<&mut ProgressCallback<'_>>,
        on_start: impl FnOnce(),
    ) -> Result<ExecutionResult, OrchestratorError> {
        if plan.steps.is_empty() {
            return Err(OrchestratorError::EmptyPlanRejected);
        }
        let errors = validate_plan(plan);
        if !errors.is_empty() {
            return Err(OrchestratorError::InvalidPlan(errors.join("; ")));
        }

        let _run = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(OrchestratorError::RunInProgress),
        };
        if let Some(step) = self.wait_for_backend() {
            warn!(step, "backend call from an earlier run is still running");
            return Err(OrchestratorError::BackendBusy { step });
        }
        on_start();
        let cancel = CancelToken::new();
        *self.active_cancel_slot() = Some(cancel.clone());

        let start = Instant::now();
        let total = plan.steps.len();
        let mut state = RunState::Running;
        if plan.strategy != Strategy::Sequential {
            debug!(strategy = ?plan.strategy, "strategy runs sequentially");
        }
        info!(?state, total, "run started");

        let mut results: Vec<StepResult> = Vec::with_capacity(total);
        let mut abort_reason: Option<AbortReason> = None;

        for step in &plan.steps {
            if cancel.is_cancelled() {
                warn!(completed_through = results.len(), "run cancelled");
                abort_reason = Some(AbortReason::Cancelled {
                    completed_through: results.len(),
                });
                break;
            }
            if let Some(callback) = progress.as_mut() {
                callback(step.index, total, &step.description);
            }

            let result = self.run_step(plan, step);
            let failed = !result.success;
            let unrouted = result.backend_used.is_none();
            results.push(result);

            if failed && step.critical {
                warn!(step = step.index, "critical step failed, aborting run");
                abort_reason = Some(if unrouted {
                    AbortReason::BackendUnavailable {
                        step: step.index,
                        backend: step.target_backend,
                    }
                } else {
                    AbortReason::CriticalStepFailed {
                        step: step.index,
                        description: step.description.clone(),
                    }
                });
                break;
            }
            if let Some(busy) = self.wait_for_backend() {
                warn!(step = busy, "timed-out backend call did not return, aborting run");
                abort_reason = Some(AbortReason::BackendStillRunning { step: busy });
                break;
            }
        }

        let completed_steps = results.iter().filter(|r| r.success).count();
        let failed_steps = results.len() - completed_steps;
        state = if abort_reason.is_some() {
            RunState::Aborted
        } else if failed_steps > 0 {
            RunState::PartialFailure
        } else {
            RunState::Completed
        };
        let duration_seconds = start.elapsed().as_secs_f64();
        *self.active_cancel_slot() = None;

        info!(
            ?state,
            completed_steps, failed_steps, total, duration_seconds, "run finished"
        );
        Ok(ExecutionResult {
            goal: plan.goal.clone(),
            total_steps: total,
            completed_steps,
            failed_steps,
            duration_seconds,
            overall_success: failed_steps == 0 && abort_reason.is_none(),
            state,
            abort_reason,
            step_results: results,
        })
    }

    fn run_step(&self, plan: &Plan, step: &Step) -> StepResult {
        let handle = match self.router.route(step) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(step = step.index, err = %err, "no backend for step");
                return StepResult {
                    step: step.clone(),
                    backend_used: None,
                    success: false,
                    message: format!("Step {} could not be routed", step.index),
                    output: Value::Null,
                    error: Some(err.to_string()),
                };
            }
        };

        let backend_used = Some(handle.kind);
        match self.invoke(handle, step, step_context(plan, step)) {
            Ok(response) => {
                let error = if response.success {
                    None
                } else {
                    let message = response
                        .error
                        .clone()
                        .unwrap_or_else(|| response.message.clone());
                    Some(
                        OrchestratorError::StepExecutionFailed {
                            step: step.index,
                            message,
                        }
                        .to_string(),
                    )
                };
                debug!(step = step.index, success = response.success, "step finished");
                StepResult {
                    step: step.clone(),
                    backend_used,
                    success: response.success,
                    message: response.message,
                    output: response.output,
                    error,
                }
            }
            Err(err) => {
                warn!(step = step.index, err = %format!("{err:#}"), "step errored");
                StepResult {
                    step: step.clone(),
                    backend_used,
                    success: false,
                    message: format!("Step {} did not complete", step.index),
                    output: Value::Null,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    /// Run the backend call on a worker thread, bounded by the step timeout.
    fn invoke(
        &self,
        handle: BackendHandle,
        step: &Step,
        context: ExecContext,
    ) -> Result<BackendResponse> {
        let timeout = self.config.step_timeout;
        let step_cancel = CancelToken::new();
        let worker_cancel = step_cancel.clone();
        let description = step.description.clone();
        let (tx, rx) = mpsc::channel();

        self.in_flight.store(step.index, Ordering::SeqCst);
        let in_flight = InFlightGuard(Arc::clone(&self.in_flight));
        thread::Builder::new()
            .name(format!("taskpilot-step-{}", step.index))
            .spawn(move || {
                let _in_flight = in_flight;
                let response = handle.execute(&description, &context, &worker_cancel);
                // The receiver is gone once the step timed out.
                let _ = tx.send(response);
            })
            .context("spawn step worker")?;

        match rx.recv_timeout(timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => {
                step_cancel.cancel();
                Err(anyhow!(OrchestratorError::StepTimedOut {
                    step: step.index,
                    timeout,
                }))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("backend worker exited without a result"))
            }
        }
    }

    /// Wait up to `cancel_grace` for the in-flight backend call to return.
    /// Returns its step index if it is still running.
    fn wait_for_backend(&self) -> Option<usize> {
        let deadline = Instant::now() + self.config.cancel_grace;
        loop {
            let step = self.in_flight.load(Ordering::SeqCst);
            if step == 0 {
                return None;
            }
            if Instant::now() >= deadline {
                return Some(step);
            }
            thread::sleep(IDLE_POLL);
        }
    }

    fn active_cancel_slot(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn step_context(plan: &Plan, step: &Step) -> ExecContext {
    let mut context = ExecContext::new();
    context.insert("goal".to_string(), json!(plan.goal));
    context.insert("step_number".to_string(), json!(step.index));
    context.insert("total_steps".to_string(), json!(plan.steps.len()));
    context.insert("critical".to_string(), json!(step.critical));
    context.insert("strategy".to_string(), json!(plan.strategy));
    context.insert("parameters".to_string(), Value::Object(step.parameters.clone()));
    context
}
