//! Composition root: planner, executor, registry and history behind one API.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::backend::BackendRegistry;
use crate::core::stats::backend_stats;
use crate::core::types::{BackendKind, ExecutionResult, Plan};
use crate::error::OrchestratorError;
use crate::executor::{Executor, ExecutorConfig, ProgressCallback};
use crate::history::{HistoryEntry, HistoryLog};
use crate::io::command_backend::CommandBackend;
use crate::io::config::TaskpilotConfig;
use crate::io::history_store::{default_history_path, write_history};
use crate::io::plan_generator::CommandPlanGenerator;
use crate::planner::Planner;
use crate::router::Router;

/// Point-in-time view of the orchestrator, computed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub has_current_plan: bool,
    pub history_size: usize,
    pub active_run: bool,
    /// A backend call, possibly one that timed out, has not returned yet.
    pub backend_call_in_flight: bool,
    pub ai_planning_available: bool,
    pub backends_available: BTreeMap<BackendKind, bool>,
}

#[derive(Debug)]
pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    registry: Arc<BackendRegistry>,
    history: HistoryLog,
    current_plan: Mutex<Option<Plan>>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<BackendRegistry>,
        planner: Planner,
        history_capacity: usize,
        executor_config: ExecutorConfig,
    ) -> Self {
        let executor = Executor::new(Router::new(registry.clone()), executor_config);
        Self {
            planner,
            executor,
            registry,
            history: HistoryLog::new(history_capacity),
            current_plan: Mutex::new(None),
        }
    }

    /// Register a [`CommandBackend`] per configured backend and, when
    /// configured, a [`CommandPlanGenerator`].
    pub fn from_config(cfg: &TaskpilotConfig) -> Result<Self> {
        cfg.validate()?;
        let mut registry = BackendRegistry::new();
        for (kind, command) in cfg.backends.configured() {
            let backend = CommandBackend::new(
                kind,
                command.command.clone(),
                cfg.step_timeout(),
                cfg.output_limit_bytes,
            );
            registry
                .register(kind, Arc::new(backend))
                .with_context(|| format!("register {kind} backend"))?;
        }
        let planner = match &cfg.planner {
            Some(command) => Planner::with_generator(Arc::new(CommandPlanGenerator::new(
                command.command.clone(),
                cfg.step_timeout(),
                cfg.output_limit_bytes,
            ))),
            None => Planner::heuristic(),
        };
        info!(
            backends = ?registry.availability(),
            ai_planning = planner.has_generator(),
            "orchestrator configured"
        );
        Ok(Self::new(
            Arc::new(registry),
            planner,
            cfg.history_capacity,
            ExecutorConfig {
                step_timeout: cfg.step_timeout(),
                cancel_grace: cfg.cancel_grace(),
            },
        ))
    }

    /// Plan `goal` and remember it as the current plan.
    pub fn plan(&self, goal: &str) -> Result<Plan, OrchestratorError> {
        let plan = self.planner.plan(goal)?;
        *self.current_plan_slot() = Some(plan.clone());
        Ok(plan)
    }

    /// Execute an existing plan and append the run to history.
    ///
    /// Errors only when the plan is rejected before any step runs; rejected
    /// runs are not recorded and leave the current plan untouched.
    pub fn execute_plan(
        &self,
        plan: &Plan,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<ExecutionResult, OrchestratorError> {
        let result = self.executor.execute_with_start(plan, progress, || {
            *self.current_plan_slot() = Some(plan.clone());
        })?;
        self.history
            .append(HistoryEntry::now(plan.clone(), result.clone()));
        Ok(result)
    }

    /// Plan and execute `goal`. Never fails: planning or pre-run rejection is
    /// reported as an aborted result with a `rejected` reason.
    #[instrument(skip_all, fields(goal = %goal))]
    pub fn execute_goal(
        &self,
        goal: &str,
        progress: Option<&mut ProgressCallback<'_>>,
    ) -> ExecutionResult {
        let plan = match self.planner.plan(goal) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(err = %err, "goal rejected");
                return ExecutionResult::rejected(goal, 0, err.to_string());
            }
        };
        match self.execute_plan(&plan, progress) {
            Ok(result) => result,
            Err(err) => {
                warn!(err = %err, "run rejected");
                ExecutionResult::rejected(goal, plan.steps.len(), err.to_string())
            }
        }
    }

    pub fn status(&self) -> Status {
        Status {
            has_current_plan: self.current_plan_slot().is_some(),
            history_size: self.history.len(),
            active_run: self.executor.is_running(),
            backend_call_in_flight: !self.executor.is_backend_idle(),
            ai_planning_available: self.planner.has_generator(),
            backends_available: self.registry.availability(),
        }
    }

    /// Request cancellation of the active run. Returns false when idle.
    pub fn cancel(&self) -> bool {
        self.executor.cancel()
    }

    pub fn current_plan(&self) -> Option<Plan> {
        self.current_plan_slot().clone()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Write the history document to `path`, or to a timestamped file in the
    /// working directory. Returns the path written.
    ///
    /// Per-backend counters are derived from the same history snapshot.
    pub fn save_history(&self, path: Option<&Path>) -> Result<PathBuf> {
        let now = Utc::now();
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_history_path(now));
        let status = self.status();
        let current_plan = self.current_plan();
        let entries = self.history.snapshot();
        let stats = backend_stats(entries.iter().map(|entry| &entry.result));
        write_history(&path, now, &status, current_plan.as_ref(), stats, &entries)
            .with_context(|| format!("save history to {}", path.display()))?;
        Ok(path)
    }

    fn current_plan_slot(&self) -> MutexGuard<'_, Option<Plan>> {
        self.current_plan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
