//! Test-only helpers: scripted collaborators and plan builders.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};

use crate::backend::{Backend, BackendRegistry, BackendResponse, CancelToken, ExecContext};
use crate::core::types::{BackendKind, Complexity, Plan, PlanSource, Step, Strategy};
use crate::planner::PlanGenerator;

const DELAY_POLL: Duration = Duration::from_millis(5);

/// Backend that succeeds or fails by description and records every call.
pub struct ScriptedBackend {
    default_success: bool,
    fail_on: Vec<String>,
    error: Option<String>,
    delay: Option<Duration>,
    honors_cancel: bool,
    calls: Mutex<Vec<(String, ExecContext)>>,
    observed_cancel: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedBackend {
    fn with_default(default_success: bool) -> Self {
        Self {
            default_success,
            fail_on: Vec::new(),
            error: None,
            delay: None,
            honors_cancel: true,
            calls: Mutex::new(Vec::new()),
            observed_cancel: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_default(true)
    }

    pub fn failing() -> Self {
        Self::with_default(false)
    }

    /// Succeeds for every description except the listed ones.
    pub fn failing_on(descriptions: &[&str]) -> Self {
        Self {
            fail_on: descriptions.iter().map(|d| d.to_string()).collect(),
            ..Self::succeeding()
        }
    }

    /// Returns `Err(message)` from every call.
    pub fn erroring(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    /// Sleep before answering, returning early if cancelled unless
    /// [`ScriptedBackend::ignoring_cancel`] is set.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep out the whole delay even after cancellation.
    pub fn ignoring_cancel(mut self) -> Self {
        self.honors_cancel = false;
        self
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Descriptions received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock_calls()
            .iter()
            .map(|(description, _)| description.clone())
            .collect()
    }

    /// Contexts received, in call order.
    pub fn contexts(&self) -> Vec<ExecContext> {
        self.lock_calls()
            .iter()
            .map(|(_, context)| context.clone())
            .collect()
    }

    pub fn observed_cancel(&self) -> bool {
        self.observed_cancel.load(Ordering::SeqCst)
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(String, ExecContext)>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Backend for ScriptedBackend {
    fn execute(
        &self,
        description: &str,
        context: &ExecContext,
        cancel: &CancelToken,
    ) -> Result<BackendResponse> {
        self.lock_calls()
            .push((description.to_string(), context.clone()));
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        let response = self.respond(description, cancel);
        self.active.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

impl ScriptedBackend {
    fn respond(&self, description: &str, cancel: &CancelToken) -> Result<BackendResponse> {
        if let Some(delay) = self.delay {
            let deadline = Instant::now() + delay;
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    self.observed_cancel.store(true, Ordering::SeqCst);
                    if self.honors_cancel {
                        return Ok(BackendResponse::failed("cancelled", "cancelled"));
                    }
                }
                thread::sleep(DELAY_POLL);
            }
        }

        if let Some(message) = &self.error {
            return Err(anyhow!("{message}"));
        }
        let success = self.default_success && !self.fail_on.iter().any(|d| d == description);
        if success {
            Ok(BackendResponse::ok(format!("done: {description}"))
                .with_output(json!({ "echo": description })))
        } else {
            Ok(BackendResponse::failed(
                format!("could not: {description}"),
                "scripted failure",
            ))
        }
    }
}

/// Plan generator returning a fixed response and recording prompts.
pub struct ScriptedPlanGenerator {
    response: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPlanGenerator {
    pub fn responding(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl PlanGenerator for ScriptedPlanGenerator {
    fn generate_plan(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(prompt.to_string());
        self.response.clone().map_err(|message| anyhow!(message))
    }
}

/// Create a step with empty parameters and no dependencies.
pub fn step(index: usize, description: &str, backend: BackendKind, critical: bool) -> Step {
    Step {
        index,
        description: description.to_string(),
        target_backend: backend,
        parameters: Map::new(),
        depends_on: Vec::new(),
        critical,
        reasoning: String::new(),
    }
}

/// Create a sequential heuristic plan around `steps`.
pub fn plan_of(goal: &str, steps: Vec<Step>) -> Plan {
    Plan {
        goal: goal.to_string(),
        steps,
        strategy: Strategy::Sequential,
        success_criteria: "Task completed successfully".to_string(),
        complexity: Complexity::Medium,
        source: PlanSource::Heuristic,
    }
}

/// Build a registry from `(kind, backend)` pairs.
pub fn registry_with(entries: &[(BackendKind, Arc<ScriptedBackend>)]) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for (kind, backend) in entries {
        registry
            .register(*kind, backend.clone())
            .expect("scripted backend kind is registrable");
    }
    Arc::new(registry)
}

/// A well-formed planning response with the given `(description, module, critical)` steps.
pub fn plan_response(steps: &[(&str, &str, bool)]) -> String {
    let steps: Vec<Value> = steps
        .iter()
        .enumerate()
        .map(|(i, (description, module, critical))| {
            json!({
                "step_number": i + 1,
                "description": description,
                "module": module,
                "critical": critical,
            })
        })
        .collect();
    json!({
        "task_type": "automation",
        "complexity": "medium",
        "steps": steps,
        "execution_strategy": "sequential",
        "success_criteria": "all steps done",
    })
    .to_string()
}
