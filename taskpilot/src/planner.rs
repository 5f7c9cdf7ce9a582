//! Goal planning with an optional AI collaborator and a heuristic fallback.
//!
//! The heuristic fallback is the canonical behavior: it is a pure function of
//! the goal and is used whenever the collaborator is absent, fails, or answers
//! with something unusable.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Map;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::classify;
use crate::core::decompose::decompose;
use crate::core::plan_parse::parse_plan_response;
use crate::core::types::{Plan, PlanSource, Step, Strategy};
use crate::error::OrchestratorError;
use crate::io::prompt::render_planner_prompt;

const FALLBACK_SUCCESS_CRITERIA: &str = "Task completed successfully";

/// Generative planning collaborator.
pub trait PlanGenerator: Send + Sync {
    /// Answer `prompt` with free-form text expected to contain a plan JSON object.
    fn generate_plan(&self, prompt: &str) -> Result<String>;
}

/// Turns goals into plans.
#[derive(Clone, Default)]
pub struct Planner {
    generator: Option<Arc<dyn PlanGenerator>>,
}

impl Planner {
    /// Planner that only uses the heuristic fallback.
    pub fn heuristic() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn PlanGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Plan `goal`. Fails only for an empty goal.
    #[instrument(skip_all, fields(goal_len = goal.len()))]
    pub fn plan(&self, goal: &str) -> Result<Plan, OrchestratorError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(OrchestratorError::EmptyGoal);
        }

        if let Some(generator) = &self.generator {
            match ai_plan(generator.as_ref(), goal) {
                Ok(plan) => {
                    info!(steps = plan.steps.len(), strategy = ?plan.strategy, "ai plan accepted");
                    return Ok(plan);
                }
                Err(err) => warn!(err = %err, "ai planning failed, using heuristic plan"),
            }
        }

        let plan = fallback_plan(goal);
        info!(steps = plan.steps.len(), strategy = ?plan.strategy, "heuristic plan created");
        Ok(plan)
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("has_generator", &self.has_generator())
            .finish()
    }
}

fn ai_plan(generator: &dyn PlanGenerator, goal: &str) -> Result<Plan, OrchestratorError> {
    let prompt = render_planner_prompt(goal)
        .map_err(|err| OrchestratorError::PlanParseFailed(format!("{err:#}")))?;
    let response = generator
        .generate_plan(&prompt)
        .map_err(|err| OrchestratorError::PlanParseFailed(format!("generator failed: {err:#}")))?;
    debug!(bytes = response.len(), "plan generator responded");
    parse_plan_response(goal, &response)
}

/// Deterministic heuristic plan for `goal`.
///
/// Compound goals are decomposed into one step per clause, each classified
/// on its own; anything else becomes a single critical step.
pub fn fallback_plan(goal: &str) -> Plan {
    let analysis = classify(goal);

    if analysis.requires_multi_step_planning {
        let subtasks = decompose(goal);
        let steps: Vec<Step> = subtasks
            .iter()
            .enumerate()
            .map(|(position, subtask)| {
                let clause = classify(&subtask.description);
                Step {
                    index: position + 1,
                    description: subtask.description.clone(),
                    target_backend: clause.direct_backend,
                    parameters: Map::new(),
                    depends_on: if subtask.critical && position > 0 {
                        vec![position]
                    } else {
                        Vec::new()
                    },
                    critical: subtask.critical,
                    reasoning: clause.reasoning,
                }
            })
            .collect();
        let strategy = if steps.len() > 1 {
            Strategy::Hybrid
        } else {
            Strategy::Sequential
        };
        return Plan {
            goal: goal.to_string(),
            steps,
            strategy,
            success_criteria: FALLBACK_SUCCESS_CRITERIA.to_string(),
            complexity: analysis.complexity,
            source: PlanSource::Heuristic,
        };
    }

    Plan {
        goal: goal.to_string(),
        steps: vec![Step {
            index: 1,
            description: goal.to_string(),
            target_backend: analysis.recommended_backend,
            parameters: Map::new(),
            depends_on: Vec::new(),
            critical: true,
            reasoning: analysis.reasoning,
        }],
        strategy: Strategy::Sequential,
        success_criteria: FALLBACK_SUCCESS_CRITERIA.to_string(),
        complexity: analysis.complexity,
        source: PlanSource::Heuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invariants::validate_plan;
    use crate::core::types::BackendKind;
    use crate::test_support::{ScriptedPlanGenerator, plan_response};

    #[test]
    fn empty_goal_is_rejected() {
        let err = Planner::heuristic().plan("   ").unwrap_err();
        assert_eq!(err, OrchestratorError::EmptyGoal);
    }

    #[test]
    fn single_step_plan_uses_classifier_backend() {
        let plan = Planner::heuristic().plan("open notepad").expect("plan");
        assert_eq!(plan.source, PlanSource::Heuristic);
        assert_eq!(plan.strategy, Strategy::Sequential);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].target_backend, BackendKind::Structured);
        assert!(plan.steps[0].critical);
    }

    #[test]
    fn then_goal_splits_into_ordered_critical_steps() {
        let plan = Planner::heuristic()
            .plan("open chrome then search cats")
            .expect("plan");
        let descriptions: Vec<&str> = plan.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["open chrome", "search cats"]);
        assert!(plan.steps.iter().all(|s| s.critical));
        assert_eq!(plan.steps[0].target_backend, BackendKind::Structured);
        assert_eq!(plan.steps[1].target_backend, BackendKind::Vision);
        assert_eq!(plan.steps[1].depends_on, vec![1]);
        assert_eq!(plan.strategy, Strategy::Hybrid);
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn and_goal_splits_into_non_critical_steps() {
        let plan = Planner::heuristic()
            .plan("open chrome and play music")
            .expect("plan");
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps.iter().all(|s| !s.critical));
        assert!(plan.steps.iter().all(|s| s.depends_on.is_empty()));
    }

    #[test]
    fn multi_step_keyword_without_connective_yields_one_direct_step() {
        let plan = Planner::heuristic()
            .plan("automate my backup workflow")
            .expect("plan");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].target_backend, BackendKind::Vision);
        assert!(plan.steps[0].critical);
    }

    #[test]
    fn fallback_is_deterministic() {
        let planner = Planner::heuristic();
        let goal = "click the blue button then take a screenshot";
        assert_eq!(planner.plan(goal).expect("a"), planner.plan(goal).expect("b"));
    }

    #[test]
    fn ai_plan_is_used_when_valid() {
        let generator = Arc::new(ScriptedPlanGenerator::responding(&format!(
            "```json\n{}\n```",
            plan_response(&[("launch notes", "comprehensive", true), ("type hello", "vision", false)])
        )));
        let planner = Planner::with_generator(generator.clone());

        let plan = planner.plan("write hello in notes").expect("plan");

        assert_eq!(plan.source, PlanSource::Ai);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].target_backend, BackendKind::Structured);
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("write hello in notes"));
    }

    #[test]
    fn malformed_ai_response_falls_back() {
        let generator = Arc::new(ScriptedPlanGenerator::responding("sorry, no plan today"));
        let plan = Planner::with_generator(generator)
            .plan("open notepad")
            .expect("plan");
        assert_eq!(plan, fallback_plan("open notepad"));
    }

    #[test]
    fn generator_error_falls_back() {
        let generator = Arc::new(ScriptedPlanGenerator::failing("quota exceeded"));
        let plan = Planner::with_generator(generator)
            .plan("open chrome and play music")
            .expect("plan");
        assert_eq!(plan.source, PlanSource::Heuristic);
        assert_eq!(plan.steps.len(), 2);
    }
}
