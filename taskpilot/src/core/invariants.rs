//! Structural invariants for plans.

use crate::core::types::Plan;

/// Validate plan invariants and return human-readable errors.
///
/// An empty result means the plan may be executed.
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();

    if plan.goal.trim().is_empty() {
        errors.push("goal must not be empty".to_string());
    }
    if plan.steps.is_empty() {
        errors.push("plan must contain at least one step".to_string());
    }

    for (position, step) in plan.steps.iter().enumerate() {
        let expected = position + 1;
        if step.index != expected {
            errors.push(format!(
                "step at position {expected} has index {} (expected {expected})",
                step.index
            ));
        }
        if step.description.trim().is_empty() {
            errors.push(format!("step {} has an empty description", step.index));
        }
        for dep in &step.depends_on {
            if *dep == 0 || *dep >= expected {
                errors.push(format!(
                    "step {} depends on step {dep}, which does not precede it",
                    step.index
                ));
            }
        }
    }

    errors
}
