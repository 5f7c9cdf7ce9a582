//! Tolerant parsing of planning-collaborator responses.
//!
//! Responses are untrusted text. Parsing strips code fences, extracts the
//! outermost JSON object, validates it against the embedded response schema,
//! and checks plan invariants. Any failure is reported as
//! [`OrchestratorError::PlanParseFailed`] so the caller can fall back.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::classifier::classify;
use crate::core::invariants::validate_plan;
use crate::core::types::{BackendKind, Complexity, Plan, PlanSource, Step, Strategy};
use crate::error::OrchestratorError;

const PLAN_RESPONSE_SCHEMA: &str = include_str!("../../schemas/plan_response.schema.json");
const DEFAULT_SUCCESS_CRITERIA: &str = "Task completed successfully";

static PLAN_RESPONSE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PLAN_RESPONSE_SCHEMA).expect("embedded plan schema is valid json");
    jsonschema::validator_for(&schema).expect("embedded plan schema compiles")
});

#[derive(Debug, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    complexity: Option<Complexity>,
    steps: Vec<PlanResponseStep>,
    #[serde(default)]
    execution_strategy: Option<Strategy>,
    #[serde(default)]
    success_criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanResponseStep {
    description: String,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default)]
    dependencies: Vec<usize>,
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. `json`) on the opening fence line.
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Slice from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Convert a collaborator response into a [`Plan`] for `goal`.
pub fn parse_plan_response(goal: &str, text: &str) -> Result<Plan, OrchestratorError> {
    let body = strip_code_fences(text);
    let json = extract_json_object(body)
        .ok_or_else(|| parse_failed("response did not contain a JSON object"))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|err| parse_failed(format!("invalid JSON: {err}")))?;

    let violations: Vec<String> = PLAN_RESPONSE_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(parse_failed(format!(
            "schema validation failed: {}",
            violations.join("; ")
        )));
    }

    let response: PlanResponse = serde_json::from_value(value)
        .map_err(|err| parse_failed(format!("unexpected plan shape: {err}")))?;

    let steps: Vec<Step> = response
        .steps
        .into_iter()
        .enumerate()
        .map(|(position, raw)| {
            let target_backend = raw
                .module
                .as_deref()
                .and_then(BackendKind::parse)
                .unwrap_or_else(|| classify(&raw.description).recommended_backend);
            Step {
                index: position + 1,
                description: raw.description.trim().to_string(),
                target_backend,
                parameters: raw.parameters,
                depends_on: raw.dependencies,
                critical: raw.critical,
                reasoning: raw.reasoning.unwrap_or_default(),
            }
        })
        .collect();

    let plan = Plan {
        goal: goal.to_string(),
        steps,
        strategy: response.execution_strategy.unwrap_or(Strategy::Sequential),
        success_criteria: response
            .success_criteria
            .filter(|criteria| !criteria.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUCCESS_CRITERIA.to_string()),
        complexity: response.complexity.unwrap_or(Complexity::Medium),
        source: PlanSource::Ai,
    };

    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        return Err(parse_failed(errors.join("; ")));
    }
    Ok(plan)
}

fn parse_failed(message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::PlanParseFailed(message.into())
}
