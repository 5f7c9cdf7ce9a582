//! Prompt rendering for the planning collaborator.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::BackendKind;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

#[derive(Debug, Serialize)]
struct BackendContext {
    name: &'static str,
    strengths: &'static str,
}

/// Render the planning prompt for `goal`.
pub fn render_planner_prompt(goal: &str) -> Result<String> {
    let backends: Vec<BackendContext> = BackendKind::REGISTRABLE
        .iter()
        .chain(std::iter::once(&BackendKind::Hybrid))
        .map(|kind| BackendContext {
            name: kind.as_str(),
            strengths: kind.strengths(),
        })
        .collect();
    let backend_names = backends
        .iter()
        .map(|backend| backend.name)
        .collect::<Vec<_>>()
        .join("|");

    let mut env = Environment::new();
    env.add_template("planner", PLANNER_TEMPLATE)
        .context("load planner template")?;
    let rendered = env
        .get_template("planner")
        .context("lookup planner template")?
        .render(context! {
            goal => goal.trim(),
            backends => backends,
            backend_names => backend_names,
        })
        .context("render planner prompt")?;
    debug!(bytes = rendered.len(), "rendered planner prompt");
    Ok(rendered)
}
