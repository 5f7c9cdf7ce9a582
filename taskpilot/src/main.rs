//! Goal-to-plan orchestration CLI.
//!
//! Plans a natural-language goal, routes each step to a configured backend
//! command, and reports the run. Backends and the optional planner are read
//! from `taskpilot.toml`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use taskpilot::core::classifier::classify;
use taskpilot::core::types::{ExecutionResult, RunState};
use taskpilot::exit_codes;
use taskpilot::io::config::{DEFAULT_CONFIG_FILE, TaskpilotConfig, load_config, write_config};
use taskpilot::logging;
use taskpilot::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "taskpilot",
    version,
    about = "Plan natural-language goals and route each step to an execution backend"
)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the classification of a description as JSON.
    Classify { text: String },
    /// Print the plan for a goal as JSON without executing it.
    Plan { goal: String },
    /// Plan and execute a goal, printing a summary.
    Run {
        goal: String,
        /// Write the history document here after the run.
        #[arg(long)]
        save_history: Option<PathBuf>,
    },
    /// Print the configured orchestrator status as JSON.
    ///
    /// Each invocation starts a fresh orchestrator, so history is always empty
    /// here; use `run --save-history` for per-run results.
    Status,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Classify { text } => {
            print_json(&classify(&text))?;
            Ok(exit_codes::OK)
        }
        Command::Plan { goal } => cmd_plan(&cli.config, &goal),
        Command::Run { goal, save_history } => {
            cmd_run(&cli.config, &goal, save_history.as_deref())
        }
        Command::Status => cmd_status(&cli.config),
    }
}

fn orchestrator(config_path: &Path) -> Result<Orchestrator> {
    let cfg = load_config(config_path)?;
    Orchestrator::from_config(&cfg).context("build orchestrator")
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        eprintln!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
        return Ok(exit_codes::INVALID);
    }
    write_config(config_path, &TaskpilotConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    eprintln!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(config_path: &Path, goal: &str) -> Result<i32> {
    let orch = orchestrator(config_path)?;
    let plan = orch.plan(goal)?;
    print_json(&plan)?;
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, goal: &str, save_history: Option<&Path>) -> Result<i32> {
    let orch = orchestrator(config_path)?;
    let mut progress = |index: usize, total: usize, description: &str| {
        eprintln!("[{index}/{total}] {description}");
    };
    let result = orch.execute_goal(goal, Some(&mut progress));
    print_summary(&result)?;

    if let Some(path) = save_history {
        let written = orch.save_history(Some(path))?;
        eprintln!("history saved to {}", written.display());
    }
    Ok(exit_code_for(&result))
}

fn cmd_status(config_path: &Path) -> Result<i32> {
    let orch = orchestrator(config_path)?;
    print_json(&orch.status())?;
    Ok(exit_codes::OK)
}

fn exit_code_for(result: &ExecutionResult) -> i32 {
    match result.state {
        RunState::Completed => exit_codes::OK,
        RunState::PartialFailure => exit_codes::FAILED,
        RunState::Aborted => exit_codes::ABORTED,
        RunState::NotStarted | RunState::Running => exit_codes::INVALID,
    }
}

fn print_summary(result: &ExecutionResult) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "goal: {}", result.goal)?;
    writeln!(
        out,
        "completed {}/{} steps ({} failed) in {:.2}s",
        result.completed_steps, result.total_steps, result.failed_steps, result.duration_seconds
    )?;
    for step in &result.step_results {
        let backend = step
            .backend_used
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "unrouted".to_string());
        let mark = if step.success { "ok" } else { "FAILED" };
        writeln!(
            out,
            "  {}. [{mark}] ({backend}) {}: {}",
            step.step.index, step.step.description, step.message
        )?;
    }
    let mut failures = result.failures().peekable();
    if failures.peek().is_some() {
        writeln!(out, "failures:")?;
        for step in failures {
            let error = step.error.as_deref().unwrap_or(&step.message);
            writeln!(out, "  {}. {error}", step.step.index)?;
        }
    }
    if let Some(reason) = &result.abort_reason {
        writeln!(out, "aborted: {reason}")?;
    }
    Ok(())
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_history_path() {
        let cli = Cli::parse_from(["taskpilot", "run", "open notepad", "--save-history", "h.json"]);
        match cli.command {
            Command::Run { goal, save_history } => {
                assert_eq!(goal, "open notepad");
                assert_eq!(save_history, Some(PathBuf::from("h.json")));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["taskpilot", "status", "--config", "other.toml"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["taskpilot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn exit_codes_follow_run_state() {
        let mut result = ExecutionResult::rejected("goal", 1, "nope");
        assert_eq!(exit_code_for(&result), exit_codes::ABORTED);
        result.state = RunState::PartialFailure;
        assert_eq!(exit_code_for(&result), exit_codes::FAILED);
        result.state = RunState::Completed;
        assert_eq!(exit_code_for(&result), exit_codes::OK);
    }
}
