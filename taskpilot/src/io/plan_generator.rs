//! Planning collaborator backed by an external command.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::backend::CancelToken;
use crate::io::process::{command_from_argv, run_command_with_timeout};
use crate::planner::PlanGenerator;

/// Runs a configured command with the planning prompt on stdin and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandPlanGenerator {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandPlanGenerator {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            timeout,
            output_limit_bytes,
        }
    }
}

impl PlanGenerator for CommandPlanGenerator {
    #[instrument(skip_all, fields(program = ?self.argv.first(), timeout_secs = self.timeout.as_secs()))]
    fn generate_plan(&self, prompt: &str) -> Result<String> {
        info!("requesting plan from planner command");
        let output = run_command_with_timeout(
            command_from_argv(&self.argv)?,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
            &CancelToken::new(),
        )
        .context("run planner command")?;

        if output.timed_out {
            warn!("planner command timed out");
            return Err(anyhow!("planner command timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "planner command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_summary()
            ));
        }
        Ok(output.stdout_lossy())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_generator(script: &str) -> CommandPlanGenerator {
        CommandPlanGenerator::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(10),
            10_000,
        )
    }

    #[test]
    fn returns_stdout_for_prompt() {
        let text = sh_generator("tr a-z A-Z")
            .generate_plan("plan this")
            .expect("generate");
        assert_eq!(text, "PLAN THIS");
    }

    #[test]
    fn non_zero_exit_is_an_error() {
        let err = sh_generator("cat > /dev/null; echo nope >&2; exit 1")
            .generate_plan("plan this")
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
