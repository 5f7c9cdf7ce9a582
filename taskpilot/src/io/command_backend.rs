//! Backend that delegates to an external command.
//!
//! The command receives `{"backend", "description", "context"}` as JSON on
//! stdin and must print a JSON [`BackendResponse`] on stdout. A non-zero exit
//! or unparsable stdout becomes a failed response; a timeout is an error.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::backend::{Backend, BackendResponse, CancelToken, ExecContext};
use crate::core::plan_parse::extract_json_object;
use crate::core::types::BackendKind;
use crate::io::process::{command_from_argv, run_command_with_timeout};

#[derive(Debug, Clone)]
pub struct CommandBackend {
    kind: BackendKind,
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBackend {
    pub fn new(
        kind: BackendKind,
        argv: Vec<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            kind,
            argv,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Backend for CommandBackend {
    #[instrument(skip_all, fields(backend = %self.kind, program = ?self.argv.first()))]
    fn execute(
        &self,
        description: &str,
        context: &ExecContext,
        cancel: &CancelToken,
    ) -> Result<BackendResponse> {
        let request = json!({
            "backend": self.kind,
            "description": description,
            "context": context,
        });
        let input = serde_json::to_vec(&request).context("serialize backend request")?;

        let output = run_command_with_timeout(
            command_from_argv(&self.argv)?,
            Some(&input),
            self.timeout,
            self.output_limit_bytes,
            cancel,
        )
        .with_context(|| format!("run {} backend command", self.kind))?;

        if output.timed_out {
            return Err(anyhow!(
                "{} backend command timed out after {:?}",
                self.kind,
                self.timeout
            ));
        }
        if output.cancelled {
            return Ok(BackendResponse::failed(
                "backend command cancelled",
                "cancelled",
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "backend command failed");
            return Ok(BackendResponse::failed(
                format!("{} backend command failed", self.kind),
                format!(
                    "exit status {:?}: {}",
                    output.status.code(),
                    output.stderr_summary()
                ),
            ));
        }

        let stdout = output.stdout_lossy();
        let parsed = extract_json_object(&stdout)
            .and_then(|json| serde_json::from_str::<BackendResponse>(json).ok());
        match parsed {
            Some(response) => {
                debug!(success = response.success, "backend command responded");
                Ok(response)
            }
            None => {
                warn!(bytes = stdout.len(), "backend command printed no response object");
                Ok(BackendResponse::failed(
                    format!("{} backend returned an unreadable response", self.kind),
                    "stdout did not contain a JSON response object",
                ))
            }
        }
    }
}
