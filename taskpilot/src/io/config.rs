//! Orchestrator configuration stored in `taskpilot.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::BackendKind;

pub const DEFAULT_CONFIG_FILE: &str = "taskpilot.toml";

/// Orchestrator configuration (TOML).
///
/// Every field is optional in the file. Collaborators that are not configured
/// stay unregistered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskpilotConfig {
    /// Number of runs kept in the in-memory history.
    pub history_capacity: usize,

    /// Upper bound for a single step's backend call, in seconds.
    pub step_timeout_secs: u64,

    /// How long a timed-out backend call may keep running before the run
    /// aborts instead of starting another call, in seconds.
    pub cancel_grace_secs: u64,

    /// Truncate collaborator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Planning collaborator; heuristic planning only when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planner: Option<CommandConfig>,

    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    /// Program and arguments, e.g. `["python3", "vision_agent.py"]`.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<CommandConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning: Option<CommandConfig>,
}

impl BackendsConfig {
    /// Configured backends in registration order.
    pub fn configured(&self) -> Vec<(BackendKind, &CommandConfig)> {
        [
            (BackendKind::Vision, &self.vision),
            (BackendKind::Structured, &self.structured),
            (BackendKind::Learning, &self.learning),
        ]
        .into_iter()
        .filter_map(|(kind, cfg)| cfg.as_ref().map(|cfg| (kind, cfg)))
        .collect()
    }
}

impl Default for TaskpilotConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            step_timeout_secs: 300,
            cancel_grace_secs: 5,
            output_limit_bytes: 100_000,
            planner: None,
            backends: BackendsConfig::default(),
        }
    }
}

impl TaskpilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(anyhow!("history_capacity must be > 0"));
        }
        if self.step_timeout_secs == 0 {
            return Err(anyhow!("step_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if let Some(planner) = &self.planner {
            planner.validate("planner")?;
        }
        for (kind, cfg) in self.backends.configured() {
            cfg.validate(&format!("backends.{kind}"))?;
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_secs)
    }
}

impl CommandConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{section}.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TaskpilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<TaskpilotConfig> {
    if !path.exists() {
        let cfg = TaskpilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TaskpilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TaskpilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
