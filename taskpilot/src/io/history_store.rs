//! History document written by `save_history`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::core::stats::BackendStats;
use crate::core::types::{BackendKind, Plan};
use crate::history::HistoryEntry;
use crate::orchestrator::Status;

#[derive(Debug, Serialize)]
pub struct HistoryDocument<'a> {
    pub saved_at: String,
    pub status: &'a Status,
    pub current_plan: Option<&'a Plan>,
    /// Per-backend counters over `history`.
    pub backend_stats: BTreeMap<BackendKind, BackendStats>,
    pub history: &'a [HistoryEntry],
}

/// `taskpilot_log_<YYYYmmdd_HHMMSS>.json`, relative to the working directory.
pub fn default_history_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("taskpilot_log_{}.json", now.format("%Y%m%d_%H%M%S")))
}

/// Pretty-print the document to `path` atomically.
pub fn write_history(
    path: &Path,
    now: DateTime<Utc>,
    status: &Status,
    current_plan: Option<&Plan>,
    backend_stats: BTreeMap<BackendKind, BackendStats>,
    history: &[HistoryEntry],
) -> Result<()> {
    let doc = HistoryDocument {
        saved_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        status,
        current_plan,
        backend_stats,
        history,
    };
    let mut buf = serde_json::to_string_pretty(&doc).context("serialize history document")?;
    buf.push('\n');
    super::write_atomic(path, &buf)?;
    info!(path = %path.display(), entries = history.len(), "history saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_path_uses_timestamp() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .single()
            .expect("valid time");
        assert_eq!(
            default_history_path(now),
            PathBuf::from("taskpilot_log_20260304_050607.json")
        );
    }
}
