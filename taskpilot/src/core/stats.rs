//! Per-backend routing counters derived from execution results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::types::{BackendKind, ExecutionResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackendStats {
    /// Steps dispatched to the backend.
    pub routed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Count routed, succeeded and failed steps per backend.
///
/// Steps that could not be routed have no backend and are skipped.
pub fn backend_stats<'a, I>(results: I) -> BTreeMap<BackendKind, BackendStats>
where
    I: IntoIterator<Item = &'a ExecutionResult>,
{
    let mut stats: BTreeMap<BackendKind, BackendStats> = BTreeMap::new();
    for step in results.into_iter().flat_map(|result| &result.step_results) {
        let Some(kind) = step.backend_used else {
            continue;
        };
        let entry = stats.entry(kind).or_default();
        entry.routed += 1;
        if step.success {
            entry.succeeded += 1;
        } else {
            entry.failed += 1;
        }
    }
    stats
}
