//! Stable exit codes for taskpilot CLI commands.

/// Command succeeded; for `run`, every step succeeded.
pub const OK: i32 = 0;
/// Invalid config, empty goal, or any other error before a run.
pub const INVALID: i32 = 1;
/// `taskpilot run` finished with failed non-critical steps.
pub const FAILED: i32 = 2;
/// `taskpilot run` stopped early (critical failure, no backend, cancelled, or rejected).
pub const ABORTED: i32 = 3;
