//! Task-orchestration core: natural-language goals to executed plans.
//!
//! A goal is planned into ordered steps, each step is routed to a pluggable
//! backend by what it requires, and the plan runs under a fixed failure
//! policy with a bounded history of outcomes.
//!
//! - **[`core`]**: Pure, deterministic logic (classification, decomposition,
//!   plan parsing and invariants, stats). No I/O.
//! - **[`io`]**: Side-effecting pieces (config, child processes, prompt
//!   rendering, history files) and the process-backed collaborators.
//!
//! [`planner`], [`router`], [`executor`] and [`history`] build on those, and
//! [`orchestrator::Orchestrator`] composes them behind one API.

pub mod backend;
pub mod core;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod history;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod router;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
