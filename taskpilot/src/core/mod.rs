//! Deterministic, pure logic shared by the orchestration layer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod decompose;
pub mod invariants;
pub mod plan_parse;
pub mod stats;
pub mod types;
