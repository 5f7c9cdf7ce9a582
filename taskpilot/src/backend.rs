//! Backend contract and the registry of configured backends.
//!
//! The [`Backend`] trait is the only interface the orchestration core depends
//! on. Vision, structured and learning implementations are registered under
//! fixed categories; an unregistered category is an ordinary state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::types::BackendKind;
use crate::error::OrchestratorError;

/// Free-form context passed alongside a step description.
pub type ExecContext = Map<String, Value>;

/// What a backend reports back for one executed description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: Value::Null,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }
}

/// Cooperative cancellation flag shared between a caller and a running task.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Uniform "execute a described action and report a result" contract.
///
/// Implementations should poll `cancel` during long operations and return
/// early once it trips; the executor trips it when a step exceeds its
/// timeout. An `Err` is recorded as a failed step, never propagated.
pub trait Backend: Send + Sync {
    fn execute(
        &self,
        description: &str,
        context: &ExecContext,
        cancel: &CancelToken,
    ) -> Result<BackendResponse>;
}

/// Table of backend implementations keyed by category.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: BTreeMap<BackendKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Registry with every category absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `kind`, replacing any previous entry.
    ///
    /// `hybrid` is a pseudo-backend provided by the router and cannot be registered.
    pub fn register(
        &mut self,
        kind: BackendKind,
        backend: Arc<dyn Backend>,
    ) -> Result<(), OrchestratorError> {
        if kind == BackendKind::Hybrid {
            return Err(OrchestratorError::ReservedBackend(kind));
        }
        self.entries.insert(kind, backend);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(
        mut self,
        kind: BackendKind,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, OrchestratorError> {
        self.register(kind, backend)?;
        Ok(self)
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        self.entries.get(&kind).cloned()
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn has_any(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Availability of every registrable category, computed from current entries.
    pub fn availability(&self) -> BTreeMap<BackendKind, bool> {
        BackendKind::REGISTRABLE
            .iter()
            .map(|kind| (*kind, self.is_registered(*kind)))
            .collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("available", &self.availability())
            .finish()
    }
}
