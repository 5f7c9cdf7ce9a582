//! Step routing and the hybrid pseudo-backend.
//!
//! Resolution order for a target category:
//! 1. the target backend, if registered;
//! 2. the vision backend, if registered;
//! 3. [`OrchestratorError::BackendUnavailable`].
//!
//! Vision is the only fallback target. `hybrid` resolves to [`HybridBackend`]
//! whenever at least one real backend is registered.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendRegistry, BackendResponse, CancelToken, ExecContext};
use crate::core::classifier::classify;
use crate::core::decompose::decompose;
use crate::core::types::{BackendKind, Step};
use crate::error::OrchestratorError;

/// A resolved backend ready to execute a step.
#[derive(Clone)]
pub struct BackendHandle {
    /// Category that will actually run the step.
    pub kind: BackendKind,
    backend: Arc<dyn Backend>,
}

impl BackendHandle {
    pub fn execute(
        &self,
        description: &str,
        context: &ExecContext,
        cancel: &CancelToken,
    ) -> Result<BackendResponse> {
        self.backend.execute(description, context, cancel)
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Resolves steps to backends using a shared registry.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<BackendRegistry>,
}

impl Router {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Resolve the backend for `step`.
    pub fn route(&self, step: &Step) -> Result<BackendHandle, OrchestratorError> {
        let handle = self.resolve(step.target_backend)?;
        debug!(
            step = step.index,
            wanted = %step.target_backend,
            resolved = %handle.kind,
            "routed step"
        );
        Ok(handle)
    }

    /// Resolve a category using the documented fallback order.
    pub fn resolve(&self, wanted: BackendKind) -> Result<BackendHandle, OrchestratorError> {
        if wanted == BackendKind::Hybrid {
            if !self.registry.has_any() {
                return Err(OrchestratorError::BackendUnavailable { wanted });
            }
            return Ok(BackendHandle {
                kind: BackendKind::Hybrid,
                backend: Arc::new(HybridBackend::new(self.clone())),
            });
        }

        if let Some(backend) = self.registry.get(wanted) {
            return Ok(BackendHandle {
                kind: wanted,
                backend,
            });
        }
        if let Some(backend) = self.registry.get(BackendKind::Vision) {
            info!(wanted = %wanted, "preferred backend not registered, falling back to vision");
            return Ok(BackendHandle {
                kind: BackendKind::Vision,
                backend,
            });
        }
        Err(OrchestratorError::BackendUnavailable { wanted })
    }
}

/// Pseudo-backend that decomposes a compound description and dispatches
/// each clause to the backend its own classification selects.
///
/// A failed critical clause stops the remaining clauses. Clauses are routed
/// by their direct (single-category) classification, so decomposition never
/// recurses.
pub struct HybridBackend {
    router: Router,
}

impl HybridBackend {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

impl Backend for HybridBackend {
    fn execute(
        &self,
        description: &str,
        context: &ExecContext,
        cancel: &CancelToken,
    ) -> Result<BackendResponse> {
        let subtasks = decompose(description);
        let total = subtasks.len();
        let mut results: Vec<Value> = Vec::with_capacity(total);
        let mut overall_success = true;

        for subtask in &subtasks {
            if cancel.is_cancelled() {
                overall_success = false;
                break;
            }

            let wanted = classify(&subtask.description).direct_backend;
            let mut sub_context = context.clone();
            sub_context.insert("subtask_number".to_string(), json!(subtask.order + 1));
            sub_context.insert("subtask_total".to_string(), json!(total));

            let (backend_used, response) = match self.router.resolve(wanted) {
                Ok(handle) => {
                    let response = handle
                        .execute(&subtask.description, &sub_context, cancel)
                        .unwrap_or_else(|err| {
                            BackendResponse::failed("subtask errored", format!("{err:#}"))
                        });
                    (Some(handle.kind), response)
                }
                Err(err) => (
                    None,
                    BackendResponse::failed("no backend for subtask", err.to_string()),
                ),
            };

            let success = response.success;
            results.push(json!({
                "subtask": subtask,
                "backend_used": backend_used,
                "result": response,
            }));

            if !success {
                overall_success = false;
                warn!(subtask = subtask.order + 1, total, "hybrid subtask failed");
                if subtask.critical {
                    break;
                }
            }
        }

        let attempted = results.len();
        let output = json!({
            "subtasks": subtasks,
            "results": results,
            "completed": attempted,
            "total": total,
        });
        if overall_success {
            Ok(
                BackendResponse::ok(format!("{attempted}/{total} subtasks completed"))
                    .with_output(output),
            )
        } else {
            Ok(BackendResponse::failed(
                format!("hybrid execution stopped after {attempted}/{total} subtasks"),
                "one or more subtasks failed",
            )
            .with_output(output))
        }
    }
}
