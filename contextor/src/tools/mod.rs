//! Deep-thinking helpers used by the answer pipeline.
//!
//! - LLM-backed: [`scope_guard`], [`entity_resolve`], [`compress`] (via [`EvidenceModel`])
//! - Local heuristics: [`decompose`], [`evidence_gap`], [`outline`], [`assumption`],
//!   [`action_plan`], [`conflict`], [`track_correct`], [`verify`]
//! - Filesystem: [`code_search`]
//!
//! None of them fails the request: errors degrade to a tagged default.

pub mod action_plan;
pub mod assumption;
pub mod code_search;
pub mod compress;
pub mod conflict;
pub mod decompose;
pub mod entity_resolve;
pub mod evidence_gap;
pub mod outline;
pub mod scope_guard;
pub mod track_correct;
pub mod verify;

use std::{sync::Arc, time::Duration};

use ai_llm_service::GenerationBackend;
use services::{WorkerPool, text::error_summary};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{ContextorError, Result};

/// Cap on error text embedded in tool results.
pub(crate) const TOOL_ERROR_CHARS: usize = 300;

/// Evidence sub-call runner: one backend, the shared pool and a per-call budget.
#[derive(Clone)]
pub struct EvidenceModel {
    backend: Arc<dyn GenerationBackend>,
    pool: WorkerPool,
    budget: Duration,
}

impl EvidenceModel {
    pub fn new(backend: Arc<dyn GenerationBackend>, pool: WorkerPool, budget: Duration) -> Self {
        Self {
            backend,
            pool,
            budget,
        }
    }

    /// Single-shot call on the worker pool, bounded by the evidence budget.
    pub async fn ask(&self, system: &'static str, user: String) -> Result<String> {
        let backend = self.backend.clone();
        let job = async move { backend.call(system, &user).await };

        let started = std::time::Instant::now();
        let out = match timeout(self.budget, self.pool.run(job)).await {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(e))) => Err(ContextorError::from(e)),
            Ok(Err(e)) => Err(ContextorError::from(e)),
            Err(_) => Err(ContextorError::Timeout(self.budget)),
        };
        match &out {
            Ok(_) => debug!(
                model = %self.backend.model(),
                latency_ms = started.elapsed().as_millis() as u64,
                "evidence call done"
            ),
            Err(e) => warn!(model = %self.backend.model(), error = %e, "evidence call failed"),
        }
        out
    }
}

/// One-line, bounded error text for tool results.
pub(crate) fn tool_error(e: &ContextorError) -> String {
    error_summary(&e.to_string(), TOOL_ERROR_CHARS)
}
