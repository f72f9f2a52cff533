//! Knowledge-base retrieval facade.
//!
//! This crate provides a small API to:
//! - Search a KB service over HTTP ([`HttpKbBackend`]) or any [`KbBackend`]
//! - Merge multi-query results, refine weak results and rerank by term overlap
//!   ([`RetrievalCoordinator`])

mod backend;
mod config;
mod coordinator;
mod errors;
mod record;

pub use backend::{BoxFuture, HttpKbBackend, KbBackend, render_context};
pub use config::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, RagConfig};
pub use coordinator::{RetrievalCoordinator, RetrievalPolicy, merge_by_id, rerank};
pub use errors::{RagError, Result};
pub use record::{KbDocument, RetrievalResult, ScoredDocument};
