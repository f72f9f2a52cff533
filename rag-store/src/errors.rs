//! Unified error types for the crate.

use thiserror::Error;

/// Top-level error for rag-store operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Transport failures talking to the KB endpoint.
    #[error("[RAG Store] http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the KB endpoint.
    #[error("[RAG Store] {url} returned {status}: {snippet}")]
    Status {
        status: u16,
        url: String,
        snippet: String,
    },

    /// JSON parsing / serialization errors.
    #[error("[RAG Store] parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("[RAG Store] config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
