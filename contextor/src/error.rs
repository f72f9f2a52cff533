//! Typed error for the contextor crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextorError>;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// The request cannot be answered as sent (blank question, bad knobs).
    #[error("[Contextor] invalid request: {0}")]
    InvalidRequest(String),

    /// Errors from the underlying rag-store crate.
    #[error("[Contextor] retrieval failed: {0}")]
    Rag(#[from] rag_store::RagError),

    /// Generation backend failed; terminal for the request.
    #[error("[Contextor] generation failed: {0}")]
    Generation(#[from] ai_llm_service::AiLlmError),

    /// An evidence sub-call ran past its budget.
    #[error("[Contextor] timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Attachment pipeline setup failed.
    #[error("[Contextor] attachments: {0}")]
    Attachment(#[from] attachments::AttachmentError),

    /// A pool job panicked or the pool was closed.
    #[error("[Contextor] worker pool: {0}")]
    Pool(#[from] services::PoolError),

    /// HTTP transport errors of auxiliary sinks.
    #[error("[Contextor] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization issues (should be rare).
    #[error("[Contextor] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[Contextor] IO error: {0}")]
    Io(#[from] std::io::Error),
}
