use std::time::Duration;

use ai_llm_service::AiLlmError;
use services::PoolError;
use thiserror::Error;

/// Failure of one attachment. Never aborts a batch; it is rendered into the item's `error`.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("blocked host: {0}")]
    BlockedHost(String),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    #[error("file too large (>{limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("unsupported media type: {0}")]
    Unsupported(String),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("vision understanding failed: {0}")]
    Vision(#[from] AiLlmError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("worker pool: {0}")]
    Pool(#[from] PoolError),
}

impl AttachmentError {
    /// Stable short label used in `extract_failed: <Kind>: <msg>` tags.
    pub fn kind(&self) -> &'static str {
        match self {
            AttachmentError::InvalidUrl(_) => "InvalidUrl",
            AttachmentError::BlockedHost(_) => "BlockedHost",
            AttachmentError::Download(_) => "Download",
            AttachmentError::Status { .. } => "HttpStatus",
            AttachmentError::TooLarge { .. } => "TooLarge",
            AttachmentError::Unsupported(_) => "Unsupported",
            AttachmentError::Parse(_) => "Parse",
            AttachmentError::Vision(_) => "Vision",
            AttachmentError::Timeout(_) => "Timeout",
            AttachmentError::Pool(_) => "Pool",
        }
    }
}

pub type Result<T> = std::result::Result<T, AttachmentError>;
