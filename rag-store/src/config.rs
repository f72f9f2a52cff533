//! Runtime configuration for KB retrieval.

use std::{env, str::FromStr, time::Duration};

use crate::errors::RagError;

/// Default number of documents requested per search.
pub const DEFAULT_TOP_K: usize = 3;
/// Default similarity floor passed to the KB.
pub const DEFAULT_MIN_SCORE: f64 = 0.60;

/// Configuration for the HTTP KB backend and retrieval defaults.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// KB service base URL, e.g. `http://localhost:8081`.
    pub kb_url: String,
    /// Request timeout for one search call.
    pub timeout_secs: u64,
    /// `topK` used when a request does not set one.
    pub default_top_k: usize,
    /// `minScore` used when a request does not set one.
    pub default_min_score: f64,
}

impl RagConfig {
    /// Creates a config with default limits for the given endpoint.
    pub fn new_default(url: impl Into<String>) -> Self {
        Self {
            kb_url: url.into(),
            timeout_secs: 10,
            default_top_k: DEFAULT_TOP_K,
            default_min_score: DEFAULT_MIN_SCORE,
        }
    }

    /// Reads `KB_URL` (required), `KB_TIMEOUT_SECS`, `RAG_DEFAULT_TOP_K`, `RAG_DEFAULT_MIN_SCORE`.
    ///
    /// # Errors
    /// `RagError::Config` when `KB_URL` is missing or a number does not parse.
    pub fn from_env() -> Result<Self, RagError> {
        let kb_url = env::var("KB_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RagError::Config("KB_URL is not set".into()))?;

        let cfg = Self {
            kb_url,
            timeout_secs: parse("KB_TIMEOUT_SECS", 10)?,
            default_top_k: parse("RAG_DEFAULT_TOP_K", DEFAULT_TOP_K)?,
            default_min_score: parse("RAG_DEFAULT_MIN_SCORE", DEFAULT_MIN_SCORE)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        let url = self.kb_url.trim();
        if url.is_empty() {
            return Err(RagError::Config("kb_url is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RagError::Config(format!("kb_url must be http(s): {url}")));
        }
        if self.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.default_min_score) {
            return Err(RagError::Config("default_min_score must be within 0..=1".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, default: T) -> Result<T, RagError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("{key}: {e}"))),
        _ => Ok(default),
    }
}
