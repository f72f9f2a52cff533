//! Runtime configuration loaded from environment variables.

use std::{path::PathBuf, str::FromStr, time::Duration};

use rag_store::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K};

/// Config bag for the answer pipeline. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct ContextorConfig {
    // Retrieval defaults applied when the request leaves them unset
    pub default_top_k: usize,
    pub default_min_score: f64,

    /// Slots of the shared worker pool.
    pub worker_pool_size: usize,
    /// Budget for each evidence sub-call (scope guard, entity resolve, compression).
    pub evidence_timeout: Duration,
    /// Root for local code search; `None` disables it.
    pub code_search_root: Option<PathBuf>,
    /// Analytics endpoint; `None` logs summaries instead.
    pub analytics_url: Option<String>,
    /// Persist an empty turn when the client leaves before any delta.
    pub persist_empty_on_cancel: bool,
    /// Answer with the top QA candidate when it is a strong match.
    pub qa_fast_path: bool,
    /// Lifetime of temporary sessions in memory.
    pub history_ttl: Duration,
}

impl Default for ContextorConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            default_min_score: DEFAULT_MIN_SCORE,
            worker_pool_size: 8,
            evidence_timeout: Duration::from_secs(20),
            code_search_root: None,
            analytics_url: None,
            persist_empty_on_cancel: false,
            qa_fast_path: false,
            history_ttl: Duration::from_secs(3600),
        }
    }
}

impl ContextorConfig {
    /// Build from environment variables with sensible defaults.
    ///
    /// # Example
    /// ```
    /// use contextor::ContextorConfig;
    /// let cfg = ContextorConfig::from_env();
    /// assert!(cfg.worker_pool_size >= 1);
    /// ```
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_top_k: parse("RAG_DEFAULT_TOP_K", d.default_top_k).max(1),
            default_min_score: parse("RAG_DEFAULT_MIN_SCORE", d.default_min_score).clamp(0.0, 1.0),
            worker_pool_size: parse("WORKER_POOL_SIZE", d.worker_pool_size).max(1),
            evidence_timeout: Duration::from_secs(
                parse("EVIDENCE_TIMEOUT_SECS", d.evidence_timeout.as_secs()).max(1),
            ),
            code_search_root: env_opt("CODE_SEARCH_ROOT").map(PathBuf::from),
            analytics_url: env_opt("ANALYTICS_URL"),
            persist_empty_on_cancel: parse("PERSIST_EMPTY_ON_CANCEL", d.persist_empty_on_cancel),
            qa_fast_path: parse("QA_FAST_PATH", d.qa_fast_path),
            history_ttl: Duration::from_secs(parse("HISTORY_TTL_SECS", d.history_ttl.as_secs())),
        }
    }
}

fn env_opt(k: &str) -> Option<String> {
    std::env::var(k)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}
