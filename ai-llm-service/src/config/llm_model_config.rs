use crate::config::llm_provider::LlmProvider;

/// Configuration of one generation backend.
///
/// # Fields
///
/// - `provider`: wire protocol (Ollama or OpenAI-compatible).
/// - `model`: model identifier sent upstream (e.g. `"qwen3:14b"`, `"deepseek-chat"`).
/// - `endpoint`: base URL without the API path (e.g. `http://localhost:11434`).
/// - `api_key`: bearer token for providers that require authentication.
/// - `max_tokens`: generation cap, if supported.
/// - `temperature`: sampling temperature.
/// - `top_p`: nucleus sampling cutoff.
/// - `timeout_secs`: whole-request timeout, streaming included.
///
/// # Examples
///
/// ```
/// use ai_llm_service::{LlmModelConfig, LlmProvider};
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::OpenAI,
///     model: "deepseek-chat".to_string(),
///     endpoint: "https://api.deepseek.com".to_string(),
///     api_key: Some("sk-...".to_string()),
///     max_tokens: Some(2048),
///     temperature: Some(0.7),
///     top_p: None,
///     timeout_secs: Some(120),
/// };
/// assert_eq!(cfg.timeout().as_secs(), 120);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The wire protocol of the backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Base URL of the backend.
    pub endpoint: String,

    /// Optional API key for authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Default request timeout when `timeout_secs` is not set.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }

    /// Base URL with trailing slashes removed.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}
