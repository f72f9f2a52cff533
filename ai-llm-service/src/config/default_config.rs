//! Backend configs loaded strictly from environment variables.
//!
//! Every backend is addressed by a short key (the model name a request may
//! ask for, e.g. `deepseek` or `ollama`). The set of keys comes from
//! `LLM_BACKENDS`; each key then reads its own prefixed variables.
//!
//! # Environment variables
//!
//! Registry:
//! - `LLM_BACKENDS`       = comma-separated keys (default `ollama`)
//! - `LLM_DEFAULT_MODEL`  = key used when a request names no/unknown model
//! - `LLM_EVIDENCE_MODEL` = key used for evidence sub-calls (scope guard, entity resolve, compression)
//!
//! Per backend (`<KEY>` is the upper-cased key, `-` replaced by `_`):
//! - `LLM_<KEY>_PROVIDER`     = `ollama` | `openai` (default: `ollama` for key `ollama`, else `openai`)
//! - `LLM_<KEY>_MODEL`        = upstream model id (required)
//! - `LLM_<KEY>_ENDPOINT`     = base URL (default: `OLLAMA_URL`/`http://localhost:11434` or `https://api.openai.com`)
//! - `LLM_<KEY>_API_KEY`      = bearer token (required for `openai`)
//! - `LLM_<KEY>_TIMEOUT_SECS` = request timeout (default 120)
//! - `LLM_<KEY>_MAX_TOKENS`   = optional cap
//! - `LLM_<KEY>_TEMPERATURE`  = optional, `0.0..=2.0`
//!
//! Vision understanding (optional; disabled when `VISION_MODEL` is unset):
//! - `VISION_ENDPOINT`, `VISION_MODEL`, `VISION_API_KEY`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, env_opt, env_opt_f32, env_opt_u32, env_opt_u64, must_env,
        validate_http_endpoint, validate_range_f32,
    },
};

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com";

/// Backend keys listed in `LLM_BACKENDS`, lower-cased, in declaration order.
pub fn backend_keys() -> Vec<String> {
    let raw = env_opt("LLM_BACKENDS").unwrap_or_else(|| "ollama".to_string());
    let mut keys: Vec<String> = Vec::new();
    for k in raw.split(',') {
        let k = k.trim().to_ascii_lowercase();
        if !k.is_empty() && !keys.contains(&k) {
            keys.push(k);
        }
    }
    keys
}

/// Env prefix of one backend key: `deep-seek` → `LLM_DEEP_SEEK_`.
pub fn env_prefix(key: &str) -> String {
    format!("LLM_{}_", key.trim().to_ascii_uppercase().replace('-', "_"))
}

/// Resolves the Ollama endpoint from `OLLAMA_URL`, falling back to localhost.
fn ollama_endpoint() -> String {
    env_opt("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.to_string())
}

/// Builds the config of the backend registered under `key`.
///
/// # Errors
///
/// - [`ConfigError::MissingVar`] if `LLM_<KEY>_MODEL` is missing
/// - [`ConfigError::UnsupportedProvider`] for an unknown provider name
/// - [`ConfigError::InvalidFormat`] if the endpoint is not http/https
/// - [`ConfigError::InvalidNumber`]/[`ConfigError::OutOfRange`] for bad numbers
pub fn config_for_backend(key: &str) -> Result<LlmModelConfig, AiLlmError> {
    let prefix = env_prefix(key);
    let var = |suffix: &str| format!("{prefix}{suffix}");

    let provider = match env_opt(&var("PROVIDER")) {
        Some(p) => p.parse::<LlmProvider>()?,
        None if key.eq_ignore_ascii_case("ollama") => LlmProvider::Ollama,
        None => LlmProvider::OpenAI,
    };

    let model = must_env(&var("MODEL"))?;

    let endpoint = match env_opt(&var("ENDPOINT")) {
        Some(e) => e,
        None => match provider {
            LlmProvider::Ollama => ollama_endpoint(),
            LlmProvider::OpenAI => DEFAULT_OPENAI_ENDPOINT.to_string(),
        },
    };
    validate_http_endpoint(&var("ENDPOINT"), &endpoint)?;

    let temperature = env_opt_f32(&var("TEMPERATURE"))?;
    if let Some(t) = temperature {
        validate_range_f32("temperature", t, 0.0, 2.0)?;
    }

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key: env_opt(&var("API_KEY")),
        max_tokens: env_opt_u32(&var("MAX_TOKENS"))?,
        temperature,
        top_p: None,
        timeout_secs: Some(
            env_opt_u64(&var("TIMEOUT_SECS"))?.unwrap_or(LlmModelConfig::DEFAULT_TIMEOUT_SECS),
        ),
    })
}

/// Vision understanding config, or `None` when `VISION_MODEL` is unset.
///
/// The vision backend always speaks the OpenAI-compatible protocol.
pub fn config_vision() -> Result<Option<LlmModelConfig>, AiLlmError> {
    let Some(model) = env_opt("VISION_MODEL") else {
        return Ok(None);
    };
    let endpoint = env_opt("VISION_ENDPOINT").ok_or_else(|| {
        AiLlmError::from(ConfigError::MissingVar("VISION_ENDPOINT".to_string()))
    })?;
    validate_http_endpoint("VISION_ENDPOINT", &endpoint)?;

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint,
        api_key: env_opt("VISION_API_KEY"),
        max_tokens: Some(1024),
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(60),
    }))
}
