//! Model-keyed registry of generation backends.
//!
//! - Built once at startup, wrapped in `Arc`, shared by every request.
//! - Lookup is a pure function over the registered keys: exact key
//!   (case-insensitive) → configured default → first registered.
//! - An empty registry cannot be constructed.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::BackendRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(BackendRegistry::from_env()?);
//! let (key, backend) = registry.resolve(Some("DeepSeek"));
//! println!("{key} -> {}", backend.model());
//! # Ok(()) }
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    backend::GenerationBackend,
    config::{
        default_config::{backend_keys, config_for_backend},
        llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::{AiLlmError, Result, env_opt},
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

/// Ordered set of named backends plus an optional default key.
pub struct BackendRegistry {
    entries: Vec<(String, Arc<dyn GenerationBackend>)>,
    default_key: Option<String>,
    evidence_key: Option<String>,
}

impl BackendRegistry {
    /// Creates a registry from already-built backends.
    ///
    /// Keys are trimmed and lower-cased; later duplicates are ignored.
    ///
    /// # Errors
    /// [`AiLlmError::NoBackend`] if `entries` is empty.
    pub fn new(
        entries: Vec<(String, Arc<dyn GenerationBackend>)>,
        default_key: Option<String>,
    ) -> Result<Self> {
        let mut normalized: Vec<(String, Arc<dyn GenerationBackend>)> = Vec::new();
        for (key, backend) in entries {
            let key = normalize_key(&key);
            if key.is_empty() || normalized.iter().any(|(k, _)| *k == key) {
                continue;
            }
            normalized.push((key, backend));
        }
        if normalized.is_empty() {
            return Err(AiLlmError::NoBackend);
        }

        Ok(Self {
            entries: normalized,
            default_key: default_key.map(|k| normalize_key(&k)).filter(|k| !k.is_empty()),
            evidence_key: None,
        })
    }

    /// Key used by evidence sub-calls (scope guard, entity resolve, compression).
    pub fn with_evidence_key(mut self, key: Option<String>) -> Self {
        self.evidence_key = key.map(|k| normalize_key(&k)).filter(|k| !k.is_empty());
        self
    }

    /// Builds every backend listed in `LLM_BACKENDS`.
    ///
    /// # Errors
    /// Any per-backend config error, or [`AiLlmError::NoBackend`] when the list is empty.
    pub fn from_env() -> Result<Self> {
        let mut entries: Vec<(String, Arc<dyn GenerationBackend>)> = Vec::new();
        for key in backend_keys() {
            let cfg = config_for_backend(&key)?;
            let backend = build_backend(cfg)?;
            info!(key = %key, model = %backend.model(), "generation backend registered");
            entries.push((key, backend));
        }

        let registry = Self::new(entries, env_opt("LLM_DEFAULT_MODEL"))?
            .with_evidence_key(env_opt("LLM_EVIDENCE_MODEL"));

        if let Some(d) = &registry.default_key {
            if !registry.keys().any(|k| k == d) {
                warn!(default = %d, "LLM_DEFAULT_MODEL is not a registered backend; using the first one");
            }
        }
        Ok(registry)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Resolves the backend for a requested model name.
    pub fn resolve(&self, requested: Option<&str>) -> (&str, Arc<dyn GenerationBackend>) {
        let keys: Vec<&str> = self.keys().collect();
        // `new` guarantees at least one entry, so index 0 always exists.
        let idx = resolve_index(&keys, requested, self.default_key.as_deref()).unwrap_or(0);
        let (key, backend) = &self.entries[idx];
        (key.as_str(), backend.clone())
    }

    /// Backend for evidence sub-calls: evidence key, else the default chain.
    pub fn evidence_backend(&self) -> Arc<dyn GenerationBackend> {
        self.resolve(self.evidence_key.as_deref()).1
    }
}

/// Builds the client matching the config's provider.
pub fn build_backend(cfg: LlmModelConfig) -> Result<Arc<dyn GenerationBackend>> {
    Ok(match cfg.provider {
        LlmProvider::Ollama => Arc::new(OllamaService::new(cfg)?),
        LlmProvider::OpenAI => Arc::new(OpenAiService::new(cfg)?),
    })
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Pure lookup: exact (case-insensitive) → default → first; `None` only for no keys.
pub fn resolve_index(keys: &[&str], requested: Option<&str>, default: Option<&str>) -> Option<usize> {
    if keys.is_empty() {
        return None;
    }
    let find = |wanted: &str| {
        let wanted = normalize_key(wanted);
        keys.iter().position(|k| k.eq_ignore_ascii_case(&wanted))
    };

    requested
        .and_then(find)
        .or_else(|| default.and_then(find))
        .or(Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::BoxFuture, services::delta_stream::DeltaStream};

    struct Named(&'static str);

    impl GenerationBackend for Named {
        fn model(&self) -> &str {
            self.0
        }
        fn call<'a>(&'a self, _s: &'a str, _u: &'a str) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move { Ok(self.0.to_string()) })
        }
        fn stream<'a>(&'a self, _s: &'a str, _u: &'a str) -> BoxFuture<'a, Result<DeltaStream>> {
            Box::pin(async move { Ok(DeltaStream::from_deltas([self.0])) })
        }
    }

    fn registry(default: Option<&str>) -> BackendRegistry {
        BackendRegistry::new(
            vec![
                ("ollama".into(), Arc::new(Named("qwen3")) as Arc<dyn GenerationBackend>),
                ("DeepSeek".into(), Arc::new(Named("deepseek-chat"))),
            ],
            default.map(String::from),
        )
        .unwrap()
    }

    #[test]
    fn resolve_order() {
        let keys = ["ollama", "deepseek"];
        assert_eq!(resolve_index(&keys, Some("DEEPSEEK"), None), Some(1));
        assert_eq!(resolve_index(&keys, Some("gpt"), Some("deepseek")), Some(1));
        assert_eq!(resolve_index(&keys, Some("gpt"), Some("nope")), Some(0));
        assert_eq!(resolve_index(&keys, None, None), Some(0));
        assert_eq!(resolve_index(&[], Some("x"), None), None);
    }

    #[test]
    fn registry_resolves_case_insensitively() {
        let r = registry(Some("deepseek"));
        assert_eq!(r.resolve(Some("deepSeek")).0, "deepseek");
        assert_eq!(r.resolve(Some("unknown")).1.model(), "deepseek-chat");
        assert_eq!(registry(None).resolve(None).1.model(), "qwen3");
    }

    #[test]
    fn empty_registry_is_an_error() {
        assert!(matches!(
            BackendRegistry::new(Vec::new(), None),
            Err(AiLlmError::NoBackend)
        ));
    }

    #[test]
    fn evidence_backend_falls_back_to_default_chain() {
        let r = registry(Some("deepseek")).with_evidence_key(Some("ollama".into()));
        assert_eq!(r.evidence_backend().model(), "qwen3");
        let r = registry(Some("deepseek"));
        assert_eq!(r.evidence_backend().model(), "deepseek-chat");
    }
}
