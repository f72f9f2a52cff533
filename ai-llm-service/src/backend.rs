//! Provider-agnostic generation interface.
//!
//! Both methods receive the same `(system, user)` pair, so the single-shot and
//! the streaming path always send identical prompt content.

use std::{future::Future, pin::Pin};

use crate::{
    error_handler::Result,
    services::{
        delta_stream::DeltaStream, ollama_service::OllamaService, open_ai_service::OpenAiService,
    },
};

/// Boxed future used at trait-object seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat model that can answer once or incrementally.
pub trait GenerationBackend: Send + Sync {
    /// Upstream model id, used in logs and analytics.
    fn model(&self) -> &str;

    /// Single-shot generation returning the full text.
    fn call<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Incremental generation; deltas arrive in backend order.
    fn stream<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<DeltaStream>>;
}

impl GenerationBackend for OllamaService {
    fn model(&self) -> &str {
        &self.config().model
    }

    fn call<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.chat(system, user))
    }

    fn stream<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<DeltaStream>> {
        Box::pin(self.chat_stream(system, user))
    }
}

impl GenerationBackend for OpenAiService {
    fn model(&self) -> &str {
        &self.config().model
    }

    fn call<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.chat(system, user))
    }

    fn stream<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<DeltaStream>> {
        Box::pin(self.chat_stream(system, user))
    }
}
