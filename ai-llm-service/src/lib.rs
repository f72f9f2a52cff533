//! Generation backends shared by the workspace.
//!
//! - [`backend::GenerationBackend`]: single-shot and incremental generation.
//! - [`services`]: Ollama and OpenAI-compatible HTTP clients, vision understanding.
//! - [`registry::BackendRegistry`]: model-keyed lookup with a configured default.
//! - [`telemetry`]: tracing layer and env filter used by the binary.

pub mod backend;
pub mod config;
pub mod error_handler;
pub mod registry;
pub mod services;
pub mod telemetry;

pub use backend::{BoxFuture, GenerationBackend};
pub use config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
pub use error_handler::{AiLlmError, Result};
pub use registry::BackendRegistry;
pub use services::delta_stream::DeltaStream;
pub use services::vision_service::VisionService;
