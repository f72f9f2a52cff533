//! Retrieval-augmented answering with an ordered "thinking" event stream.
//!
//! Public API: [`AnswerEngine`]. One request plans its optional steps,
//! gathers evidence from the knowledge base and attached files, sanitizes it,
//! builds a bounded prompt and generates an answer either in one shot
//! ([`AnswerEngine::answer`]) or as a stream of [`ThinkingEvent`]s
//! ([`AnswerEngine::stream_events`]).
//!
//! # Example
//! ```no_run
//! # use contextor::{AnswerEngine, AnswerRequest};
//! # #[tokio::main] async fn main() {
//! let engine = AnswerEngine::from_env().unwrap();
//! let out = engine.answer(AnswerRequest::new("Where does Yuqi work?")).await.unwrap();
//! println!("{}", out.answer);
//! # }
//! ```

pub mod analytics;
mod api_types;
mod cfg;
pub mod context;
mod error;
pub mod events;
pub mod key_info;
pub mod memory;
mod orchestrator;
pub mod prompt;
pub mod qa;
pub mod roadmap;
pub mod sanitize;
mod stage;
pub mod tools;

pub use api_types::{AnswerRequest, RagAnswer, ResolvedSession, ScopeMode, ThinkingEvent};
pub use cfg::ContextorConfig;
pub use error::{ContextorError, Result};
pub use orchestrator::{AnswerEngine, EngineDeps, EventStream, PlainStream};
