use contextor::AnswerEngine;

use crate::error_handler::AppResult;

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AnswerEngine,
}

impl AppState {
    /// Load shared state from environment variables.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            engine: AnswerEngine::from_env()?,
        })
    }
}
