pub mod delta_stream;
pub mod ollama_service;
pub mod open_ai_service;
pub mod vision_service;
