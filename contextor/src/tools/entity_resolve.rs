//! Search-term extraction for retrieval refinement.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use services::text::{truncate_chars, uniq_limit};

use super::{EvidenceModel, tool_error};

pub const MAX_ENTITY_TERMS: usize = 8;
const FILE_PREVIEW_CHARS: usize = 900;

const SYSTEM: &str = "Extract concise search terms (keywords, entities) that best represent the user's ask.";

static TERM_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,\n]\s*").expect("term split regex is valid"));

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EntityTerms {
    pub terms: Vec<String>,
    #[serde(skip)]
    pub raw: String,
}

pub async fn resolve(model: &EvidenceModel, question: &str, file_text: &str) -> EntityTerms {
    let mut ask = format!("Question: {question}\n");
    if !file_text.trim().is_empty() {
        ask.push_str("File text:\n");
        ask.push_str(&truncate_chars(file_text, FILE_PREVIEW_CHARS));
        ask.push('\n');
    }
    ask.push_str(&format!(
        "Return a comma-separated list of at most {MAX_ENTITY_TERMS} short terms."
    ));

    match model.ask(SYSTEM, ask).await {
        Ok(raw) => EntityTerms {
            terms: parse_terms(&raw, MAX_ENTITY_TERMS),
            raw,
        },
        Err(e) => EntityTerms {
            terms: Vec::new(),
            raw: format!("entity_resolve_failed: {}", tool_error(&e)),
        },
    }
}

/// Comma or newline separated terms; brackets and quotes are ignored.
pub fn parse_terms(raw: &str, limit: usize) -> Vec<String> {
    let cleaned = raw.replace(['[', ']', '"'], " ");
    uniq_limit(TERM_SPLIT.split(&cleaned), limit)
}
