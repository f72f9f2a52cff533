//! Public API types re-used by external crates (e.g., the HTTP API layer).

use std::fmt;

use attachments::config::HARD_MAX_FILES;
use rag_store::KbDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services::{ids::temp_session_id, text::uniq_limit};

/// Scope policy of one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeMode {
    /// Answer general questions, never leak private details.
    #[default]
    PrivacySafe,
    /// Answer only about the assistant's owner; anything else gets the canonical reply.
    YuqiOnly,
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeMode::PrivacySafe => "PRIVACY_SAFE",
            ScopeMode::YuqiOnly => "YUQI_ONLY",
        })
    }
}

/// Inbound question. Only `question` is required.
///
/// # Example
/// ```
/// use contextor::{AnswerRequest, ScopeMode};
/// let req: AnswerRequest = serde_json::from_str(
///     r#"{"question":"Where does Yuqi work?","deepThinking":true,"scopeMode":"YUQI_ONLY"}"#,
/// ).unwrap();
/// assert!(req.resolve_deep_thinking());
/// assert_eq!(req.resolve_scope_mode(), ScopeMode::YuqiOnly);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub deep_thinking: Option<bool>,
    #[serde(default)]
    pub scope_mode: Option<ScopeMode>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vision_model: Option<String>,
    #[serde(default)]
    pub file_urls: Vec<String>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// `0` or unset falls back to `default`.
    pub fn resolve_top_k(&self, default: usize) -> usize {
        match self.top_k {
            Some(k) if k > 0 => k,
            _ => default,
        }
    }

    pub fn resolve_min_score(&self, default: f64) -> f64 {
        self.min_score.unwrap_or(default)
    }

    pub fn resolve_deep_thinking(&self) -> bool {
        self.deep_thinking.unwrap_or(false)
    }

    pub fn resolve_scope_mode(&self) -> ScopeMode {
        self.scope_mode.unwrap_or_default()
    }

    pub fn resolve_model(&self) -> Option<&str> {
        non_blank(self.model.as_deref())
    }

    pub fn resolve_vision_model(&self) -> Option<&str> {
        non_blank(self.vision_model.as_deref())
    }

    /// Non-blank, de-duplicated URLs, at most `max_files` (never more than the hard cap).
    pub fn resolve_file_urls(&self, max_files: usize) -> Vec<String> {
        uniq_limit(&self.file_urls, max_files.min(HARD_MAX_FILES))
    }

    /// Derives the session once; a blank id yields a temporary session.
    pub fn resolve_session(&self) -> ResolvedSession {
        match non_blank(self.session_id.as_deref()) {
            Some(id) => ResolvedSession {
                id: id.to_string(),
                temporary: false,
            },
            None => ResolvedSession {
                id: temp_session_id(),
                temporary: true,
            },
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: String,
    pub temporary: bool,
}

/// Blocking answer together with the KB documents that backed it.
#[derive(Clone, Debug, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub documents: Vec<KbDocument>,
}

/// One ordered progress notification of a streaming answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThinkingEvent {
    pub stage: String,
    pub label: String,
    pub payload: Value,
}

impl ThinkingEvent {
    pub fn new(stage: &str, label: &str, payload: Value) -> Self {
        Self {
            stage: stage.to_string(),
            label: label.to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_and_zero_values() {
        let req: AnswerRequest =
            serde_json::from_str(r#"{"question":"q","topK":0,"model":"  "}"#).unwrap();
        assert_eq!(req.resolve_top_k(3), 3);
        assert_eq!(req.resolve_min_score(0.6), 0.6);
        assert!(!req.resolve_deep_thinking());
        assert_eq!(req.resolve_scope_mode(), ScopeMode::PrivacySafe);
        assert_eq!(req.resolve_model(), None);
    }

    #[test]
    fn blank_session_becomes_temporary() {
        let mut req = AnswerRequest::new("q");
        req.session_id = Some("   ".into());
        let s = req.resolve_session();
        assert!(s.temporary);
        assert!(s.id.starts_with("temp-"));

        req.session_id = Some("abc".into());
        assert_eq!(
            req.resolve_session(),
            ResolvedSession {
                id: "abc".into(),
                temporary: false
            }
        );
    }

    #[test]
    fn file_urls_are_capped_and_deduped() {
        let mut req = AnswerRequest::new("q");
        req.file_urls = ["a", " a ", "", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(req.resolve_file_urls(2), ["a", "b"]);
        assert_eq!(req.resolve_file_urls(10), ["a", "b", "c"]);
    }

    #[test]
    fn scope_mode_wire_names() {
        let m: ScopeMode = serde_json::from_str("\"PRIVACY_SAFE\"").unwrap();
        assert_eq!(m, ScopeMode::PrivacySafe);
        assert_eq!(ScopeMode::YuqiOnly.to_string(), "YUQI_ONLY");
    }
}
