//! LLM scope check: is the question about the assistant's owner at all?

use serde::{Deserialize, Serialize};
use services::text::truncate_chars;

use super::{EvidenceModel, tool_error};

const SYSTEM: &str = "You are a scope guard for a personal knowledge assistant (Yuqi's assistant). \
Decide whether the user's question is about Yuqi, Yuqi's work, projects, writing or public profile. \
Answer with JSON only.";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeVerdict {
    pub scoped: bool,
    pub reason: String,
    pub rewrite_hint: String,
}

impl ScopeVerdict {
    fn new(scoped: bool, reason: impl Into<String>, rewrite_hint: impl Into<String>) -> Self {
        Self {
            scoped,
            reason: reason.into(),
            rewrite_hint: rewrite_hint.into(),
        }
    }

    /// Verdict used when the guard does not run.
    pub fn assumed() -> Self {
        Self::new(true, "assume in scope", "")
    }
}

impl Default for ScopeVerdict {
    fn default() -> Self {
        Self::assumed()
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    scoped: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default, alias = "rewriteHint")]
    rewrite_hint: Option<String>,
}

pub async fn check(model: &EvidenceModel, question: &str) -> ScopeVerdict {
    let question = question.trim();
    if question.is_empty() {
        return ScopeVerdict::new(false, "empty question", "");
    }
    let ask = format!(
        "Question: {question}\nReturn JSON with keys scoped (true/false), reason, rewrite_hint (optional narrower query)."
    );
    match model.ask(SYSTEM, ask).await {
        Ok(raw) => parse_verdict(&raw),
        Err(e) => ScopeVerdict::new(true, format!("guard_failed: {}", tool_error(&e)), ""),
    }
}

/// JSON verdict when the reply carries one, otherwise a keyword reading of the text.
pub fn parse_verdict(raw: &str) -> ScopeVerdict {
    if let Some(v) = json_object(raw).and_then(|s| serde_json::from_str::<RawVerdict>(s).ok()) {
        return ScopeVerdict::new(
            v.scoped.unwrap_or(true),
            v.reason.unwrap_or_default(),
            v.rewrite_hint.unwrap_or_default(),
        );
    }
    let lower = raw.to_lowercase();
    let scoped = !(lower.contains("not") && lower.contains("yuqi"));
    ScopeVerdict::new(scoped, truncate_chars(raw.trim(), 300), "")
}

/// Outermost `{...}` span, tolerating code fences and chatter around it.
fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use services::WorkerPool;

    use super::*;
    use crate::tools::testing::Scripted;

    fn model(b: std::sync::Arc<Scripted>) -> EvidenceModel {
        EvidenceModel::new(b, WorkerPool::new(2), Duration::from_secs(5))
    }

    #[test]
    fn json_reply_with_either_hint_key() {
        let v = parse_verdict("```json\n{\"scoped\": false, \"reason\": \"weather\", \"rewriteHint\": \"Yuqi's city\"}\n```");
        assert_eq!(v, ScopeVerdict::new(false, "weather", "Yuqi's city"));
        let v = parse_verdict(r#"{"reason":"ok","rewrite_hint":"x"}"#);
        assert!(v.scoped);
        assert_eq!(v.rewrite_hint, "x");
    }

    #[test]
    fn plain_text_reply_falls_back_to_keywords() {
        assert!(!parse_verdict("This is not about Yuqi.").scoped);
        assert!(parse_verdict("Yes, it concerns Yuqi's blog.").scoped);
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_a_call() {
        let b = Scripted::replying("{}");
        let v = check(&model(b.clone()), "  ").await;
        assert_eq!(v, ScopeVerdict::new(false, "empty question", ""));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn backend_failure_keeps_the_question_in_scope() {
        let v = check(&model(Scripted::failing()), "Where does Yuqi work?").await;
        assert!(v.scoped);
        assert!(v.reason.starts_with("guard_failed: "));
    }

    #[tokio::test]
    async fn prompt_carries_question() {
        let b = Scripted::replying(r#"{"scoped":true,"reason":"about owner"}"#);
        let v = check(&model(b.clone()), "Yuqi's projects?").await;
        assert_eq!(v.reason, "about owner");
        assert!(b.last_prompt().starts_with("Question: Yuqi's projects?\n"));
    }
}
