//! Evidence compression into short bullet claims with provenance.

use services::text::truncate_chars;

use super::{EvidenceModel, tool_error};

const EVIDENCE_CHARS: usize = 5000;
/// Prefix of the text returned when compression failed.
pub const COMPRESS_FAILED: &str = "context_compress_failed";

const SYSTEM: &str = "Compress evidence into concise, grounded bullet claims with provenance.";

pub async fn compress(model: &EvidenceModel, question: &str, kb_context: &str, file_text: &str) -> String {
    let mut ask = format!(
        "Question: {question}\nEvidence from KB:\n{}\n",
        truncate_chars(kb_context, EVIDENCE_CHARS)
    );
    if !file_text.trim().is_empty() {
        ask.push_str("Evidence from files:\n");
        ask.push_str(&truncate_chars(file_text, EVIDENCE_CHARS));
        ask.push('\n');
    }
    ask.push_str("Return up to 8 bullet claims. Format: '- [doc:ID] claim'. If no id, omit bracket.");

    match model.ask(SYSTEM, ask).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => format!("{COMPRESS_FAILED}: {}", tool_error(&e)),
    }
}

/// Compressed text usable as evidence (non-blank and not a failure marker).
pub fn is_usable(compressed: &str) -> bool {
    let t = compressed.trim();
    !t.is_empty() && !t.starts_with(COMPRESS_FAILED)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use services::WorkerPool;

    use super::*;
    use crate::tools::testing::Scripted;

    #[tokio::test]
    async fn claims_are_trimmed_and_prompt_is_bounded() {
        let b = Scripted::replying("\n- [doc:1] retries are capped\n");
        let m = EvidenceModel::new(b.clone(), WorkerPool::new(1), Duration::from_secs(5));
        let out = compress(&m, "q", &"x".repeat(6000), "file facts").await;
        assert_eq!(out, "- [doc:1] retries are capped");
        assert!(is_usable(&out));

        let prompt = b.last_prompt();
        assert!(prompt.contains("Evidence from files:\nfile facts\n"));
        assert!(prompt.chars().count() < 5400);
    }

    #[tokio::test]
    async fn failure_is_tagged_and_not_usable() {
        let m = EvidenceModel::new(Scripted::failing(), WorkerPool::new(1), Duration::from_secs(5));
        let out = compress(&m, "q", "ctx", "").await;
        assert!(out.starts_with("context_compress_failed: "));
        assert!(!is_usable(&out));
        assert!(!is_usable("   "));
    }
}
