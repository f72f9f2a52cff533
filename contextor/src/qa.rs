//! QA-shaped KB documents mined as answer hints.
//!
//! A document is QA-shaped when its type is `chat_qa`, or its content carries
//! a `【回答】` block or an `answer:` line. Candidates are framed to the
//! generator as hints, never as the answer itself.

use std::sync::LazyLock;

use rag_store::{RetrievalResult, ScoredDocument};
use regex::Regex;
use serde::Serialize;
use services::text::{truncate_chars, uniq_limit};

use crate::prompt::OUT_OF_SCOPE_REPLY;

pub const MAX_QA_CANDIDATES: usize = 3;
pub const QA_MATCH_HIGH: u32 = 6;
pub const QA_MATCH_MED: u32 = 3;
const MAX_QUESTION_KEYWORDS: usize = 12;
const QUESTION_PREVIEW_CHARS: usize = 260;
const ANSWER_PREVIEW_CHARS: usize = 400;

static ZH_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【回答】\s*([\s\S]*?)(?:\n\s*【|\z)").expect("zh answer regex is valid"));
static EN_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\n)\s*(?:answer\s*:|a\s*:)\s*([\s\S]*?)(?:\n\s*(?:question\s*:|q\s*:|context\s*:)|\z)")
        .expect("en answer regex is valid")
});
static ZH_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"【(?:问题|提问)】\s*([\s\S]*?)(?:\n\s*【|\z)").expect("zh question regex is valid")
});
static EN_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\n)\s*(?:question\s*:|q\s*:)\s*([\s\S]*?)(?:\n\s*(?:answer\s*:|a\s*:|context\s*:)|\z)")
        .expect("en question regex is valid")
});
static WORD_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("split regex is valid"));
static HAN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Han}{2,}").expect("han regex is valid"));

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QaCandidate {
    pub id: String,
    pub doc_type: String,
    pub score: f64,
    pub match_score: u32,
    /// Preview, at most 260 chars.
    pub question: String,
    /// Preview, at most 400 chars.
    pub answer: String,
    #[serde(skip)]
    pub full_answer: String,
}

impl QaCandidate {
    pub fn match_label(&self) -> &'static str {
        match_label(self.match_score)
    }
}

pub fn match_label(score: u32) -> &'static str {
    if score >= QA_MATCH_HIGH {
        "HIGH"
    } else if score >= QA_MATCH_MED {
        "MED"
    } else {
        "LOW"
    }
}

/// Up to [`MAX_QA_CANDIDATES`] hints from `retrieval`, highest similarity first.
pub fn extract_candidates(retrieval: &RetrievalResult, user_question: &str) -> Vec<QaCandidate> {
    if retrieval.documents.is_empty() {
        return Vec::new();
    }
    let keywords = question_keywords(user_question);

    let mut sorted: Vec<&ScoredDocument> = retrieval.documents.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    sorted
        .into_iter()
        .filter_map(|sd| candidate(sd, &keywords))
        .take(MAX_QA_CANDIDATES)
        .collect()
}

fn candidate(sd: &ScoredDocument, keywords: &[String]) -> Option<QaCandidate> {
    let doc = &sd.document;
    let doc_type = doc.doc_type.clone().unwrap_or_default();
    let content = doc.content.as_str();

    let looks_qa = doc_type.eq_ignore_ascii_case("chat_qa")
        || content.contains("【回答】")
        || content.to_lowercase().contains("answer:");
    if !looks_qa {
        return None;
    }

    let answer = first_span(content, &[&ZH_ANSWER, &EN_ANSWER])?;
    if answer == OUT_OF_SCOPE_REPLY {
        return None;
    }
    let question = first_span(content, &[&ZH_QUESTION, &EN_QUESTION]).unwrap_or_default();

    let match_text = if question.is_empty() { &answer } else { &question };
    Some(QaCandidate {
        id: doc.id.clone(),
        doc_type,
        score: sd.score,
        match_score: match_score(match_text, keywords),
        question: truncate_chars(&question, QUESTION_PREVIEW_CHARS),
        answer: truncate_chars(&answer, ANSWER_PREVIEW_CHARS),
        full_answer: answer,
    })
}

/// First non-blank capture of the first pattern that yields one.
fn first_span(content: &str, patterns: &[&Regex]) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Lowercase alphanumeric tokens of 3+ chars plus Han runs of 2+ chars.
pub fn question_keywords(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let tokens = WORD_SPLIT
        .split(&lower)
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_string)
        .chain(HAN_RUN.find_iter(question).map(|m| m.as_str().to_string()))
        .collect::<Vec<_>>();
    uniq_limit(tokens, MAX_QUESTION_KEYWORDS)
}

/// +2 for each keyword contained in `text` (case-insensitive).
pub fn match_score(text: &str, keywords: &[String]) -> u32 {
    if text.trim().is_empty() {
        return 0;
    }
    let lower = text.to_lowercase();
    keywords.iter().filter(|k| lower.contains(k.as_str())).map(|_| 2).sum()
}

/// Top candidate eligible to answer without generation: HIGH match and
/// similarity at least `min_score`.
pub fn fast_path(candidates: &[QaCandidate], min_score: f64) -> Option<&QaCandidate> {
    candidates
        .first()
        .filter(|c| c.match_score >= QA_MATCH_HIGH && c.score >= min_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_store::KbDocument;

    fn doc(id: &str, ty: Option<&str>, content: &str, score: f64) -> ScoredDocument {
        ScoredDocument {
            document: KbDocument {
                id: id.into(),
                doc_type: ty.map(str::to_string),
                content: content.into(),
            },
            score,
        }
    }

    fn retrieval(docs: Vec<ScoredDocument>) -> RetrievalResult {
        RetrievalResult {
            question: "q".into(),
            documents: docs,
            context: String::new(),
        }
    }

    #[test]
    fn chinese_block_is_extracted() {
        let r = retrieval(vec![doc("1", None, "【问题】What is X?\n【回答】X is Y", 0.9)]);
        let c = extract_candidates(&r, "What is X?");
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].answer, "X is Y");
        assert_eq!(c[0].question, "What is X?");
        assert_eq!(c[0].score, 0.9);
    }

    #[test]
    fn english_lines_and_match_scoring() {
        let content = "Question: Where is the retry config loaded?\nAnswer: In RetryLoader.\nContext: infra";
        let r = retrieval(vec![doc("7", Some("CHAT_QA"), content, 0.8)]);
        let c = extract_candidates(&r, "Where is the retry config loaded?");
        assert_eq!(c[0].answer, "In RetryLoader.");
        assert_eq!(c[0].question, "Where is the retry config loaded?");
        // where, the, retry, config, loaded
        assert_eq!(c[0].match_score, 10);
        assert_eq!(c[0].match_label(), "HIGH");
    }

    #[test]
    fn canonical_reply_and_non_qa_docs_are_dropped() {
        let r = retrieval(vec![
            doc("a", Some("chat_qa"), &format!("【回答】{OUT_OF_SCOPE_REPLY}"), 0.99),
            doc("b", Some("note"), "plain knowledge text", 0.95),
            doc("c", Some("chat_qa"), "【回答】kept", 0.5),
        ]);
        let c = extract_candidates(&r, "anything");
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].id, "c");
        assert!(c.iter().all(|x| x.answer != OUT_OF_SCOPE_REPLY));
    }

    #[test]
    fn ordered_by_score_and_capped() {
        let docs = (0..5)
            .map(|i| doc(&i.to_string(), Some("chat_qa"), "answer: yes", i as f64 / 10.0))
            .collect();
        let c = extract_candidates(&retrieval(docs), "q");
        let ids: Vec<&str> = c.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids, ["4", "3", "2"]);
    }

    #[test]
    fn keywords_cover_latin_and_han() {
        let k = question_keywords("郭宇琦的 blog 在哪里? Is it on GitHub");
        assert!(k.contains(&"blog".to_string()));
        assert!(k.contains(&"github".to_string()));
        assert!(k.iter().any(|t| t.starts_with("郭宇琦")));
        assert!(!k.contains(&"is".to_string()));
    }

    #[test]
    fn fast_path_needs_high_match_and_score() {
        let mut c = QaCandidate {
            id: "1".into(),
            doc_type: "chat_qa".into(),
            score: 0.7,
            match_score: 6,
            question: "q".into(),
            answer: "a".into(),
            full_answer: "a".into(),
        };
        assert!(fast_path(std::slice::from_ref(&c), 0.6).is_some());
        assert!(fast_path(std::slice::from_ref(&c), 0.8).is_none());
        c.match_score = 4;
        assert!(fast_path(&[c], 0.6).is_none());
        assert!(fast_path(&[], 0.0).is_none());
    }
}
