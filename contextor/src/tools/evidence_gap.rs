//! Missing-fact heuristics over the question and the gathered evidence.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub(crate) static COMPARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(compare|difference|vs\.?|versus|比较|区别)").expect("compare regex is valid"));
pub(crate) static HOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(how|steps|procedure|如何|步骤)").expect("how regex is valid"));
pub(crate) static WHY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(why|reason|cause|为什么|原因)").expect("why regex is valid"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+|when|timeline|date|time|时间|日期)").expect("number regex is valid")
});

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceGap {
    pub missing_facts: Vec<String>,
    pub follow_ups: Vec<String>,
    pub status: &'static str,
}

impl Default for EvidenceGap {
    fn default() -> Self {
        Self {
            missing_facts: Vec::new(),
            follow_ups: Vec::new(),
            status: "skipped",
        }
    }
}

impl EvidenceGap {
    pub fn is_empty(&self) -> bool {
        self.missing_facts.is_empty() && self.follow_ups.is_empty()
    }
}

pub fn check(question: &str, evidence: &str, key_info: &[String]) -> EvidenceGap {
    let q = question.trim();
    if q.is_empty() {
        return EvidenceGap {
            missing_facts: vec!["Question is missing.".into()],
            follow_ups: vec!["Ask the user to provide a concrete question.".into()],
            status: "empty_question",
        };
    }

    let mut missing: Vec<String> = Vec::new();
    let mut follow: Vec<String> = Vec::new();
    let mut note = |fact: &str, ask: Option<&str>| {
        missing.push(fact.to_string());
        if let Some(ask) = ask {
            follow.push(ask.to_string());
        }
    };

    if evidence.trim().is_empty() {
        note(
            "No supporting evidence was provided.",
            Some("Request relevant context, documents, or examples."),
        );
    }
    if key_info.is_empty() {
        note("No key facts were extracted yet.", None);
    }
    if COMPARE.is_match(q) {
        note(
            "Comparison criteria are not specified.",
            Some("Ask which criteria matter most in the comparison."),
        );
    }
    if HOW.is_match(q) {
        note(
            "Constraints or environment are unclear.",
            Some("Ask about constraints, target environment, or expected outcome."),
        );
    }
    if WHY.is_match(q) {
        note("Causal evidence may be required.", None);
    }
    if NUMBER.is_match(q) {
        note("Exact timeline or numeric details may be missing.", None);
    }

    let status = if missing.is_empty() { "ok" } else { "needs_info" };
    EvidenceGap {
        missing_facts: missing,
        follow_ups: follow,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_question_short_circuits() {
        let g = check(" ", "ev", &[]);
        assert_eq!(g.status, "empty_question");
        assert_eq!(g.missing_facts, ["Question is missing."]);
    }

    #[test]
    fn how_to_without_evidence_needs_info() {
        let g = check("How do I deploy it?", "", &[]);
        assert_eq!(g.status, "needs_info");
        assert_eq!(
            g.missing_facts,
            [
                "No supporting evidence was provided.",
                "No key facts were extracted yet.",
                "Constraints or environment are unclear.",
            ]
        );
        assert_eq!(g.follow_ups.len(), 2);
    }

    #[test]
    fn grounded_plain_question_is_ok() {
        let g = check("Describe the project", "some evidence", &["fact".into()]);
        assert_eq!(g.status, "ok");
        assert!(g.is_empty());
    }

    #[test]
    fn skipped_default() {
        assert_eq!(EvidenceGap::default().status, "skipped");
    }
}
