use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::evidence_gap::{COMPARE, HOW, WHY};

static LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(list|examples|kinds|types|列出|例子|类别)").expect("list regex is valid")
});

/// Suggested answer shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerOutline {
    pub style: &'static str,
    pub sections: Vec<String>,
}

impl Default for AnswerOutline {
    fn default() -> Self {
        Self {
            style: "bullets",
            sections: Vec::new(),
        }
    }
}

/// First matching intent wins: compare, how, why, list, then a generic shape.
pub fn outline(question: &str, key_info: &[String]) -> AnswerOutline {
    let (style, sections): (&'static str, &[&str]) = if COMPARE.is_match(question) {
        (
            "bullets",
            &["Items being compared", "Comparison criteria", "Pros/cons or differences", "Recommendation"],
        )
    } else if HOW.is_match(question) {
        (
            "steps",
            &["Goal", "Prerequisites", "Step-by-step approach", "Validation/checks"],
        )
    } else if WHY.is_match(question) {
        ("bullets", &["Short answer", "Explanation", "Supporting evidence"])
    } else if LIST.is_match(question) {
        ("bullets", &["Overview", "Key items", "Notes or caveats"])
    } else {
        ("bullets", &["Answer", "Details", "Next steps"])
    };

    let mut out: Vec<String> = Vec::with_capacity(sections.len() + 1);
    if !key_info.is_empty() {
        out.push("Key facts".into());
    }
    out.extend(sections.iter().map(|s| s.to_string()));
    AnswerOutline { style, sections: out }
}
