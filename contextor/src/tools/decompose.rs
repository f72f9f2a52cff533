use std::sync::LazyLock;

use regex::Regex;

static SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n;；。.!?？！]+").expect("decompose regex is valid"));

/// Sub-questions split on sentence punctuation and newlines, trimmed, blanks dropped.
pub fn decompose(question: &str) -> Vec<String> {
    SPLIT
        .split(question)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
