//! Numeric mismatch detection between KB context and file text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("number regex is valid"));

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    pub conflict: bool,
    pub issues: Vec<String>,
}

/// Reports the first KB number absent from the file numbers.
pub fn detect(kb_context: &str, file_text: &str) -> ConflictReport {
    if kb_context.trim().is_empty() || file_text.trim().is_empty() {
        return ConflictReport::default();
    }
    let file_numbers: Vec<&str> = NUMBER.find_iter(file_text).map(|m| m.as_str()).collect();
    let Some(first_file) = file_numbers.first() else {
        return ConflictReport::default();
    };

    let issues: Vec<String> = NUMBER
        .find_iter(kb_context)
        .map(|m| m.as_str())
        .find(|n| !file_numbers.contains(n))
        .map(|n| format!("Potential mismatch number: KB has {n} while file has {first_file}"))
        .into_iter()
        .collect();

    ConflictReport {
        conflict: !issues.is_empty(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_unmatched_kb_number_is_reported() {
        let r = detect("limit is 5 and 10 retries", "limit is 5, retries 3");
        assert!(r.conflict);
        assert_eq!(r.issues, ["Potential mismatch number: KB has 10 while file has 5"]);
    }

    #[test]
    fn agreement_or_missing_side_is_clean() {
        assert!(!detect("v 2.5", "version 2.5").conflict);
        assert!(!detect("", "42").conflict);
        assert!(!detect("42", "no digits here").conflict);
    }
}
