//! Local key-fact extraction from sanitized evidence.

use std::sync::LazyLock;

use regex::Regex;
use services::text::uniq_limit;

/// Items kept for the prompt and the `key_info` event.
pub const MAX_KEY_INFO: usize = 6;

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|[0-9]{1,3}[.)])\s+(.+)$").expect("list marker regex is valid")
});
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[。.!?]\s*").expect("sentence regex is valid"));

/// List items (`-`, `*`, `•`, `1.`, `1)`) with the marker stripped; when the
/// evidence has none, its first sentences instead.
///
/// # Example
/// ```
/// use contextor::key_info::extract_key_info;
/// let items = extract_key_info("Intro\n- retries: 5\n2) backoff is linear", 6);
/// assert_eq!(items, ["retries: 5", "backoff is linear"]);
/// ```
pub fn extract_key_info(evidence: &str, limit: usize) -> Vec<String> {
    if evidence.trim().is_empty() || limit == 0 {
        return Vec::new();
    }

    let listed: Vec<&str> = evidence
        .lines()
        .filter_map(|line| LIST_MARKER.captures(line))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if !listed.is_empty() {
        return uniq_limit(listed, limit);
    }

    uniq_limit(SENTENCE_END.split(evidence), limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_items_win_over_prose() {
        let ev = "Release notes.\n* fast path\n• slow path\n- fast path\n10. cleanup";
        assert_eq!(extract_key_info(ev, 6), ["fast path", "slow path", "cleanup"]);
    }

    #[test]
    fn prose_falls_back_to_sentences() {
        let ev = "The job runs nightly. It retries 5 times! Owner is ops。Done?";
        assert_eq!(
            extract_key_info(ev, 3),
            ["The job runs nightly", "It retries 5 times", "Owner is ops"]
        );
    }

    #[test]
    fn empty_and_zero_limit() {
        assert!(extract_key_info("   ", 6).is_empty());
        assert!(extract_key_info("a. b.", 0).is_empty());
    }

    #[test]
    fn bounded_and_deterministic() {
        let ev: String = (0..20).map(|i| format!("- item {i}\n")).collect();
        let a = extract_key_info(&ev, MAX_KEY_INFO);
        assert_eq!(a.len(), MAX_KEY_INFO);
        assert_eq!(a, extract_key_info(&ev, MAX_KEY_INFO));
    }
}
