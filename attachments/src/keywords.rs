//! Local keyword and query extraction for attachments that skip the vision model.

use std::sync::LazyLock;

use regex::Regex;
use services::text::{clip_chars, uniq_limit};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Alphabetic}\p{Nd}]+").expect("token regex is valid"));

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "of", "in", "on", "for", "with", "by", "from", "is",
    "are", "was", "were", "be", "been", "this", "that", "these", "those", "it", "you", "your",
    "me", "my", "we", "our", "they", "their", "he", "she", "his", "her", "how", "what", "why",
    "when", "where", "which",
];

pub const MAX_LOCAL_KEYWORDS: usize = 8;
pub const MAX_LOCAL_QUERIES: usize = 3;

/// Lowercased tokens (≥2 chars, no stopwords), in first-seen order.
pub fn keywords(text: &str, limit: usize) -> Vec<String> {
    let tokens = TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(&t.as_str()));
    uniq_limit(tokens, limit)
}

/// Leading lines with at least three words, clipped to 80 chars, usable as search queries.
pub fn queries(text: &str, limit: usize) -> Vec<String> {
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|l| l.split_whitespace().count() >= 3)
        .map(|l| clip_chars(l, 80));
    uniq_limit(lines, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_skip_stopwords_and_duplicates() {
        let kws = keywords("The Retry policy is the retry budget for 2 services", 8);
        assert_eq!(kws, ["retry", "policy", "budget", "services"]);
    }

    #[test]
    fn keywords_keep_cjk_runs() {
        let kws = keywords("重试 策略", 8);
        assert_eq!(kws, ["重试", "策略"]);
    }

    #[test]
    fn queries_use_leading_multiword_lines() {
        let q = queries("Title\nRetry policy for payments\n\nBackoff doubles each attempt\nx", 3);
        assert_eq!(q, ["Retry policy for payments", "Backoff doubles each attempt"]);
    }
}
