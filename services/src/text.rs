//! Character-budget helpers.
//!
//! All lengths are counted in `char`s, never bytes, so multi-byte text
//! (CJK, emoji) is cut on a character boundary.

/// Appended to any text that was cut to fit a budget.
pub const TRUNCATION_MARKER: &str = "...";

/// Cuts `s` so that the result has at most `max_chars` characters.
///
/// When the input is longer than the budget the result ends with
/// [`TRUNCATION_MARKER`] and its total length is exactly `max_chars`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return s.chars().take(max_chars).collect();
    }

    let mut out: String = s.chars().take(max_chars - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Plain prefix cut without marker (used for term normalization).
pub fn clip_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Collapses every whitespace run into a single space and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed, non-blank, de-duplicated (first occurrence wins) items, at most `limit`.
pub fn uniq_limit<I, S>(items: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if out.len() >= limit {
            break;
        }
        let t = item.as_ref().trim();
        if t.is_empty() || out.iter().any(|x| x == t) {
            continue;
        }
        out.push(t.to_string());
    }
    out
}

/// Compact error text for user-facing tags: single line, bounded length.
pub fn error_summary(msg: &str, max_chars: usize) -> String {
    truncate_chars(&collapse_whitespace(msg), max_chars)
}
