//! Plain-text code search over a configured source root.
//!
//! The walk is synchronous (`walkdir`) and meant to run on the blocking pool.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

const MAX_DEPTH: usize = 6;
const MAX_SNIPPETS: usize = 4;
const MAX_FILE_BYTES: u64 = 512 * 1024;
const CONTEXT_BEFORE: usize = 80;
const CONTEXT_AFTER: usize = 200;
const SEARCH_EXT: &[&str] = &["rs", "md", "toml", "yml", "yaml"];
const MIN_KEYWORD_CHARS: usize = 4;
const STOPWORDS: &[&str] = &[
    "what", "where", "which", "when", "does", "with", "from", "that", "this", "there", "have", "about",
    "into", "code", "file", "files", "show", "find", "please",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CodeSearch {
    pub status: String,
    pub snippets: Vec<String>,
}

impl CodeSearch {
    fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            snippets: Vec::new(),
        }
    }
}

impl Default for CodeSearch {
    fn default() -> Self {
        Self::status("skipped")
    }
}

/// Up to four `path:\n<window>` snippets around the first match per file.
///
/// Needles are the whole query first, then its identifier-like keywords.
pub fn search(root: Option<&Path>, query: &str) -> CodeSearch {
    let Some(root) = root else {
        return CodeSearch::status("code_root_not_configured");
    };
    let query = query.trim();
    if query.is_empty() {
        return CodeSearch::status("empty_query");
    }
    if !root.is_dir() {
        return CodeSearch::status(format!("search_failed: {} is not a directory", root.display()));
    }

    let needles = needles(query);
    let mut snippets = Vec::new();
    for path in candidate_files(root) {
        if snippets.len() >= MAX_SNIPPETS {
            break;
        }
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        if let Some(snippet) = snippet_for(&path, &content, &needles) {
            snippets.push(snippet);
        }
    }
    debug!(root = %root.display(), hits = snippets.len(), "code search done");
    CodeSearch {
        status: "ok".into(),
        snippets,
    }
}

fn candidate_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.depth() > 0 && e.file_type().is_dir() && (name.starts_with('.') || name == "target"))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.metadata().map(|m| m.len() <= MAX_FILE_BYTES).unwrap_or(false))
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| SEARCH_EXT.contains(&ext))
        })
        .map(|e| e.into_path())
}

fn needles(query: &str) -> Vec<String> {
    let mut out = vec![query.to_lowercase()];
    for word in query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS && !STOPWORDS.contains(&w.as_str()))
    {
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

fn snippet_for(path: &Path, content: &str, needles: &[String]) -> Option<String> {
    let lower = content.to_lowercase();
    let byte_idx = needles.iter().find_map(|n| lower.find(n.as_str()))?;
    let idx = lower[..byte_idx].chars().count();

    let start = idx.saturating_sub(CONTEXT_BEFORE);
    let window: String = content
        .chars()
        .skip(start)
        .take(idx + CONTEXT_AFTER - start)
        .collect();
    Some(format!("{}:\n{}", path.display(), window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("code-search-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("src")).unwrap();
        dir
    }

    #[test]
    fn unconfigured_and_blank() {
        assert_eq!(search(None, "x").status, "code_root_not_configured");
        assert_eq!(search(Some(Path::new("/")), "  ").status, "empty_query");
        assert_eq!(CodeSearch::default().status, "skipped");
    }

    #[test]
    fn keyword_needle_finds_snippet_in_allowed_files() {
        let dir = scratch("kw");
        fs::write(dir.join("src/retry.rs"), "fn main() {}\npub struct RetryLoader;\n").unwrap();
        fs::write(dir.join("src/notes.txt"), "RetryLoader lives here too").unwrap();

        let out = search(Some(&dir), "Where is RetryLoader defined?");
        assert_eq!(out.status, "ok");
        assert_eq!(out.snippets.len(), 1);
        assert!(out.snippets[0].contains("retry.rs:\n"));
        assert!(out.snippets[0].contains("pub struct RetryLoader;"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn snippets_are_capped() {
        let dir = scratch("cap");
        for i in 0..6 {
            fs::write(dir.join(format!("src/m{i}.md")), "alpha beta").unwrap();
        }
        let out = search(Some(&dir), "alpha");
        assert_eq!(out.snippets.len(), MAX_SNIPPETS);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_root_is_a_failure_status() {
        let out = search(Some(Path::new("/definitely/not/here")), "alpha");
        assert!(out.status.starts_with("search_failed: "));
    }
}
