//! Condensed view of an extracted batch, shaped for retrieval and prompting.

use services::text::{clip_chars, truncate_chars, uniq_limit};

use crate::extractor::FileItem;

pub const MAX_RETRIEVAL_TERMS: usize = 6;
pub const MAX_PROGRESS_TERMS: usize = 8;
pub const MAX_FILE_CONTEXT_CHARS: usize = 3_500;
pub const FILE_EXCERPT_CHARS: usize = 900;
const MAX_TERM_CHARS: usize = 80;
const FILE_TEXT_CHARS: usize = 900;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInsights {
    /// Terms used to expand a weak KB query.
    pub retrieval_terms: Vec<String>,
    /// Terms shown to streaming clients.
    pub progress_terms: Vec<String>,
    /// `File (key info):` section for the prompt.
    pub prompt_context: String,
    pub prompt_excerpt: String,
    /// At least one file was extracted successfully with some content.
    pub has_content: bool,
}

impl FileInsights {
    pub fn from_items(files: &[FileItem]) -> Self {
        let prompt_context = build_file_context(files);
        Self {
            retrieval_terms: collect_terms(files, MAX_RETRIEVAL_TERMS),
            progress_terms: collect_terms(files, MAX_PROGRESS_TERMS),
            prompt_excerpt: truncate_chars(&prompt_context, FILE_EXCERPT_CHARS),
            prompt_context,
            has_content: files.iter().any(|f| {
                f.is_ok() && (!f.key_text.trim().is_empty() || !f.keywords.is_empty() || !f.queries.is_empty())
            }),
        }
    }
}

/// Per file: queries, then keywords; trimmed, clipped to 80 chars, de-duplicated in order.
pub fn collect_terms(files: &[FileItem], limit: usize) -> Vec<String> {
    let terms = files
        .iter()
        .flat_map(|f| f.queries.iter().chain(f.keywords.iter()))
        .map(|t| clip_chars(t.trim(), MAX_TERM_CHARS));
    uniq_limit(terms, limit)
}

fn build_file_context(files: &[FileItem]) -> String {
    if files.is_empty() {
        return String::new();
    }

    let mut sb = String::from("File (key info):\n");
    for f in files {
        let name = if f.name.trim().is_empty() { "file" } else { f.name.as_str() };
        let mime = if f.mime.trim().is_empty() {
            crate::mime::OCTET_STREAM
        } else {
            f.mime.as_str()
        };
        sb.push_str(&format!("- {name} ({mime})\n"));

        if !f.error.trim().is_empty() {
            sb.push_str(&format!("  error: {}\n\n", f.error));
            continue;
        }
        if !f.keywords.is_empty() {
            sb.push_str(&format!("  keywords: {}\n", uniq_limit(&f.keywords, 12).join(", ")));
        }
        if !f.queries.is_empty() {
            sb.push_str(&format!("  queries: {}\n", uniq_limit(&f.queries, 6).join(" | ")));
        }
        let text = f.key_text.trim();
        if !text.is_empty() {
            sb.push_str(&format!("  text: {}\n", truncate_chars(text, FILE_TEXT_CHARS)));
        }
        sb.push('\n');

        if sb.chars().count() >= MAX_FILE_CONTEXT_CHARS {
            break;
        }
    }
    truncate_chars(&sb, MAX_FILE_CONTEXT_CHARS)
}
