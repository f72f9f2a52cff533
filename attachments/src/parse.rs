//! Text extraction for document attachments (PDF, HTML).
//!
//! Both parsers are CPU-bound and synchronous; callers run them on the blocking pool.

use services::text::truncate_chars;

use crate::{
    errors::{AttachmentError, Result},
    mime,
};

/// Upper bound on extracted characters per document.
pub const MAX_EXTRACT_CHARS: usize = 10_000;

/// Extracts plain text from `bytes` according to `mime`, capped at [`MAX_EXTRACT_CHARS`].
pub fn extract_text(bytes: &[u8], mime: &str) -> Result<String> {
    let raw = if mime::is_pdf(mime) {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| AttachmentError::Parse(e.to_string()))?
    } else if mime::is_html(mime) {
        html2text::from_read(bytes, 120).map_err(|e| AttachmentError::Parse(e.to_string()))?
    } else if mime::is_plain_text(mime) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        return Err(AttachmentError::Unsupported(mime.to_string()));
    };

    let cleaned = raw
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(truncate_chars(&cleaned, MAX_EXTRACT_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_rendered_to_text() {
        let html = b"<html><body><h1>Release</h1><p>Version 2.4 ships Friday.</p></body></html>";
        let text = extract_text(html, "text/html").unwrap();
        assert!(text.contains("Release"));
        assert!(text.contains("Version 2.4 ships Friday."));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn unsupported_types_fail_with_their_kind() {
        let err = extract_text(b"PK\x03\x04", "application/zip").unwrap_err();
        assert_eq!(err.kind(), "Unsupported");
    }

    #[test]
    fn output_is_capped() {
        let long = "word ".repeat(5_000);
        let text = extract_text(long.as_bytes(), "text/plain").unwrap();
        assert_eq!(text.chars().count(), MAX_EXTRACT_CHARS);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn garbage_pdf_is_a_parse_error() {
        let err = extract_text(b"not a pdf", "application/pdf").unwrap_err();
        assert_eq!(err.kind(), "Parse");
    }
}
