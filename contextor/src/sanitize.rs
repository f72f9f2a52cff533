//! Evidence redaction: emails, phone numbers and long opaque tokens.
//!
//! Passes run in a fixed order (email, phone, token). Placeholders contain no
//! digits, no `@` and are shorter than a token, so re-sanitizing is a no-op.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const EMAIL_PLACEHOLDER: &str = "<REDACTED_EMAIL>";
pub const PHONE_PLACEHOLDER: &str = "<REDACTED_PHONE>";
pub const TOKEN_PLACEHOLDER: &str = "<REDACTED_TOKEN>";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("email regex is valid")
});
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?[0-9]{1,3}[-\s]?)?([0-9]{3,4}[-\s]?)?[0-9]{6,12}").expect("phone regex is valid")
});
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9_-]{20,}\b").expect("token regex is valid"));

/// Redaction counts per category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeHits {
    pub email: usize,
    pub phone: usize,
    pub token: usize,
}

impl SanitizeHits {
    pub fn merge(self, other: SanitizeHits) -> SanitizeHits {
        SanitizeHits {
            email: self.email + other.email,
            phone: self.phone + other.phone,
            token: self.token + other.token,
        }
    }

    pub fn total(&self) -> usize {
        self.email + self.phone + self.token
    }
}

/// Redacts `text` and returns it with the per-category hit counts.
pub fn sanitize(text: &str) -> (String, SanitizeHits) {
    if text.trim().is_empty() {
        return (String::new(), SanitizeHits::default());
    }
    let (s, email) = replace_count(text, &EMAIL, EMAIL_PLACEHOLDER);
    let (s, phone) = replace_count(&s, &PHONE, PHONE_PLACEHOLDER);
    let (s, token) = replace_count(&s, &TOKEN, TOKEN_PLACEHOLDER);
    (s, SanitizeHits { email, phone, token })
}

fn replace_count(text: &str, re: &Regex, placeholder: &str) -> (String, usize) {
    let count = re.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (re.replace_all(text, placeholder).into_owned(), count)
}

/// KB context and file text after redaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SanitizedEvidence {
    pub context: String,
    pub file_text: String,
    pub hits: SanitizeHits,
}

impl SanitizedEvidence {
    pub fn from_sources(context: &str, file_text: &str) -> Self {
        let (context, a) = sanitize(context);
        let (file_text, b) = sanitize(file_text);
        Self {
            context,
            file_text,
            hits: a.merge(b),
        }
    }

    /// Context and file text joined by a newline, blank parts omitted.
    pub fn combined(&self) -> String {
        [self.context.as_str(), self.file_text.as_str()]
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.context.trim().is_empty() && self.file_text.trim().is_empty()
    }
}
