//! Media type helpers: normalization, extension guessing and dispatch classes.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Lowercased type without parameters; `application/octet-stream` when blank.
pub fn normalize(mime: Option<&str>) -> String {
    let m = mime.unwrap_or("").trim().to_ascii_lowercase();
    let m = m.split(';').next().unwrap_or("").trim().to_string();
    if m.is_empty() { OCTET_STREAM.to_string() } else { m }
}

/// Guesses a media type from the URL path extension.
pub fn guess_from_url(url: &str) -> &'static str {
    let name = filename_from_url(url).to_ascii_lowercase();
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        _ => OCTET_STREAM,
    }
}

/// Declared type when it is informative, else the guess from the URL.
pub fn resolve(declared: Option<&str>, url: &str) -> String {
    let d = normalize(declared);
    if d == OCTET_STREAM { guess_from_url(url).to_string() } else { d }
}

/// Last non-empty path segment, or `file`.
pub fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

pub fn is_plain_text(mime: &str) -> bool {
    (mime.starts_with("text/") && !is_html(mime))
        || mime == "application/json"
        || mime == "application/xml"
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

pub fn is_html(mime: &str) -> bool {
    mime == "text/html" || mime == "application/xhtml+xml"
}

pub fn is_pdf(mime: &str) -> bool {
    mime == "application/pdf"
}
