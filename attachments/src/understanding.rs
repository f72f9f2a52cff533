//! Document understanding: turns one attachment URL into text, keywords and queries.
//!
//! Dispatch by resolved media type:
//! - images: vision model reads the URL directly (no download)
//! - plain text (`text/*`, json, xml, `+json`, `+xml`): decoded as UTF-8
//! - everything else: downloaded and passed to the document parser

use std::{future::Future, pin::Pin, sync::Arc};

use ai_llm_service::VisionService;
use serde::Deserialize;
use services::text::{truncate_chars, uniq_limit};
use tracing::{debug, instrument};

use crate::{
    download::Downloader,
    errors::{AttachmentError, Result},
    keywords, mime, parse,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const VISION_INSTRUCTION: &str = "Extract readable text from the image. If no text, describe key objects briefly. Plain text only.\n\
Also extract 3-8 concise keywords and up to 3 short search queries. \
Respond with JSON only: {\"text\":\"...\",\"keywords\":[\"k1\",...],\"queries\":[\"q1\",...]}.";

/// What was understood from one attachment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Understanding {
    pub text: String,
    pub keywords: Vec<String>,
    pub queries: Vec<String>,
    pub mime: String,
}

/// Seam between the batch extractor and whatever reads files.
pub trait DocumentUnderstanding: Send + Sync {
    /// `mime_hint` overrides the type guessed from the URL; `vision_model`
    /// overrides the configured vision model for this call.
    fn understand<'a>(
        &'a self,
        url: &'a str,
        mime_hint: Option<&'a str>,
        vision_model: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Understanding>>;
}

/// Downloads over HTTP and reads images through the vision backend.
pub struct RemoteUnderstanding {
    downloader: Downloader,
    vision: Option<Arc<VisionService>>,
}

impl RemoteUnderstanding {
    pub fn new(downloader: Downloader, vision: Option<Arc<VisionService>>) -> Self {
        Self { downloader, vision }
    }

    #[instrument(skip_all, fields(url))]
    async fn run(&self, url: &str, mime_hint: Option<&str>, vision_model: Option<&str>) -> Result<Understanding> {
        self.downloader.validate_url(url)?;

        let guessed = mime::resolve(mime_hint, url);
        if mime::is_image(&guessed) {
            return self.understand_image(url, &guessed, vision_model).await;
        }

        let file = self.downloader.download(url).await?;
        let mime = match mime_hint {
            Some(h) if !h.trim().is_empty() => mime::normalize(Some(h)),
            _ => file.mime.clone(),
        };
        debug!(mime = %mime, bytes = file.bytes.len(), "dispatching attachment");

        if mime::is_image(&mime) {
            return self.understand_image(url, &mime, vision_model).await;
        }

        let text = if mime::is_plain_text(&mime) {
            truncate_chars(&String::from_utf8_lossy(&file.bytes), parse::MAX_EXTRACT_CHARS)
        } else {
            let bytes = file.bytes;
            let m = mime.clone();
            tokio::task::spawn_blocking(move || parse::extract_text(&bytes, &m))
                .await
                .map_err(|e| AttachmentError::Parse(format!("parser task failed: {e}")))??
        };

        Ok(Understanding {
            keywords: keywords::keywords(&text, keywords::MAX_LOCAL_KEYWORDS),
            queries: keywords::queries(&text, keywords::MAX_LOCAL_QUERIES),
            text: text.trim().to_string(),
            mime,
        })
    }

    async fn understand_image(&self, url: &str, mime: &str, vision_model: Option<&str>) -> Result<Understanding> {
        let vision = self
            .vision
            .as_ref()
            .ok_or_else(|| AttachmentError::Unsupported(format!("{mime} (no vision backend configured)")))?;

        let reply = vision.describe(url, VISION_INSTRUCTION, vision_model).await?;
        let mut out = parse_vision_reply(&reply);
        out.mime = mime.to_string();
        Ok(out)
    }
}

impl DocumentUnderstanding for RemoteUnderstanding {
    fn understand<'a>(
        &'a self,
        url: &'a str,
        mime_hint: Option<&'a str>,
        vision_model: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Understanding>> {
        Box::pin(self.run(url, mime_hint, vision_model))
    }
}

#[derive(Deserialize, Default)]
struct VisionJson {
    #[serde(default)]
    text: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    queries: Vec<String>,
}

/// Reads the vision reply as JSON (first `{` to last `}`); plain replies fall back
/// to the raw text with locally extracted keywords.
pub fn parse_vision_reply(reply: &str) -> Understanding {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(s), Some(e)) if e > s => serde_json::from_str::<VisionJson>(&reply[s..=e]).ok(),
        _ => None,
    };

    match json {
        Some(v) => Understanding {
            text: v.text.trim().to_string(),
            keywords: uniq_limit(&v.keywords, 30),
            queries: uniq_limit(&v.queries, 30),
            mime: String::new(),
        },
        None => Understanding {
            text: reply.trim().to_string(),
            keywords: keywords::keywords(reply, keywords::MAX_LOCAL_KEYWORDS),
            queries: Vec::new(),
            mime: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_llm_service::{LlmModelConfig, LlmProvider};
    use std::time::Duration;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn understanding(vision: Option<Arc<VisionService>>) -> RemoteUnderstanding {
        let dl = Downloader::new(Duration::from_secs(5), 1024 * 1024, true).unwrap();
        RemoteUnderstanding::new(dl, vision)
    }

    #[test]
    fn vision_reply_json_and_fallback() {
        let u = parse_vision_reply(
            "```json\n{\"text\":\"INVOICE 42\",\"keywords\":[\"invoice\",\"invoice\",\"total\"],\"queries\":[\"invoice 42 total\"]}\n```",
        );
        assert_eq!(u.text, "INVOICE 42");
        assert_eq!(u.keywords, ["invoice", "total"]);
        assert_eq!(u.queries, ["invoice 42 total"]);

        let plain = parse_vision_reply("A whiteboard with a deployment diagram");
        assert_eq!(plain.text, "A whiteboard with a deployment diagram");
        assert_eq!(plain.keywords, ["whiteboard", "deployment", "diagram"]);
        assert!(plain.queries.is_empty());
    }

    #[tokio::test]
    async fn plain_text_fast_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes.md"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "Deploy checklist for staging\nRun migrations first",
                    "text/markdown",
                ),
            )
            .mount(&server)
            .await;

        let u = understanding(None)
            .understand(&format!("{}/notes.md", server.uri()), None, None)
            .await
            .unwrap();
        assert_eq!(u.mime, "text/markdown");
        assert!(u.text.starts_with("Deploy checklist"));
        assert!(u.keywords.contains(&"staging".to_string()));
        assert_eq!(u.queries[0], "Deploy checklist for staging");
    }

    #[tokio::test]
    async fn image_without_vision_is_unsupported() {
        let err = understanding(None)
            .understand("https://cdn.test/shot.png", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Unsupported");
    }

    #[tokio::test]
    async fn image_goes_to_vision_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "{\"text\":\"STOP\",\"keywords\":[\"sign\"]}" } }]
            })))
            .mount(&server)
            .await;

        let vision = VisionService::new(LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "vl".into(),
            endpoint: server.uri(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(5),
        })
        .unwrap();

        let u = understanding(Some(Arc::new(vision)))
            .understand("https://cdn.test/sign.JPG", None, None)
            .await
            .unwrap();
        assert_eq!(u.text, "STOP");
        assert_eq!(u.keywords, ["sign"]);
        assert_eq!(u.mime, "image/jpeg");
    }
}
