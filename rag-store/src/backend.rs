//! KB search backend: the trait seam plus an HTTP implementation.
//!
//! The HTTP backend posts `{query, topK, minScore}` to `{KB_URL}/search` and
//! expects a [`RetrievalResult`] JSON body. When the service omits `context`,
//! it is rebuilt from the documents as `[doc:ID] content` lines.

use std::{future::Future, pin::Pin, time::Instant};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    config::RagConfig,
    errors::{RagError, Result},
    record::{RetrievalResult, ScoredDocument},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A knowledge base that can answer similarity searches.
pub trait KbBackend: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
        min_score: f64,
    ) -> BoxFuture<'a, Result<RetrievalResult>>;
}

/// KB backend speaking JSON over HTTP.
pub struct HttpKbBackend {
    client: reqwest::Client,
    url_search: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    min_score: f64,
}

impl HttpKbBackend {
    /// Creates the client from a validated config.
    pub fn new(cfg: &RagConfig) -> Result<Self> {
        cfg.validate()?;
        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        let url_search = format!("{}/search", cfg.kb_url.trim_end_matches('/'));
        info!(url = %url_search, "HttpKbBackend initialized");
        Ok(Self { client, url_search })
    }

    #[instrument(skip_all, fields(top_k, min_score))]
    async fn post_search(&self, query: &str, top_k: usize, min_score: f64) -> Result<RetrievalResult> {
        let started = Instant::now();
        let resp = self
            .client
            .post(&self.url_search)
            .json(&SearchRequest {
                query,
                top_k,
                min_score,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::Status {
                status: status.as_u16(),
                url: self.url_search.clone(),
                snippet: body.split_whitespace().collect::<Vec<_>>().join(" ").chars().take(240).collect(),
            });
        }

        let bytes = resp.bytes().await?;
        let mut result: RetrievalResult = serde_json::from_slice(&bytes)?;
        if result.question.is_empty() {
            result.question = query.to_string();
        }
        if result.context.trim().is_empty() && !result.documents.is_empty() {
            result.context = render_context(&result.documents);
        }

        debug!(
            docs = result.documents.len(),
            top = ?result.top_score(),
            latency_ms = started.elapsed().as_millis(),
            "kb search done"
        );
        Ok(result)
    }
}

impl KbBackend for HttpKbBackend {
    fn search<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
        min_score: f64,
    ) -> BoxFuture<'a, Result<RetrievalResult>> {
        Box::pin(self.post_search(query, top_k, min_score))
    }
}

/// `[doc:ID] content` per document, newline separated.
pub fn render_context(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .map(|d| format!("[doc:{}] {}", d.document.id, d.document.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    #[tokio::test]
    async fn posts_camel_case_body_and_fills_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(serde_json::json!({
                "query": "retry policy", "topK": 3, "minScore": 0.6
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "documents": [
                    { "document": { "id": 12, "type": "note", "content": "Retries are capped at 5." }, "score": 0.82 }
                ]
            })))
            .mount(&server)
            .await;

        let kb = HttpKbBackend::new(&RagConfig::new_default(server.uri())).unwrap();
        let r = kb.search("retry policy", 3, 0.6).await.unwrap();
        assert_eq!(r.question, "retry policy");
        assert_eq!(r.documents.len(), 1);
        assert_eq!(r.context, "[doc:12] Retries are capped at 5.");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503).set_body_string("index   warming\nup"))
            .mount(&server)
            .await;

        let kb = HttpKbBackend::new(&RagConfig::new_default(server.uri())).unwrap();
        match kb.search("q", 3, 0.6).await {
            Err(RagError::Status { status, snippet, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(snippet, "index warming up");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
