//! Best-effort run summaries: one record per finished request.
//!
//! Sinks never fail the request; transport errors are logged and dropped.

use std::time::Duration;

use chrono::Utc;
use rag_store::{BoxFuture, RetrievalResult};
use serde::Serialize;
use sha2::{Digest, Sha256};
use services::text::truncate_chars;
use tracing::{info, warn};

use crate::error::Result;

const MAX_PROMPT_CHARS: usize = 6000;
const MAX_HITS: usize = 3;
const HIT_PREVIEW_CHARS: usize = 220;
const HTTP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHit {
    pub id: String,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub score: f64,
    pub preview: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// RFC3339 UTC.
    pub ts: String,
    pub session_id: String,
    pub model: String,
    pub top_k: usize,
    pub min_score: f64,
    pub out_of_scope: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub question: String,
    pub answer: String,
    pub prompt: String,
    pub prompt_sha256: String,
    pub top_score: Option<f64>,
    pub hits: Vec<RunHit>,
}

/// Inputs of one finished run.
pub struct RunRecord<'a> {
    pub session_id: &'a str,
    pub model: &'a str,
    pub top_k: usize,
    pub min_score: f64,
    pub no_evidence: bool,
    pub latency: Duration,
    pub error: Option<String>,
    pub question: &'a str,
    pub answer: &'a str,
    pub prompt: &'a str,
    pub retrieval: &'a RetrievalResult,
}

impl RunSummary {
    pub fn build(r: RunRecord<'_>) -> Self {
        let mut docs: Vec<_> = r.retrieval.documents.iter().collect();
        docs.sort_by(|a, b| b.score.total_cmp(&a.score));
        let hits = docs
            .into_iter()
            .take(MAX_HITS)
            .map(|d| RunHit {
                id: d.document.id.clone(),
                doc_type: d.document.doc_type.clone(),
                score: d.score,
                preview: truncate_chars(&d.document.content, HIT_PREVIEW_CHARS),
            })
            .collect();

        Self {
            ts: Utc::now().to_rfc3339(),
            session_id: r.session_id.to_string(),
            model: r.model.to_string(),
            top_k: r.top_k,
            min_score: r.min_score,
            out_of_scope: r.no_evidence,
            latency_ms: r.latency.as_millis() as u64,
            error: r.error,
            question: r.question.to_string(),
            answer: r.answer.to_string(),
            prompt: truncate_chars(r.prompt, MAX_PROMPT_CHARS),
            prompt_sha256: format!("{:x}", Sha256::digest(r.prompt.as_bytes())),
            top_score: r.retrieval.top_score(),
            hits,
        }
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn record<'a>(&'a self, summary: &'a RunSummary) -> BoxFuture<'a, ()>;
}

/// Posts summaries as JSON with a short timeout.
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAnalyticsSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, summary: &RunSummary) -> Result<()> {
        self.client
            .post(&self.url)
            .json(summary)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl AnalyticsSink for HttpAnalyticsSink {
    fn record<'a>(&'a self, summary: &'a RunSummary) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.post(summary).await {
                warn!(error = %e, session = %summary.session_id, "analytics write failed");
            }
        })
    }
}

/// Writes summaries to the log only.
pub struct LogAnalyticsSink;

impl AnalyticsSink for LogAnalyticsSink {
    fn record<'a>(&'a self, summary: &'a RunSummary) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(
                session = %summary.session_id,
                model = %summary.model,
                latency_ms = summary.latency_ms,
                out_of_scope = summary.out_of_scope,
                error = summary.error.as_deref().unwrap_or(""),
                prompt_sha256 = %summary.prompt_sha256,
                "run summary"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use rag_store::{KbDocument, ScoredDocument};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    use super::*;

    fn retrieval() -> RetrievalResult {
        let doc = |id: &str, score: f64| ScoredDocument {
            document: KbDocument {
                id: id.into(),
                doc_type: Some("note".into()),
                content: "y".repeat(500),
            },
            score,
        };
        RetrievalResult {
            question: "q".into(),
            documents: vec![doc("a", 0.2), doc("b", 0.9), doc("c", 0.5), doc("d", 0.1)],
            context: String::new(),
        }
    }

    fn summary(prompt: &str) -> RunSummary {
        let r = retrieval();
        RunSummary::build(RunRecord {
            session_id: "s1",
            model: "m",
            top_k: 3,
            min_score: 0.6,
            no_evidence: false,
            latency: Duration::from_millis(42),
            error: None,
            question: "q",
            answer: "a",
            prompt,
            retrieval: &r,
        })
    }

    #[test]
    fn summary_keeps_top_hits_and_bounded_prompt() {
        let s = summary(&"p".repeat(7000));
        let ids: Vec<&str> = s.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
        assert_eq!(s.hits[0].preview.chars().count(), HIT_PREVIEW_CHARS);
        assert_eq!(s.prompt.chars().count(), MAX_PROMPT_CHARS);
        assert_eq!(s.prompt_sha256.len(), 64);
        assert_eq!(s.top_score, Some(0.9));
        assert_eq!(s.latency_ms, 42);
    }

    #[test]
    fn hash_is_stable_for_the_same_prompt() {
        assert_eq!(summary("abc").prompt_sha256, summary("abc").prompt_sha256);
        assert_eq!(
            summary("abc").prompt_sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn http_sink_posts_camel_case_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .and(body_partial_json(serde_json::json!({"sessionId": "s1", "topK": 3})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpAnalyticsSink::new(format!("{}/runs", server.uri())).unwrap();
        sink.record(&summary("p")).await;
    }

    #[tokio::test]
    async fn http_sink_swallows_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let sink = HttpAnalyticsSink::new(server.uri()).unwrap();
        sink.record(&summary("p")).await;
        LogAnalyticsSink.record(&summary("p")).await;
    }
}
