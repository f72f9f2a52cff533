//! Lightweight Ollama chat client.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/chat` with `stream=false` : single-shot generation
//! - `POST {endpoint}/api/chat` with `stream=true`  : NDJSON delta stream
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures
//! that the selected provider is [`LlmProvider::Ollama`].
//!
//! # Examples
//!
//! ```no_run
//! use ai_llm_service::{LlmModelConfig, LlmProvider};
//! use ai_llm_service::services::ollama_service::OllamaService;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LlmModelConfig {
//!     provider: LlmProvider::Ollama,
//!     model: "qwen3:14b".into(),
//!     endpoint: "http://localhost:11434".into(),
//!     api_key: None,
//!     max_tokens: Some(256),
//!     temperature: Some(0.7),
//!     top_p: Some(0.9),
//!     timeout_secs: Some(30),
//! };
//!
//! let svc = OllamaService::new(cfg)?;
//! let text = svc.chat("You are terse.", "Write a haiku about Rust.").await?;
//! println!("Generated:\n{}", text);
//! # Ok(()) }
//! ```

use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, ProviderError, ProviderErrorKind, Result, is_http_url, make_snippet,
    },
    services::delta_stream::{DeltaStream, LineBuffer, LineEvent},
};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with
/// a configurable timeout.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not `Ollama`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(
                ProviderError::new(LlmProvider::Ollama, ProviderErrorKind::InvalidProvider).into(),
            );
        }
        if !is_http_url(&cfg.endpoint) {
            return Err(ProviderError::new(
                LlmProvider::Ollama,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .gzip(true)
            .brotli(true)
            .build()?;

        let url_chat = format!("{}/api/chat", cfg.base_url());

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = cfg.timeout().as_secs(),
            "OllamaService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Performs a **non-streaming** chat request.
    ///
    /// # Errors
    /// - `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client errors
    /// - `Decode` if response cannot be parsed
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let started = Instant::now();
        let body = ChatRequest::from_cfg(&self.cfg, system, user, false);

        debug!(prompt_len = user.len(), "POST {}", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = self.ensure_success(resp, started).await?;

        let out: ChatResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                LlmProvider::Ollama,
                ProviderErrorKind::Decode(format!(
                    "serde error: {e}; ensure `stream=false` is used"
                )),
            )
        })?;

        info!(
            latency_ms = started.elapsed().as_millis(),
            "ollama chat completed"
        );
        Ok(out.message.map(|m| m.content).unwrap_or_default())
    }

    /// Starts a **streaming** chat request and returns its deltas.
    ///
    /// The HTTP status is checked before returning; decoding errors that
    /// happen later are delivered as the stream's last item.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn chat_stream(&self, system: &str, user: &str) -> Result<DeltaStream> {
        let started = Instant::now();
        let body = ChatRequest::from_cfg(&self.cfg, system, user, true);

        debug!(prompt_len = user.len(), "POST {} (stream)", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = self.ensure_success(resp, started).await?;

        let (tx, stream) = DeltaStream::channel(64);
        tokio::spawn(async move {
            let mut body = resp.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(AiLlmError::from(e))).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    match parse_ndjson_line(&line) {
                        Ok(LineEvent::Delta(d)) => {
                            if tx.send(Ok(d)).await.is_err() {
                                debug!("delta receiver dropped, stopping ollama stream");
                                return;
                            }
                        }
                        Ok(LineEvent::Done) => return,
                        Ok(LineEvent::Skip) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            if let Some(tail) = lines.finish() {
                match parse_ndjson_line(&tail) {
                    Ok(LineEvent::Delta(d)) => {
                        let _ = tx.send(Ok(d)).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn ensure_success(
        &self,
        resp: reqwest::Response,
        started: Instant,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let url = self.url_chat.clone();
        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);

        error!(
            %status,
            %url,
            %snippet,
            latency_ms = started.elapsed().as_millis(),
            "Ollama /api/chat returned non-success status"
        );

        Err(ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url,
                snippet,
            }),
        )
        .into())
    }
}

/// Decodes one NDJSON line of `/api/chat` streaming output.
pub(crate) fn parse_ndjson_line(line: &str) -> Result<LineEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(LineEvent::Skip);
    }

    let chunk: ChatResponse = serde_json::from_str(line).map_err(|e| {
        ProviderError::new(
            LlmProvider::Ollama,
            ProviderErrorKind::Decode(format!("bad stream line: {e}")),
        )
    })?;

    if let Some(err) = chunk.error {
        warn!(error = %err, "ollama reported an error mid-stream");
        return Err(ProviderError::new(LlmProvider::Ollama, ProviderErrorKind::Stream(err)).into());
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    if !content.is_empty() {
        return Ok(LineEvent::Delta(content));
    }
    if chunk.done {
        return Ok(LineEvent::Done);
    }
    Ok(LineEvent::Skip)
}

/* ==========================
HTTP payloads & options
========================== */

/// Request body for `/api/chat`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

impl<'a> ChatRequest<'a> {
    /// Builds a request from config and the system/user pair.
    fn from_cfg(cfg: &'a LlmModelConfig, system: &'a str, user: &'a str, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        let options = ChatOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            messages,
            stream,
            options: Some(options),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body for `/api/chat` (also the shape of each streamed line).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessageOut>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn cfg(endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "qwen3:8b".into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn ndjson_lines_decode() {
        assert_eq!(
            parse_ndjson_line(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap(),
            LineEvent::Delta("Hi".into())
        );
        assert_eq!(
            parse_ndjson_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#)
                .unwrap(),
            LineEvent::Done
        );
        assert!(parse_ndjson_line(r#"{"error":"model not found"}"#).is_err());
    }

    #[test]
    fn rejects_wrong_provider() {
        let mut c = cfg("http://localhost:1");
        c.provider = LlmProvider::OpenAI;
        assert!(OllamaService::new(c).is_err());
    }

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n"
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let stream = svc.chat_stream("sys", "hi").await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn chat_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let svc = OllamaService::new(cfg(&server.uri())).unwrap();
        let err = svc.chat("sys", "hi").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
