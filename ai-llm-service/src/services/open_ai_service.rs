//! OpenAI-compatible chat client for text generation.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1/chat/completions : single-shot completion
//! - POST {endpoint}/v1/chat/completions with `stream=true` : SSE delta stream
//!
//! Constructor validation:
//! - `cfg.provider` must be `LlmProvider::OpenAI`
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//!
//! Errors are normalized via unified error types in `error_handler`.

use std::time::Instant;

use futures::StreamExt;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, HttpError, ProviderError, ProviderErrorKind, Result, is_http_url, make_snippet,
    },
    services::delta_stream::{DeltaStream, LineBuffer, LineEvent},
};

/// Thin client for an OpenAI-compatible API.
///
/// Constructed from a complete [`LlmModelConfig`]. Internally keeps a
/// preconfigured `reqwest::Client` (with timeout and default headers).
#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `InvalidProvider` if `cfg.provider` is not OpenAI
    /// - [`AiLlmError::Provider`] with `MissingApiKey` if `cfg.api_key` is `None`
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        // 1) Provider must be OpenAI-compatible.
        if cfg.provider != LlmProvider::OpenAI {
            return Err(
                ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::InvalidProvider).into(),
            );
        }

        // 2) API key must be present.
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::MissingApiKey)
        })?;

        // 3) Endpoint must use http/https.
        if !is_http_url(&cfg.endpoint) {
            return Err(ProviderError::new(
                LlmProvider::OpenAI,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        // 4) HTTP client: timeout + default headers.
        let client = build_client(&cfg, &api_key)?;
        let url_chat = format!("{}/v1/chat/completions", cfg.base_url());

        info!(
            provider = %cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = cfg.timeout().as_secs(),
            "OpenAiService initialized"
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

    /// Performs a **non-streaming** chat completion request.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    /// - [`AiLlmError::Provider`] with `EmptyChoices` if no choices are returned
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, system, user, false);

        debug!(
            prompt_len = user.len(),
            has_system = !system.is_empty(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(resp, &self.url_chat, &self.cfg, started).await?;

        let out: ChatCompletionResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    error = %e,
                    latency_ms = started.elapsed().as_millis(),
                    "failed to decode /v1/chat/completions response"
                );
                return Err(ProviderError::new(
                    LlmProvider::OpenAI,
                    ProviderErrorKind::Decode(format!(
                        "serde error: {e}; expected `choices[0].message.content`"
                    )),
                )
                .into());
            }
        };

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::EmptyChoices)
            })?;

        info!(
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );

        Ok(content)
    }

    /// Starts a **streaming** chat completion and returns its deltas.
    ///
    /// Server-sent events are read line by line; `data: [DONE]` ends the stream.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn chat_stream(&self, system: &str, user: &str) -> Result<DeltaStream> {
        let started = Instant::now();
        let body = ChatCompletionRequest::from_cfg(&self.cfg, system, user, true);

        debug!(prompt_len = user.len(), "POST {} (stream)", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(resp, &self.url_chat, &self.cfg, started).await?;

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
                    match parse_sse_line(&line) {
                        Ok(LineEvent::Delta(d)) => {
                            if tx.send(Ok(d)).await.is_err() {
                                debug!("delta receiver dropped, stopping SSE stream");
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
                if let Ok(LineEvent::Delta(d)) = parse_sse_line(&tail) {
                    let _ = tx.send(Ok(d)).await;
                }
            }
        });

        Ok(stream)
    }
}

/// Builds a client with bearer auth, JSON content type and the config timeout.
pub(crate) fn build_client(cfg: &LlmModelConfig, api_key: &str) -> Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
            ProviderError::new(
                LlmProvider::OpenAI,
                ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
            )
        })?,
    );
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    Ok(reqwest::Client::builder()
        .timeout(cfg.timeout())
        .default_headers(headers)
        .build()?)
}

/// Maps non-2xx responses to `HttpStatus` with a short body snippet.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    url: &str,
    cfg: &LlmModelConfig,
    started: Instant,
) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet = make_snippet(&text);

    error!(
        %status,
        %url,
        %snippet,
        model = %cfg.model,
        endpoint = %cfg.endpoint,
        latency_ms = started.elapsed().as_millis(),
        "OpenAI-compatible endpoint returned non-success status"
    );

    Err(ProviderError::new(
        LlmProvider::OpenAI,
        ProviderErrorKind::HttpStatus(HttpError {
            status,
            url: url.to_string(),
            snippet,
        }),
    )
    .into())
}

/// Decodes one SSE line of a streamed chat completion.
pub(crate) fn parse_sse_line(line: &str) -> Result<LineEvent> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Comments (`: keep-alive`), `event:` lines and blank separators.
        return Ok(LineEvent::Skip);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(LineEvent::Skip);
    }
    if data == "[DONE]" {
        return Ok(LineEvent::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(
            LlmProvider::OpenAI,
            ProviderErrorKind::Decode(format!("bad SSE chunk: {e}")),
        )
    })?;

    if let Some(err) = chunk.error {
        return Err(
            ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::Stream(err.message)).into(),
        );
    }

    let delta: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();
    if delta.is_empty() {
        Ok(LineEvent::Skip)
    } else {
        Ok(LineEvent::Delta(delta))
    }
}

/* ===========================================================================
HTTP payloads & options
======================================================================== */

/// Minimal request body for `/v1/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
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

        Self {
            model: &cfg.model,
            messages,
            stream,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

/// Chat message for the OpenAI API.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    /// One of: "system" | "user" | "assistant".
    role: &'a str,
    content: &'a str,
}

/// Minimal response for `/v1/chat/completions`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub(crate) choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub(crate) message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessageOut {
    pub(crate) content: Option<String>,
}

/// One streamed SSE `data:` payload.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    fn cfg(endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "deepseek-chat".into(),
            endpoint: endpoint.into(),
            api_key: Some("sk-test".into()),
            max_tokens: None,
            temperature: Some(0.2),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn sse_lines_decode() {
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), LineEvent::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), LineEvent::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            LineEvent::Delta("Hi".into())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            LineEvent::Skip
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let mut c = cfg("https://api.example.com");
        c.api_key = None;
        let err = OpenAiService::new(c).unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }

    #[tokio::test]
    async fn chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "pong" } }]
            })))
            .mount(&server)
            .await;

        let svc = OpenAiService::new(cfg(&server.uri())).unwrap();
        assert_eq!(svc.chat("sys", "ping").await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn stream_decodes_sse_body() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let svc = OpenAiService::new(cfg(&server.uri())).unwrap();
        let stream = svc.chat_stream("sys", "hi").await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Hello");
    }
}
