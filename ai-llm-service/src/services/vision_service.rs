//! Vision understanding over an OpenAI-compatible multimodal endpoint.
//!
//! Sends one user message made of an `image_url` part and a text instruction
//! to `POST {endpoint}/v1/chat/completions` and returns the raw reply text.
//! Callers decide how to interpret the reply (plain text or JSON).

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{ProviderError, ProviderErrorKind, Result, is_http_url},
    services::open_ai_service::{ChatCompletionResponse, build_client, ensure_success},
};

#[derive(Debug)]
pub struct VisionService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl VisionService {
    /// Creates the client; the API key is optional for self-hosted endpoints.
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if !is_http_url(&cfg.endpoint) {
            return Err(ProviderError::new(
                LlmProvider::OpenAI,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let client = match cfg.api_key.as_deref() {
            Some(key) => build_client(&cfg, key)?,
            None => reqwest::Client::builder().timeout(cfg.timeout()).build()?,
        };
        let url_chat = format!("{}/v1/chat/completions", cfg.base_url());

        info!(model = %cfg.model, endpoint = %cfg.endpoint, "VisionService initialized");
        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// Asks the vision model about the image at `image_url`.
    ///
    /// `model_override` replaces the configured model for this call only.
    #[instrument(skip_all, fields(model = %self.cfg.model, model_override))]
    pub async fn describe(
        &self,
        image_url: &str,
        instruction: &str,
        model_override: Option<&str>,
    ) -> Result<String> {
        let started = Instant::now();
        let model = model_override
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.cfg.model.as_str());

        let body = VisionRequest {
            model,
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
            messages: vec![VisionMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                    ContentPart::Text { text: instruction },
                ],
            }],
        };

        debug!(image_url, "POST {}", self.url_chat);
        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = ensure_success(resp, &self.url_chat, &self.cfg, started).await?;

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                LlmProvider::OpenAI,
                ProviderErrorKind::Decode(format!("vision response: {e}")),
            )
        })?;

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .unwrap_or_default();

        info!(
            latency_ms = started.elapsed().as_millis(),
            chars = content.chars().count(),
            "vision understanding completed"
        );
        Ok(content)
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    messages: Vec<VisionMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct VisionMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    #[tokio::test]
    async fn sends_image_part_and_uses_override_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "vl-max",
                "messages": [{ "role": "user", "content": [
                    { "type": "image_url", "image_url": { "url": "https://x.test/a.png" } }
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "a red stop sign" } }]
            })))
            .mount(&server)
            .await;

        let svc = VisionService::new(LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "vl-flash".into(),
            endpoint: server.uri(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(5),
        })
        .unwrap();

        let text = svc
            .describe("https://x.test/a.png", "describe", Some("vl-max"))
            .await
            .unwrap();
        assert_eq!(text, "a red stop sign");
    }
}
