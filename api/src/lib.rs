use std::{env, sync::Arc};

mod core;
mod error_handler;
mod middleware_layer;
mod routes;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::signal;
use tracing::{info, warn};

pub use crate::error_handler::{AppError, AppResult};
use crate::{
    core::app_state::AppState,
    middleware_layer::json_extractor::json_error_mapper,
    routes::answer_route::{answer, answer_stream, answer_stream_plain, health},
};

/// Builds the answer engine from the environment and serves until Ctrl+C.
pub async fn start() -> AppResult<()> {
    let host_url = env::var("API_ADDRESS").map_err(|_| AppError::MissingEnv("API_ADDRESS"))?;
    let state = Arc::new(AppState::from_env()?);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %host_url, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/answer", post(answer))
        .route("/answer/stream", post(answer_stream))
        .route("/answer/stream/plain", post(answer_stream_plain))
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(state)
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ai_llm_service::{AiLlmError, BackendRegistry, BoxFuture, DeltaStream, GenerationBackend};
    use attachments::{AttachmentConfig, AttachmentError, DocumentUnderstanding, Understanding};
    use contextor::{
        AnswerEngine, ContextorConfig, EngineDeps, analytics::LogAnalyticsSink, memory::InMemoryMemory,
    };
    use rag_store::{KbBackend, RetrievalResult};
    use serde_json::{Value, json};

    use super::*;

    struct Echo;

    impl GenerationBackend for Echo {
        fn model(&self) -> &str {
            "echo"
        }

        fn call<'a>(&'a self, _system: &'a str, _user: &'a str) -> BoxFuture<'a, Result<String, AiLlmError>> {
            Box::pin(async { Ok("pong".to_string()) })
        }

        fn stream<'a>(&'a self, _system: &'a str, _user: &'a str) -> BoxFuture<'a, Result<DeltaStream, AiLlmError>> {
            Box::pin(async { Ok(DeltaStream::from_deltas(["po", "ng"])) })
        }
    }

    struct EmptyKb;

    impl KbBackend for EmptyKb {
        fn search<'a>(
            &'a self,
            query: &'a str,
            _top_k: usize,
            _min_score: f64,
        ) -> rag_store::BoxFuture<'a, rag_store::Result<RetrievalResult>> {
            Box::pin(async move { Ok(RetrievalResult::empty(query)) })
        }
    }

    struct NoFiles;

    impl DocumentUnderstanding for NoFiles {
        fn understand<'a>(
            &'a self,
            url: &'a str,
            _mime_hint: Option<&'a str>,
            _vision_model: Option<&'a str>,
        ) -> attachments::understanding::BoxFuture<'a, attachments::errors::Result<Understanding>> {
            Box::pin(async move { Err(AttachmentError::InvalidUrl(url.to_string())) })
        }
    }

    async fn serve() -> String {
        let backend: Arc<dyn GenerationBackend> = Arc::new(Echo);
        let registry = BackendRegistry::new(vec![("echo".to_string(), backend)], None).unwrap();
        let engine = AnswerEngine::new(
            EngineDeps {
                registry: Arc::new(registry),
                kb: Arc::new(EmptyKb),
                understanding: Arc::new(NoFiles),
                attachments: AttachmentConfig::default(),
                memory: Arc::new(InMemoryMemory::new(Duration::from_secs(60))),
                analytics: Arc::new(LogAnalyticsSink),
            },
            ContextorConfig::default(),
        );
        let app = router(Arc::new(AppState { engine }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn answer_and_health_routes() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let health: Value = client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
        assert_eq!(health, json!({"status": "ok"}));

        let res = client
            .post(format!("{base}/answer"))
            .json(&json!({"question": "ping?", "sessionId": "s1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["data"]["answer"], "pong");
        assert_eq!(body["data"]["documents"], json!([]));
    }

    #[tokio::test]
    async fn bad_requests_get_the_json_envelope() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let blank = client
            .post(format!("{base}/answer"))
            .json(&json!({"question": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(blank.status(), 400);
        let body: Value = blank.json().await.unwrap();
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");

        let malformed = client
            .post(format!("{base}/answer"))
            .json(&json!({"question": "q", "fileUrls": "x"}))
            .send()
            .await
            .unwrap();
        assert!(malformed.status().is_client_error());
        let body: Value = malformed.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["details"][0]["path"], "fileUrls");
    }

    #[tokio::test]
    async fn stream_routes_speak_sse() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let text = client
            .post(format!("{base}/answer/stream"))
            .json(&json!({"question": "ping?"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.starts_with("event: start\n"));
        assert!(text.contains("event: answer_final\ndata: {\"stage\":\"answer_final\",\"label\":\"Done\",\"payload\":\"pong\"}"));

        let plain = client
            .post(format!("{base}/answer/stream/plain"))
            .json(&json!({"question": "ping?"}))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(plain, "data: po\n\ndata: ng\n\n");
    }
}
