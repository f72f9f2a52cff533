//! POST /answer, /answer/stream, /answer/stream/plain and GET /health.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use contextor::{AnswerRequest, RagAnswer, ThinkingEvent};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Handler: POST /answer
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8080/answer \
///   -H 'content-type: application/json' \
///   -d '{"question":"Where does Yuqi work?","sessionId":"s1"}'
/// ```
pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswerRequest>,
) -> AppResult<Json<ApiResponse<RagAnswer>>> {
    let out = state.engine.answer(body).await?;
    debug!(docs = out.documents.len(), "answer ready");
    Ok(Json(ApiResponse::success(out)))
}

/// Handler: POST /answer/stream. One SSE event per thinking event, named by its stage.
pub async fn answer_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswerRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let events = state.engine.stream_events(body)?;
    Ok(Sse::new(events.map(|ev| to_sse(&ev))).keep_alive(KeepAlive::default()))
}

/// Handler: POST /answer/stream/plain. Answer text only; a failure ends with an `error` event.
pub async fn answer_stream_plain(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswerRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let deltas = state.engine.stream_plain(body)?;
    let stream = deltas.map(|chunk| {
        Ok(match chunk {
            Ok(text) => Event::default().data(text),
            Err(message) => Event::default().event("error").data(message),
        })
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(ev: &ThinkingEvent) -> Result<Event, axum::Error> {
    Event::default().event(ev.stage.as_str()).json_data(ev)
}
