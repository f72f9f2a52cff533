use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Request, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

/// Request fields a serde message may point at, checked in this order.
const REQUEST_FIELDS: [&str; 9] = [
    "fileUrls",
    "sessionId",
    "deepThinking",
    "scopeMode",
    "topK",
    "minScore",
    "visionModel",
    "model",
    "question",
];

async fn take_body(res: Response) -> (axum::http::response::Parts, Bytes) {
    let (parts, body) = res.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    (parts, bytes)
}

fn guess_path_from_serde_msg(msg: &str) -> Option<String> {
    REQUEST_FIELDS
        .iter()
        .find(|key| msg.contains(*key))
        .map(|key| key.to_string())
}

fn hint_for(msg: &str) -> Option<String> {
    if msg.contains("missing field `question`") {
        Some("`question` is required (e.g. {\"question\": \"...\"}).".into())
    } else if msg.contains("unknown variant") {
        Some("scopeMode must be PRIVACY_SAFE or YUQI_ONLY.".into())
    } else if msg.contains("expected a sequence") {
        Some("Expected an array for this field (e.g. [\"https://...\"]).".into())
    } else if msg.contains("expected a map") || msg.contains("expected struct") {
        Some("Expected a JSON object here (e.g. { \"field\": \"value\" }).".into())
    } else {
        None
    }
}

fn ensure_request_id(parts: &mut axum::http::response::Parts) -> String {
    if let Some(v) = parts.headers.get("X-Request-Id").and_then(|h| h.to_str().ok()) {
        if !v.trim().is_empty() {
            return v.to_string();
        }
    }
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let id = format!("req-{nanos}");
    if let Ok(value) = HeaderValue::from_str(&id) {
        parts.headers.insert("X-Request-Id", value);
    }
    id
}

fn is_json(parts: &axum::http::response::Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

/// Wraps plain-text extractor rejections (400/415/422) in the JSON envelope.
pub async fn json_error_mapper(req: Request<Body>, next: Next) -> Response {
    let res = next.run(req).await;
    let status = res.status();

    if !matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::UNSUPPORTED_MEDIA_TYPE
    ) {
        return res;
    }

    let (mut parts, bytes) = take_body(res).await;
    let request_id = ensure_request_id(&mut parts);
    if is_json(&parts) {
        return Response::from_parts(parts, bytes.into());
    }
    let original = String::from_utf8_lossy(&bytes);
    tracing::debug!(request_id = %request_id, status = status.as_u16(), "request rejected");

    let detail = ApiErrorDetail {
        path: guess_path_from_serde_msg(&original),
        hint: hint_for(&original),
    };
    let code = match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        _ => "UNPROCESSABLE_ENTITY",
    };
    let envelope = ApiResponse::<()>::error(code, original.trim(), vec![detail]);

    let body = match serde_json::to_vec(&envelope) {
        Ok(v) => v,
        Err(_) => bytes.to_vec(),
    };
    parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);

    Response::from_parts(parts, body.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_messages_point_at_request_fields() {
        let msg = "Failed to deserialize the JSON body into the target type: fileUrls: invalid type: string \"x\", expected a sequence at line 1 column 30";
        assert_eq!(guess_path_from_serde_msg(msg).as_deref(), Some("fileUrls"));
        assert!(hint_for(msg).unwrap().contains("array"));

        let missing = "Failed to deserialize the JSON body into the target type: missing field `question` at line 1 column 2";
        assert_eq!(guess_path_from_serde_msg(missing).as_deref(), Some("question"));
        assert!(hint_for(missing).unwrap().contains("required"));
        assert_eq!(guess_path_from_serde_msg("EOF while parsing"), None);
    }
}
