//! Response construction.
//!
//! # Responsibilities
//! - Build structured JSON error bodies for gateway-generated responses
//! - Never fail: a body that cannot be serialized falls back to a static one
//!
//! # Design Decisions
//! - Gateway-generated bodies never carry internal addresses or error chains
//! - Proxied responses are streamed through untouched apart from hop-by-hop
//!   header removal

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

const STATIC_BODY: &[u8] = br#"{"status":503,"error":"Service Unavailable"}"#;

/// Body of a gateway error that is not a fallback (404, 413).
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub timestamp: String,
    pub status: u16,
    pub error: &'a str,
    pub message: String,
    pub path: &'a str,
}

/// RFC 3339 timestamp for response bodies.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serialize `body` as the JSON payload of a `status` response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| STATIC_BODY.to_vec());
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Reason phrase for a status, as used in the `error` field.
pub fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_body_and_content_type() {
        let response = json_response(
            StatusCode::NOT_FOUND,
            &ErrorBody {
                timestamp: timestamp(),
                status: 404,
                error: reason(StatusCode::NOT_FOUND),
                message: "No route matches /nope".into(),
                path: "/nope",
            },
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["error"], "Not Found");
        assert_eq!(value["path"], "/nope");
    }
}
