//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for requests that lack one
//! - Derive the client key used by per-client rate limiting
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An inbound `X-Request-Id` is kept so traces join across hops

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header a caller may use to identify itself to the rate limiter.
pub static X_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Rate-limit key: `X-Client-Id` if present, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(&X_CLIENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_header_wins_over_peer() {
        let peer: SocketAddr = "10.1.2.3:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, Some(peer)).as_deref(), Some("10.1.2.3"));

        headers.insert(&X_CLIENT_ID, HeaderValue::from_static("mobile-app"));
        assert_eq!(client_key(&headers, Some(peer)).as_deref(), Some("mobile-app"));

        headers.insert(&X_CLIENT_ID, HeaderValue::from_static("  "));
        assert_eq!(client_key(&headers, None), None);
    }

    #[test]
    fn request_ids_are_uuids() {
        let request = Request::new(());
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
