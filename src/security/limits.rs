//! Request size limits.
//!
//! # Responsibilities
//! - Enforce maximum request body size while buffering
//!
//! # Design Decisions
//! - A declared Content-Length over the limit is rejected before reading
//! - Bodies are buffered so a retry can replay them

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderMap, CONTENT_LENGTH};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Buffer `body` fully, refusing anything over `limit` bytes.
pub async fn buffer_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(BodyError::TooLarge { limit });
    }

    // A body that fails to read (length overrun or client abort) is treated
    // as oversized; either way nothing is forwarded.
    axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| BodyError::TooLarge { limit })
}
