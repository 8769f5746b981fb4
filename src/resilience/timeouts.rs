//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with the route's timeout
//! - Cancel the call cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other upstream errors

use std::future::Future;
use std::time::Duration;

use crate::dispatch::upstream::UpstreamError;

/// Run `call`, failing with `UpstreamError::Timeout` after `limit`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(limit)),
    }
}
