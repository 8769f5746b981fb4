//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request is retryable (idempotent methods only)
//! - Determine if an outcome is worth retrying
//! - Compute the jittered delay before the retry
//!
//! # Design Decisions
//! - At most one retry, always against a different instance
//! - Never retry POST/PATCH (non-idempotent)
//! - Jittered backoff prevents thundering herd
//! - Connection errors, timeouts and 5xx are retryable; 4xx never

use std::time::Duration;

use axum::http::Method;

use crate::config::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Upper bound on upstream attempts for one inbound request.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn is_idempotent(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
        )
    }

    /// Whether a failed attempt number `attempt` (1-based) may be retried.
    pub fn allows(&self, method: &Method, attempt: u32) -> bool {
        self.config.enabled
            && attempt < MAX_ATTEMPTS
            && (!self.config.idempotent_only || Self::is_idempotent(method))
    }

    /// Delay before attempt `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.config.base_delay_ms, self.config.max_delay_ms)
    }
}
