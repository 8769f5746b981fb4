//! Gateway error taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Every way a request can fail to reach a backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No route matches {path}")]
    RouteNotFound { path: String },

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Circuit breaker open for route {route}")]
    BreakerOpen { route: String },

    #[error("No instance available for {service}")]
    NoInstanceAvailable { service: String },

    #[error("Upstream timed out")]
    BackendTimeout,

    #[error("Upstream connection failed")]
    BackendConnection,

    #[error("Upstream answered {0}")]
    BackendServerError(StatusCode),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BreakerOpen { .. }
            | GatewayError::NoInstanceAvailable { .. }
            | GatewayError::BackendTimeout
            | GatewayError::BackendConnection
            | GatewayError::BackendServerError(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::BreakerOpen { .. } => "breaker_open",
            GatewayError::NoInstanceAvailable { .. } => "no_instance",
            GatewayError::BackendTimeout => "timeout",
            GatewayError::BackendConnection => "connection_error",
            GatewayError::BackendServerError(_) => "server_error",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }

    /// Whether the client gets a fallback body rather than a plain error.
    pub fn is_fallback(&self) -> bool {
        !matches!(
            self,
            GatewayError::RouteNotFound { .. } | GatewayError::PayloadTooLarge { .. }
        )
    }
}
