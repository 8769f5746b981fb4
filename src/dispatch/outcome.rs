//! Classification of a single upstream attempt.

use std::time::Duration;

use axum::http::StatusCode;

use crate::dispatch::upstream::UpstreamError;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOutcome {
    Success,
    /// 4xx: the backend answered, so this is not a failure.
    ClientError,
    ServerError,
    Timeout,
    ConnectionError,
    NoInstance,
}

impl ProxyOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            ProxyOutcome::ServerError
        } else if status.is_client_error() {
            ProxyOutcome::ClientError
        } else {
            ProxyOutcome::Success
        }
    }

    pub fn from_error(error: &UpstreamError) -> Self {
        match error {
            UpstreamError::Timeout(_) => ProxyOutcome::Timeout,
            UpstreamError::Connect(_) | UpstreamError::Request(_) => ProxyOutcome::ConnectionError,
        }
    }

    /// Counts against the circuit breaker.
    pub fn is_failure(self) -> bool {
        !matches!(self, ProxyOutcome::Success | ProxyOutcome::ClientError)
    }

    pub fn label(self) -> &'static str {
        match self {
            ProxyOutcome::Success => "success",
            ProxyOutcome::ClientError => "client_error",
            ProxyOutcome::ServerError => "server_error",
            ProxyOutcome::Timeout => "timeout",
            ProxyOutcome::ConnectionError => "connection_error",
            ProxyOutcome::NoInstance => "no_instance",
        }
    }
}

/// Outcome of one dispatch attempt, consumed by the breaker and the logs.
#[derive(Debug, Clone)]
pub struct ProxyResult {
    pub outcome: ProxyOutcome,
    pub latency: Duration,
    /// `service/id` of the instance used, if one was picked.
    pub instance: Option<String>,
    /// Backend status when it answered.
    pub status: Option<StatusCode>,
}

impl ProxyResult {
    /// The error a failed attempt surfaces as.
    pub fn error(&self, service: &str) -> Option<GatewayError> {
        match self.outcome {
            ProxyOutcome::Success | ProxyOutcome::ClientError => None,
            ProxyOutcome::ServerError => Some(GatewayError::BackendServerError(
                self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            )),
            ProxyOutcome::Timeout => Some(GatewayError::BackendTimeout),
            ProxyOutcome::ConnectionError => Some(GatewayError::BackendConnection),
            ProxyOutcome::NoInstance => Some(GatewayError::NoInstanceAvailable {
                service: service.to_string(),
            }),
        }
    }
}
