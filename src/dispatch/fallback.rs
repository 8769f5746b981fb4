//! Degradation responses.
//!
//! Produced whenever the gateway refuses a request (limiter, breaker) or
//! cannot get an answer from the service. Bodies always have the shape
//! `{timestamp, status, error, service, message, suggestion}`.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde::Serialize;

use crate::error::GatewayError;
use crate::http::response::{json_response, reason, timestamp};
use crate::routing::{default_display_name, Route};

const SUGGESTION: &str = "Please check service health or try again in a few moments.";
const RATE_LIMIT_SUGGESTION: &str = "Reduce the request rate or retry after the indicated delay.";

#[derive(Debug, Serialize)]
pub struct FallbackBody {
    pub timestamp: String,
    pub status: u16,
    pub error: &'static str,
    pub service: String,
    pub message: String,
    pub suggestion: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResponder;

impl FallbackResponder {
    /// Fallback for a matched route.
    pub fn respond(&self, route: &Route, error: &GatewayError) -> Response<Body> {
        build(&route.display_name, route.fallback_message.as_deref(), error)
    }

    /// Fallback for a bare service name.
    pub fn respond_for(&self, service: &str, error: &GatewayError) -> Response<Body> {
        build(&default_display_name(service), None, error)
    }
}

fn build(display_name: &str, message: Option<&str>, error: &GatewayError) -> Response<Body> {
    let (status, message, suggestion, retry_after) = match error {
        GatewayError::RateLimited { .. } => {
            let secs = retry_after_secs(error);
            (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many requests to {display_name}. Please retry after {secs} second(s)."),
                RATE_LIMIT_SUGGESTION,
                Some(secs),
            )
        }
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            message.map(str::to_string).unwrap_or_else(|| {
                format!("{display_name} is temporarily unavailable. Please try again later.")
            }),
            SUGGESTION,
            None,
        ),
    };

    let mut response = json_response(
        status,
        &FallbackBody {
            timestamp: timestamp(),
            status: status.as_u16(),
            error: reason(status),
            service: display_name.to_string(),
            message,
            suggestion,
        },
    );
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

fn retry_after_secs(error: &GatewayError) -> u64 {
    match error {
        GatewayError::RateLimited { retry_after } => {
            crate::security::RateLimited { retry_after: *retry_after }.retry_after_secs()
        }
        _ => 0,
    }
}
