//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route patterns, ids and target services
//! - Validate value ranges (thresholds, capacities, timeouts)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, at startup and on reload

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{
    CircuitBreakerConfig, GatewayConfig, RateLimitConfig, RegistryKind,
};
use crate::registry::ServiceInstance;
use crate::resilience::retries::MAX_ATTEMPTS;
use crate::routing::PathPattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("route #{index} has an empty id")]
    EmptyRouteId { index: usize },

    #[error("route id '{0}' is declared more than once")]
    DuplicateRouteId(String),

    #[error("route '{route}': {reason}")]
    InvalidPattern { route: String, reason: String },

    #[error("route '{0}' has no target service")]
    MissingService(String),

    #[error("{scope}: {reason}")]
    OutOfRange { scope: String, reason: String },

    #[error("registry: {0}")]
    Registry(String),
}

fn out_of_range(scope: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::OutOfRange {
        scope: scope.into(),
        reason: reason.into(),
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    check_rate_limit("rate_limit", &config.rate_limit, &mut errors);
    check_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);

    // Worst case for one request: every attempt runs to its timeout, plus
    // the backoff before the retry. It must fit inside the request deadline.
    let (attempts, backoff_ms) = if config.retries.enabled {
        (u64::from(MAX_ATTEMPTS), config.retries.max_delay_ms)
    } else {
        (1, 0)
    };
    let deadline_ms = config.timeouts.request_secs.saturating_mul(1_000);

    let mut seen = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }

        if let Err(e) = PathPattern::parse(&route.path) {
            errors.push(ValidationError::InvalidPattern {
                route: route.id.clone(),
                reason: e.to_string(),
            });
        }

        if route.service.trim().is_empty() {
            errors.push(ValidationError::MissingService(route.id.clone()));
        }

        if route.timeout_ms == Some(0) {
            errors.push(out_of_range(
                format!("route '{}'", route.id),
                "timeout_ms must be positive",
            ));
        }

        let timeout_ms = route.timeout_ms.unwrap_or(config.timeouts.upstream_ms);
        let worst_ms = timeout_ms.saturating_mul(attempts).saturating_add(backoff_ms);
        if deadline_ms > 0 && worst_ms > deadline_ms {
            errors.push(out_of_range(
                format!("route '{}'", route.id),
                format!(
                    "{attempts} attempts of {timeout_ms} ms plus {backoff_ms} ms backoff exceed timeouts.request_secs ({deadline_ms} ms)"
                ),
            ));
        }

        if let Some(limit) = &route.rate_limit {
            check_rate_limit(&format!("route '{}' rate_limit", route.id), limit, &mut errors);
        }
        if let Some(breaker) = &route.circuit_breaker {
            check_breaker(&format!("route '{}' circuit_breaker", route.id), breaker, &mut errors);
        }
    }

    let registry = &config.registry;
    match registry.kind {
        RegistryKind::Http => {
            if url::Url::parse(&registry.url).is_err() {
                errors.push(ValidationError::Registry(format!("url '{}' is invalid", registry.url)));
            }
        }
        RegistryKind::Static => {
            for instance in &registry.instances {
                if instance.service.trim().is_empty() {
                    errors.push(ValidationError::Registry(format!(
                        "instance '{}' has no service",
                        instance.address
                    )));
                }
                if let Err(e) = ServiceInstance::parse_base_url(&instance.address) {
                    errors.push(ValidationError::Registry(e.to_string()));
                }
            }
        }
    }
    if registry.poll_interval_secs == 0 {
        errors.push(ValidationError::Registry("poll_interval_secs must be positive".into()));
    }
    if !(0.0..1.0).contains(&registry.poll_jitter) {
        errors.push(ValidationError::Registry("poll_jitter must be in [0, 1)".into()));
    }
    if registry.missed_heartbeats == 0 {
        errors.push(ValidationError::Registry("missed_heartbeats must be positive".into()));
    }
    if registry.default_lease_secs == 0 {
        errors.push(ValidationError::Registry("default_lease_secs must be positive".into()));
    }

    if config.timeouts.upstream_ms == 0 || config.timeouts.connect_ms == 0 || config.timeouts.request_secs == 0 {
        errors.push(out_of_range("timeouts", "all timeouts must be positive"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(out_of_range("retries", "base_delay_ms exceeds max_delay_ms"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(out_of_range("limits", "max_body_bytes must be positive"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(out_of_range(
            "observability",
            format!("metrics_address '{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rate_limit(scope: &str, limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if !limit.enabled {
        return;
    }
    if limit.capacity == 0 {
        errors.push(out_of_range(scope, "capacity must be at least 1"));
    }
    if !limit.refill_per_sec.is_finite() || limit.refill_per_sec <= 0.0 {
        errors.push(out_of_range(scope, "refill_per_sec must be a positive number"));
    }
    if limit.per_client && limit.client_idle_secs == 0 {
        errors.push(out_of_range(scope, "client_idle_secs must be positive"));
    }
}

fn check_breaker(scope: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if !breaker.enabled {
        return;
    }
    if !(breaker.failure_threshold > 0.0 && breaker.failure_threshold <= 1.0) {
        errors.push(out_of_range(scope, "failure_threshold must be in (0, 1]"));
    }
    if breaker.min_samples == 0 {
        errors.push(out_of_range(scope, "min_samples must be at least 1"));
    }
    if breaker.window_secs == 0 {
        errors.push(out_of_range(scope, "window_secs must be positive"));
    }
    if breaker.half_open_trial_count == 0 {
        errors.push(out_of_range(scope, "half_open_trial_count must be at least 1"));
    }
}
