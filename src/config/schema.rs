//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Route order is significant: it breaks ties between equal-length prefixes.

use serde::{Deserialize, Serialize};

use crate::registry::HealthStatus;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered route definitions mapping path prefixes to logical services.
    pub routes: Vec<RouteConfig>,

    /// Service registry settings.
    pub registry: RegistryConfig,

    /// Rate limit applied to routes without an override.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker applied to routes without an override.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Load balancing policy applied to routes without an override.
    pub load_balancer: LoadBalancerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A single routing rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Route identifier for logging, metrics and breaker/limiter keys.
    pub id: String,

    /// Path pattern, e.g. `/api/auth/**` or `/api/auth`.
    pub path: String,

    /// Logical service name the route forwards to.
    pub service: String,

    /// Remove the matched prefix before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Upstream call timeout for this route, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Load balancing policy override.
    #[serde(default)]
    pub lb_policy: Option<LbPolicy>,

    /// Human-readable service name used in fallback responses.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Fallback message override.
    #[serde(default)]
    pub fallback_message: Option<String>,

    /// Rate limit override.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Circuit breaker override.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl RouteConfig {
    /// Create a route with every optional setting left to the global defaults.
    pub fn new(id: impl Into<String>, path: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            service: service.into(),
            strip_prefix: false,
            timeout_ms: None,
            lb_policy: None,
            display_name: None,
            fallback_message: None,
            rate_limit: None,
            circuit_breaker: None,
        }
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Bucket capacity (maximum burst).
    pub capacity: u32,

    /// Tokens added per second.
    pub refill_per_sec: f64,

    /// Keep one bucket per client instead of one per route.
    pub per_client: bool,

    /// Idle time after which a per-client bucket is evicted, in seconds.
    pub client_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            refill_per_sec: 50.0,
            per_client: false,
            client_idle_secs: 300,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable the breaker.
    pub enabled: bool,

    /// Failure ratio (0, 1] at which the breaker opens.
    pub failure_threshold: f64,

    /// Minimum results in the window before the ratio is evaluated.
    pub min_samples: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,

    /// Time spent OPEN before trial requests are admitted, in seconds.
    pub open_cooldown_secs: u64,

    /// Trial requests admitted while HALF_OPEN.
    pub half_open_trial_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 0.5,
            min_samples: 10,
            window_secs: 30,
            open_cooldown_secs: 30,
            half_open_trial_count: 5,
        }
    }
}

/// Instance selection policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    Random,
    LeastOutstanding,
}

/// Load balancer configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub policy: LbPolicy,
}

/// Where instances come from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    /// Instances listed in this file.
    #[default]
    Static,
    /// Instances polled from a registry over HTTP.
    Http,
}

/// Document format served by an HTTP registry.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryFormat {
    /// Flat JSON array of instance records.
    #[default]
    Json,
    /// Eureka `/apps` document.
    Eureka,
}

/// Service registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub kind: RegistryKind,

    /// Registry base URL (HTTP registries only).
    pub url: String,

    pub format: RegistryFormat,

    /// Poll interval in seconds.
    pub poll_interval_secs: u64,

    /// Fraction of the poll interval used as random jitter.
    pub poll_jitter: f64,

    /// Registry request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Consecutive missed heartbeats before an instance is considered DOWN.
    pub missed_heartbeats: u32,

    /// Lease interval assumed when the registry does not advertise one.
    pub default_lease_secs: u64,

    /// Refuse to route once the snapshot has been stale for this long.
    pub max_staleness_secs: Option<u64>,

    /// Instances for the static registry.
    pub instances: Vec<StaticInstanceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: RegistryKind::Static,
            url: "http://localhost:8761/eureka".to_string(),
            format: RegistryFormat::Json,
            poll_interval_secs: 10,
            poll_jitter: 0.2,
            request_timeout_secs: 5,
            missed_heartbeats: 3,
            default_lease_secs: 30,
            max_staleness_secs: None,
            instances: Vec::new(),
        }
    }
}

/// A statically declared service instance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StaticInstanceConfig {
    /// Logical service name.
    pub service: String,

    /// Instance id; defaults to the address.
    #[serde(default)]
    pub id: Option<String>,

    /// `host:port` or a base URL.
    pub address: String,

    #[serde(default = "default_static_status")]
    pub status: HealthStatus,
}

fn default_static_status() -> HealthStatus {
    HealthStatus::Up
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Default upstream call timeout in milliseconds.
    pub upstream_ms: u64,

    /// Deadline for the whole inbound request (including retries) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 1_000,
            upstream_ms: 5_000,
            request_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable the single retry against another instance.
    pub enabled: bool,

    /// Only retry idempotent methods.
    pub idempotent_only: bool,

    /// Base delay before the retry in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay before the retry in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idempotent_only: true,
            base_delay_ms: 25,
            max_delay_ms: 250,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
