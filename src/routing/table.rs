//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Candidates pre-sorted by prefix length, then declaration order, so the
//!   first hit of a linear scan is the longest prefix and the earliest
//!   declaration among equals
//! - Explicit NoMatch rather than silent default

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, LbPolicy, RateLimitConfig};
use crate::config::{validate_config, ConfigError};
use crate::routing::matcher::PathPattern;

/// A compiled route with its effective resilience policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub pattern: PathPattern,
    pub service: String,
    pub strip_prefix: bool,
    pub timeout: Duration,
    pub lb_policy: LbPolicy,
    /// Name shown to clients in fallback responses.
    pub display_name: String,
    pub fallback_message: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Position in the declared route list.
    pub order: usize,
}

impl Route {
    /// Path to forward upstream for a matched request path.
    pub fn upstream_path<'a>(&self, path: &'a str) -> &'a str {
        if self.strip_prefix {
            self.pattern.remainder(path)
        } else {
            path
        }
    }
}

/// Turn `auth-service` into `Auth Service`.
pub fn default_display_name(service: &str) -> String {
    service
        .split(['-', '_', '.'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The immutable routing table.
#[derive(Debug, Default)]
pub struct RoutingTable {
    /// Routes in declaration order.
    routes: Vec<Arc<Route>>,
    /// Indices into `routes`, most specific first.
    lookup: Vec<usize>,
}

impl RoutingTable {
    /// Compile the routing table from a configuration.
    ///
    /// The configuration is validated first; a table is never built from an
    /// ambiguous or malformed route list.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let mut routes = Vec::with_capacity(config.routes.len());
        for (order, route) in config.routes.iter().enumerate() {
            let pattern = PathPattern::parse(&route.path).map_err(|e| {
                ConfigError::Validation(vec![crate::config::ValidationError::InvalidPattern {
                    route: route.id.clone(),
                    reason: e.to_string(),
                }])
            })?;

            let timeout_ms = route.timeout_ms.unwrap_or(config.timeouts.upstream_ms);
            routes.push(Arc::new(Route {
                id: route.id.clone(),
                pattern,
                service: route.service.clone(),
                strip_prefix: route.strip_prefix,
                timeout: Duration::from_millis(timeout_ms),
                lb_policy: route.lb_policy.unwrap_or(config.load_balancer.policy),
                display_name: route
                    .display_name
                    .clone()
                    .unwrap_or_else(|| default_display_name(&route.service)),
                fallback_message: route.fallback_message.clone(),
                rate_limit: route.rate_limit.clone().unwrap_or_else(|| config.rate_limit.clone()),
                circuit_breaker: route
                    .circuit_breaker
                    .clone()
                    .unwrap_or_else(|| config.circuit_breaker.clone()),
                order,
            }));
        }

        Ok(Self::from_routes(routes))
    }

    fn from_routes(routes: Vec<Arc<Route>>) -> Self {
        let mut lookup: Vec<usize> = (0..routes.len()).collect();
        // Stable sort keeps declaration order among equal prefixes.
        lookup.sort_by(|&a, &b| {
            routes[b]
                .pattern
                .specificity()
                .cmp(&routes[a].pattern.specificity())
        });

        tracing::debug!(routes = routes.len(), "Routing table compiled");
        Self { routes, lookup }
    }

    /// Find the route for a request path.
    pub fn match_path(&self, path: &str) -> Option<Arc<Route>> {
        self.lookup
            .iter()
            .map(|&i| &self.routes[i])
            .find(|route| route.pattern.matches(path))
            .cloned()
    }

    /// Look up a route by id.
    pub fn get(&self, id: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.id == id).cloned()
    }

    /// Routes in declaration order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
