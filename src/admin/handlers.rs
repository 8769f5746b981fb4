use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::config::{LbPolicy, RateLimitConfig};
use crate::http::server::AppState;
use crate::observability::RouteCounts;
use crate::registry::RegistryStatus;
use crate::resilience::{BreakerMode, BreakerSnapshot};

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub routes: usize,
    pub registry: RegistryStatus,
}

#[derive(Serialize)]
pub struct RouteView {
    pub id: String,
    pub path: String,
    pub service: String,
    pub display_name: String,
    pub strip_prefix: bool,
    pub timeout_ms: u64,
    pub lb_policy: LbPolicy,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: BreakerSnapshot,
    pub healthy_instances: usize,
}

#[derive(Serialize)]
pub struct RouteMetrics {
    #[serde(flatten)]
    pub counts: RouteCounts,
    pub breaker_state: BreakerMode,
}

#[derive(Serialize)]
pub struct MetricsReport {
    pub routes: BTreeMap<String, RouteMetrics>,
    pub unrouted: u64,
    pub rate_limit_buckets: usize,
    pub registry: RegistryStatus,
}

/// Ready once a routing table is loaded and the registry has synced.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let routes = state.dispatcher.routes().len();
    let registry = state.dispatcher.registry().status();
    let ready = routes > 0 && registry.synced;

    let report = HealthReport {
        status: if ready { "UP" } else { "DOWN" },
        version: env!("CARGO_PKG_VERSION"),
        routes,
        registry,
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

pub async fn routes(State(state): State<AppState>) -> Json<Vec<RouteView>> {
    let dispatcher = &state.dispatcher;
    let table = dispatcher.routes();

    let views = table
        .routes()
        .iter()
        .map(|route| RouteView {
            id: route.id.clone(),
            path: route.pattern.raw().to_string(),
            service: route.service.clone(),
            display_name: route.display_name.clone(),
            strip_prefix: route.strip_prefix,
            timeout_ms: route.timeout.as_millis() as u64,
            lb_policy: route.lb_policy,
            rate_limit: route.rate_limit.clone(),
            circuit_breaker: dispatcher.breakers().breaker_for(route).snapshot(),
            healthy_instances: dispatcher.registry().resolve(&route.service).instances.len(),
        })
        .collect();

    Json(views)
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsReport> {
    let dispatcher = &state.dispatcher;
    let table = dispatcher.routes();

    let routes = table
        .routes()
        .iter()
        .map(|route| {
            let breaker_state = dispatcher.breakers().breaker_for(route).mode();
            (
                route.id.clone(),
                RouteMetrics {
                    counts: dispatcher.stats().counts(&route.id),
                    breaker_state,
                },
            )
        })
        .collect();

    Json(MetricsReport {
        routes,
        unrouted: dispatcher.stats().unrouted_count(),
        rate_limit_buckets: dispatcher.limiter().len(),
        registry: dispatcher.registry().status(),
    })
}
