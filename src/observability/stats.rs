//! In-process per-route counters behind `/actuator/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::dispatch::outcome::ProxyOutcome;

#[derive(Debug, Default)]
struct RouteCounters {
    requests: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    timeouts: AtomicU64,
    connection_errors: AtomicU64,
    no_instance: AtomicU64,
    rate_limited: AtomicU64,
    short_circuited: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
}

/// Serializable copy of one route's counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RouteCounts {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub no_instance: u64,
    pub rate_limited: u64,
    pub short_circuited: u64,
    pub retries: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Default)]
pub struct RouteStats {
    routes: DashMap<String, RouteCounters>,
    unrouted: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl RouteStats {
    fn with<F: FnOnce(&RouteCounters)>(&self, route: &str, f: F) {
        if let Some(counters) = self.routes.get(route) {
            f(&counters);
            return;
        }
        f(&self.routes.entry(route.to_string()).or_default());
    }

    pub fn request(&self, route: &str) {
        self.with(route, |c| bump(&c.requests));
    }

    pub fn unrouted(&self) {
        bump(&self.unrouted);
    }

    pub fn outcome(&self, route: &str, outcome: ProxyOutcome) {
        self.with(route, |c| {
            bump(match outcome {
                ProxyOutcome::Success => &c.success,
                ProxyOutcome::ClientError => &c.client_errors,
                ProxyOutcome::ServerError => &c.server_errors,
                ProxyOutcome::Timeout => &c.timeouts,
                ProxyOutcome::ConnectionError => &c.connection_errors,
                ProxyOutcome::NoInstance => &c.no_instance,
            })
        });
    }

    pub fn rate_limited(&self, route: &str) {
        self.with(route, |c| bump(&c.rate_limited));
    }

    pub fn short_circuited(&self, route: &str) {
        self.with(route, |c| bump(&c.short_circuited));
    }

    pub fn retry(&self, route: &str) {
        self.with(route, |c| bump(&c.retries));
    }

    pub fn fallback(&self, route: &str) {
        self.with(route, |c| bump(&c.fallbacks));
    }

    pub fn counts(&self, route: &str) -> RouteCounts {
        self.routes
            .get(route)
            .map(|c| {
                let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
                RouteCounts {
                    requests: load(&c.requests),
                    success: load(&c.success),
                    client_errors: load(&c.client_errors),
                    server_errors: load(&c.server_errors),
                    timeouts: load(&c.timeouts),
                    connection_errors: load(&c.connection_errors),
                    no_instance: load(&c.no_instance),
                    rate_limited: load(&c.rate_limited),
                    short_circuited: load(&c.short_circuited),
                    retries: load(&c.retries),
                    fallbacks: load(&c.fallbacks),
                }
            })
            .unwrap_or_default()
    }

    pub fn unrouted_count(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_route() {
        let stats = RouteStats::default();
        stats.request("auth");
        stats.request("auth");
        stats.outcome("auth", ProxyOutcome::Success);
        stats.outcome("auth", ProxyOutcome::Timeout);
        stats.rate_limited("users");
        stats.unrouted();

        let auth = stats.counts("auth");
        assert_eq!(auth.requests, 2);
        assert_eq!(auth.success, 1);
        assert_eq!(auth.timeouts, 1);
        assert_eq!(stats.counts("users").rate_limited, 1);
        assert_eq!(stats.counts("crm"), RouteCounts::default());
        assert_eq!(stats.unrouted_count(), 1);
    }
}
