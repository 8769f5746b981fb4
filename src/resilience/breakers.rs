//! One circuit breaker per route.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::routing::{Route, RoutingTable};

#[derive(Debug, Default)]
pub struct BreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The breaker guarding `route`, created on first use.
    ///
    /// An existing breaker is returned as-is even if `route` carries an older
    /// configuration; only [`reconcile`](Self::reconcile) replaces breakers.
    pub fn breaker_for(&self, route: &Route) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(&route.id) {
            return existing.clone();
        }
        self.breakers
            .entry(route.id.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(&route.id, route.circuit_breaker.clone())))
            .clone()
    }

    pub fn get(&self, route_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(route_id).map(|b| b.clone())
    }

    /// Align breakers with a freshly loaded routing table.
    ///
    /// Breakers of unchanged routes keep their state. A route whose breaker
    /// configuration changed starts over CLOSED.
    pub fn reconcile(&self, table: &RoutingTable) {
        self.breakers.retain(|id, _| table.get(id).is_some());
        for route in table.routes() {
            match self.breakers.entry(route.id.clone()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().config() != &route.circuit_breaker {
                        tracing::info!(route = %route.id, "Circuit breaker config changed, resetting breaker");
                        entry.insert(Arc::new(CircuitBreaker::new(&route.id, route.circuit_breaker.clone())));
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(CircuitBreaker::new(&route.id, route.circuit_breaker.clone())));
                }
            }
        }
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.route_id.cmp(&b.route_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, RouteConfig};
    use crate::resilience::circuit_breaker::BreakerMode;

    fn table(routes: Vec<RouteConfig>) -> RoutingTable {
        RoutingTable::from_config(&GatewayConfig {
            routes,
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn one_breaker_per_route() {
        let manager = BreakerManager::new();
        let table = table(vec![RouteConfig::new("auth", "/api/auth/**", "auth-service")]);
        let route = table.get("auth").unwrap();

        let a = manager.breaker_for(&route);
        let b = manager.breaker_for(&route);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn reconcile_keeps_unchanged_and_resets_changed() {
        let manager = BreakerManager::new();
        let before = table(vec![
            RouteConfig::new("auth", "/api/auth/**", "auth-service"),
            RouteConfig::new("users", "/api/users/**", "user-service"),
            RouteConfig::new("crm", "/api/crm/**", "crm-service"),
        ]);
        manager.reconcile(&before);

        let auth = manager.get("auth").unwrap();
        let users = manager.get("users").unwrap();
        for _ in 0..10 {
            auth.try_acquire().unwrap().record(true);
        }
        assert_eq!(auth.mode(), BreakerMode::Open);

        let mut changed = RouteConfig::new("users", "/api/users/**", "user-service");
        changed.circuit_breaker = Some(crate::config::CircuitBreakerConfig {
            min_samples: 20,
            ..Default::default()
        });
        let after = table(vec![RouteConfig::new("auth", "/api/auth/**", "auth-service"), changed]);
        manager.reconcile(&after);

        assert!(Arc::ptr_eq(&auth, &manager.get("auth").unwrap()));
        assert_eq!(manager.get("auth").unwrap().mode(), BreakerMode::Open);
        assert!(!Arc::ptr_eq(&users, &manager.get("users").unwrap()));
        assert!(manager.get("crm").is_none());
    }

    #[test]
    fn stale_route_does_not_replace_reconciled_breaker() {
        let manager = BreakerManager::new();
        let before = table(vec![RouteConfig::new("users", "/api/users/**", "user-service")]);
        manager.reconcile(&before);
        let old_route = before.get("users").unwrap();

        let mut changed = RouteConfig::new("users", "/api/users/**", "user-service");
        changed.circuit_breaker = Some(crate::config::CircuitBreakerConfig {
            min_samples: 1,
            ..Default::default()
        });
        let after = table(vec![changed]);
        manager.reconcile(&after);
        let current = manager.get("users").unwrap();
        current.try_acquire().unwrap().record(true);
        assert_eq!(current.mode(), BreakerMode::Open);

        // A request still holding the old route sees the live breaker.
        let seen = manager.breaker_for(&old_route);
        assert!(Arc::ptr_eq(&seen, &current));
        assert_eq!(seen.mode(), BreakerMode::Open);
        assert_eq!(manager.len(), 1);
    }
}
