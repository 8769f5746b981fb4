//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::{LoadBalancer, OutstandingRequests};
use crate::registry::ServiceInstance;

/// Round-robin selector.
/// Keeps one cursor per logical service.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&self, service: &str) -> usize {
        if let Some(cursor) = self.cursors.get(service) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(service.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobin {
    fn next_instance(
        &self,
        service: &str,
        instances: &[Arc<ServiceInstance>],
        _outstanding: &OutstandingRequests,
    ) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        let index = self.advance(service) % instances.len();
        Some(instances[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_instances;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let outstanding = OutstandingRequests::default();
        let instances = test_instances("svc", 2);

        let picks: Vec<_> = (0..4)
            .map(|_| lb.next_instance("svc", &instances, &outstanding).unwrap().id.clone())
            .collect();
        assert_eq!(picks, ["svc-0", "svc-1", "svc-0", "svc-1"]);
    }

    #[test]
    fn cursors_are_per_service() {
        let lb = RoundRobin::new();
        let outstanding = OutstandingRequests::default();
        let a = test_instances("a", 3);
        let b = test_instances("b", 3);

        lb.next_instance("a", &a, &outstanding);
        lb.next_instance("a", &a, &outstanding);
        assert_eq!(lb.next_instance("b", &b, &outstanding).unwrap().id, "b-0");
        assert_eq!(lb.next_instance("a", &a, &outstanding).unwrap().id, "a-2");
    }

    #[test]
    fn empty_set_yields_nothing() {
        let lb = RoundRobin::new();
        assert!(lb.next_instance("svc", &[], &OutstandingRequests::default()).is_none());
    }
}
