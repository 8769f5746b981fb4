//! In-flight request accounting.
//!
//! # Responsibilities
//! - Count requests in flight per instance (for least-outstanding)
//! - Hand out RAII leases that release the count on drop
//! - Forget instances that left the registry

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::ServiceInstance;

/// In-flight counters keyed by `service/id`.
#[derive(Debug, Default)]
pub struct OutstandingRequests {
    counters: DashMap<String, Arc<AtomicUsize>>,
}

impl OutstandingRequests {
    /// Current number of requests in flight to `instance`.
    pub fn in_flight(&self, instance: &ServiceInstance) -> usize {
        self.counters
            .get(&instance.key())
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Count one more request against `instance` until the lease drops.
    pub fn acquire(&self, instance: Arc<ServiceInstance>) -> InstanceLease {
        let counter = self
            .counters
            .entry(instance.key())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        counter.fetch_add(1, Ordering::Relaxed);
        InstanceLease { instance, counter }
    }

    /// Drop counters for instances that are gone. Leases still held keep
    /// their own handle and release into the detached counter.
    pub fn prune(&self, removed: &[String]) {
        for key in removed {
            self.counters.remove(key);
        }
    }

    pub fn tracked(&self) -> usize {
        self.counters.len()
    }
}

/// A RAII guard that manages the in-flight count of one instance.
#[derive(Debug)]
pub struct InstanceLease {
    instance: Arc<ServiceInstance>,
    counter: Arc<AtomicUsize>,
}

impl InstanceLease {
    pub fn instance(&self) -> &Arc<ServiceInstance> {
        &self.instance
    }
}

impl Deref for InstanceLease {
    type Target = ServiceInstance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_instances;

    #[test]
    fn lease_releases_on_drop() {
        let outstanding = OutstandingRequests::default();
        let instance = test_instances("svc", 1).remove(0);

        let first = outstanding.acquire(instance.clone());
        let second = outstanding.acquire(instance.clone());
        assert_eq!(outstanding.in_flight(&instance), 2);
        assert_eq!(first.id, "svc-0");

        drop(first);
        assert_eq!(outstanding.in_flight(&instance), 1);
        drop(second);
        assert_eq!(outstanding.in_flight(&instance), 0);
    }

    #[test]
    fn prune_forgets_removed_instances() {
        let outstanding = OutstandingRequests::default();
        let instances = test_instances("svc", 2);
        drop(outstanding.acquire(instances[0].clone()));
        let held = outstanding.acquire(instances[1].clone());
        assert_eq!(outstanding.tracked(), 2);

        outstanding.prune(&[instances[1].key()]);
        assert_eq!(outstanding.tracked(), 1);
        assert_eq!(outstanding.in_flight(&instances[1]), 0);
        drop(held);
    }
}
