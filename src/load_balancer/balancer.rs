//! Policy dispatch and lease management.
//!
//! # Responsibilities
//! - Hold one instance of every policy (cursors survive config reloads)
//! - Apply the exclusion set used by retries
//! - Wrap the pick in an `InstanceLease`

use std::sync::Arc;

use crate::config::LbPolicy;
use crate::load_balancer::{
    least_outstanding::LeastOutstanding, random::RandomChoice, round_robin::RoundRobin,
    InstanceLease, LoadBalancer, OutstandingRequests,
};
use crate::registry::ServiceInstance;

/// Selects instances and tracks what is in flight.
#[derive(Debug, Default)]
pub struct Balancer {
    round_robin: RoundRobin,
    random: RandomChoice,
    least_outstanding: LeastOutstanding,
    outstanding: OutstandingRequests,
}

impl Balancer {
    pub fn new() -> Self {
        Self::default()
    }

    fn policy(&self, policy: LbPolicy) -> &dyn LoadBalancer {
        match policy {
            LbPolicy::RoundRobin => &self.round_robin,
            LbPolicy::Random => &self.random,
            LbPolicy::LeastOutstanding => &self.least_outstanding,
        }
    }

    /// Pick an instance of `service`, skipping the instance keyed `exclude`.
    /// Returns None when no candidate remains.
    pub fn pick(
        &self,
        policy: LbPolicy,
        service: &str,
        instances: &[Arc<ServiceInstance>],
        exclude: Option<&str>,
    ) -> Option<InstanceLease> {
        let picked = match exclude {
            Some(key) => {
                let candidates: Vec<_> = instances
                    .iter()
                    .filter(|i| i.key() != key)
                    .cloned()
                    .collect();
                self.select(policy, service, &candidates)
            }
            None => self.select(policy, service, instances),
        };

        match picked {
            Some(instance) => Some(self.outstanding.acquire(instance)),
            None => {
                tracing::debug!(service, candidates = instances.len(), "No instance available");
                None
            }
        }
    }

    fn select(
        &self,
        policy: LbPolicy,
        service: &str,
        candidates: &[Arc<ServiceInstance>],
    ) -> Option<Arc<ServiceInstance>> {
        if candidates.is_empty() {
            return None;
        }
        self.policy(policy)
            .next_instance(service, candidates, &self.outstanding)
    }

    pub fn outstanding(&self) -> &OutstandingRequests {
        &self.outstanding
    }

    /// Forget in-flight counters of instances that left the registry.
    pub fn prune(&self, removed: &[String]) {
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "Pruning in-flight counters");
            self.outstanding.prune(removed);
        }
    }
}
