//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → service identified
//!     → registry resolve (healthy instances, ordered by id)
//!     → balancer.rs (drop excluded instance, pick policy)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through instances, cursor per service)
//!         - random.rs (uniform choice)
//!         - least_outstanding.rs (fewest in-flight requests)
//!     → lease.rs (count the attempt as in flight until dropped)
//! ```
//!
//! # Design Decisions
//! - Policies are stateless apart from their cursors; in-flight counts live
//!   in `OutstandingRequests`
//! - Policy selection per route, defaulting to the global policy

pub mod balancer;
pub mod lease;
pub mod least_outstanding;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use crate::registry::ServiceInstance;

pub use balancer::Balancer;
pub use lease::{InstanceLease, OutstandingRequests};

/// A strategy for choosing one instance out of a healthy set.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick an instance of `service` from `instances`.
    ///
    /// `instances` is never empty when called through [`Balancer`].
    fn next_instance(
        &self,
        service: &str,
        instances: &[Arc<ServiceInstance>],
        outstanding: &OutstandingRequests,
    ) -> Option<Arc<ServiceInstance>>;
}

#[cfg(test)]
pub(crate) fn test_instances(service: &str, count: u16) -> Vec<Arc<ServiceInstance>> {
    (0..count)
        .map(|i| {
            Arc::new(
                ServiceInstance::new(service, format!("{service}-{i}"), &format!("127.0.0.1:{}", 9000 + i))
                    .unwrap(),
            )
        })
        .collect()
}
