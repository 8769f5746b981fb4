//! Least outstanding requests load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, OutstandingRequests};
use crate::registry::ServiceInstance;

/// Least outstanding selector.
/// Selects the instance with the fewest requests currently in flight.
#[derive(Debug, Default)]
pub struct LeastOutstanding;

impl LoadBalancer for LeastOutstanding {
    fn next_instance(
        &self,
        _service: &str,
        instances: &[Arc<ServiceInstance>],
        outstanding: &OutstandingRequests,
    ) -> Option<Arc<ServiceInstance>> {
        // In case of tie, the first one (lowest id) is selected
        instances
            .iter()
            .min_by_key(|i| outstanding.in_flight(i))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_instances;

    #[test]
    fn test_least_outstanding() {
        let lb = LeastOutstanding;
        let outstanding = OutstandingRequests::default();
        let instances = test_instances("svc", 2);

        let _busy = outstanding.acquire(instances[0].clone());
        assert_eq!(lb.next_instance("svc", &instances, &outstanding).unwrap().id, "svc-1");

        let _b1 = outstanding.acquire(instances[1].clone());
        let _b2 = outstanding.acquire(instances[1].clone());
        assert_eq!(lb.next_instance("svc", &instances, &outstanding).unwrap().id, "svc-0");
    }

    #[test]
    fn ties_go_to_first() {
        let outstanding = OutstandingRequests::default();
        let instances = test_instances("svc", 3);
        assert_eq!(
            LeastOutstanding.next_instance("svc", &instances, &outstanding).unwrap().id,
            "svc-0"
        );
    }
}
