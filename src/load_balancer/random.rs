//! Uniform random selection.

use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, OutstandingRequests};
use crate::registry::ServiceInstance;

#[derive(Debug, Default)]
pub struct RandomChoice;

impl LoadBalancer for RandomChoice {
    fn next_instance(
        &self,
        _service: &str,
        instances: &[Arc<ServiceInstance>],
        _outstanding: &OutstandingRequests,
    ) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        Some(instances[fastrand::usize(..instances.len())].clone())
    }
}
