//! Periodic registry synchronisation.
//!
//! # Responsibilities
//! - Fetch the full instance list on a jittered interval
//! - Publish successful fetches to the cache
//! - Flag the cache stale when the registry cannot be reached

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::RegistryConfig;
use crate::observability::metrics;
use crate::registry::{InstanceCache, RegistryError, RegistrySource};

pub struct RegistryPoller {
    source: Arc<dyn RegistrySource>,
    cache: Arc<InstanceCache>,
    interval: Duration,
    jitter: f64,
}

impl RegistryPoller {
    pub fn new(
        source: Arc<dyn RegistrySource>,
        cache: Arc<InstanceCache>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            source,
            cache,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            jitter: config.poll_jitter.clamp(0.0, 0.99),
        }
    }

    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    /// Fetch once and publish the result.
    pub async fn sync_once(&self) -> Result<usize, RegistryError> {
        match self.source.fetch().await {
            Ok(instances) => {
                let count = instances.len();
                self.cache.replace(instances);
                metrics::record_registry_sync(self.source.name(), true);
                Ok(count)
            }
            Err(e) => {
                metrics::record_registry_sync(self.source.name(), false);
                self.cache.mark_stale();
                Err(e)
            }
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            "Registry poller starting"
        );

        loop {
            match self.sync_once().await {
                Ok(count) => tracing::debug!(instances = count, "Registry synced"),
                Err(e) => tracing::warn!(error = %e, "Registry sync failed"),
            }

            tokio::select! {
                _ = time::sleep(self.next_delay()) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Registry poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Interval spread by ±jitter so gateway replicas do not poll in lockstep.
    fn next_delay(&self) -> Duration {
        let spread = (fastrand::f64() * 2.0 - 1.0) * self.jitter;
        self.interval.mul_f64(1.0 + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryClient, ServiceInstance};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakySource {
        fail: AtomicBool,
    }

    #[async_trait]
    impl RegistrySource for FlakySource {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn fetch(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RegistryError::InvalidAddress("unreachable".into()));
            }
            Ok(vec![ServiceInstance::new("auth-service", "a", "127.0.0.1:9001")?])
        }
    }

    #[tokio::test]
    async fn failed_sync_keeps_last_known_good() {
        let source = Arc::new(FlakySource { fail: AtomicBool::new(false) });
        let cache = Arc::new(InstanceCache::new(3));
        let poller = RegistryPoller::new(source.clone(), cache.clone(), &RegistryConfig::default());

        assert_eq!(poller.sync_once().await.unwrap(), 1);
        source.fail.store(true, Ordering::SeqCst);
        assert!(poller.sync_once().await.is_err());

        let resolution = cache.resolve("auth-service");
        assert_eq!(resolution.instances.len(), 1);
        assert!(resolution.stale_for.is_some());
    }

    #[test]
    fn delay_stays_within_jitter() {
        let config = RegistryConfig {
            poll_interval_secs: 10,
            poll_jitter: 0.2,
            ..RegistryConfig::default()
        };
        let poller = RegistryPoller::new(
            Arc::new(FlakySource { fail: AtomicBool::new(false) }),
            Arc::new(InstanceCache::new(3)),
            &config,
        );
        for _ in 0..100 {
            let delay = poller.next_delay();
            assert!(delay >= Duration::from_secs(8) && delay <= Duration::from_secs(12));
        }
    }
}
