//! Service registry client subsystem.
//!
//! # Data Flow
//! ```text
//! Registry (static config, JSON endpoint, or Eureka)
//!     → source.rs / http.rs (fetch instance list)
//!     → poller.rs (periodic, jittered sync)
//!     → cache.rs (immutable snapshot, swapped atomically)
//!     → resolve(service) → healthy instances, ordered by id
//!
//! Registry unreachable:
//!     → cache keeps last-known-good snapshot, flagged stale
//!     → callers decide whether stale data is still routable
//! ```
//!
//! # Design Decisions
//! - Dispatcher, balancer and breakers only see the `RegistryClient` trait
//! - Health comes from registry status plus heartbeat age, evaluated at
//!   resolution time
//! - Registry failures are never surfaced to callers

pub mod cache;
pub mod http;
pub mod instance;
pub mod poller;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{RegistryConfig, RegistryKind};

pub use cache::InstanceCache;
pub use http::HttpSource;
pub use instance::{HealthStatus, ServiceInstance};
pub use poller::RegistryPoller;
pub use source::{RegistrySource, StaticSource};

/// Errors raised while talking to a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid instance address {0}")]
    InvalidAddress(String),

    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry answered {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed registry document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result of resolving a logical service.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Routable instances, ordered by instance id.
    pub instances: Vec<Arc<ServiceInstance>>,
    /// How long the snapshot has been stale, if it is.
    pub stale_for: Option<Duration>,
}

/// Change notification emitted after every sync.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Synced {
        version: u64,
        changed_services: Vec<String>,
        /// `service/id` keys of instances no longer listed.
        removed_instances: Vec<String>,
    },
    Stale,
}

/// Summary used by the readiness endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStatus {
    pub synced: bool,
    pub stale: bool,
    pub version: u64,
    #[serde(serialize_with = "serialize_age")]
    pub last_sync_age: Option<Duration>,
    pub services: usize,
}

fn serialize_age<S: serde::Serializer>(age: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match age {
        Some(age) => s.serialize_some(&(age.as_millis() as u64)),
        None => s.serialize_none(),
    }
}

/// The discovery boundary seen by the rest of the gateway.
pub trait RegistryClient: Send + Sync {
    /// Healthy instances of `service` (possibly none).
    fn resolve(&self, service: &str) -> Resolution;

    /// Receive change events.
    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent>;

    fn status(&self) -> RegistryStatus;
}

/// Build the registry described by the configuration.
///
/// Static registries are populated immediately; HTTP registries return a
/// poller that must be run to populate the cache.
pub fn build_registry(
    config: &RegistryConfig,
) -> Result<(Arc<InstanceCache>, Option<RegistryPoller>), RegistryError> {
    let cache = Arc::new(InstanceCache::new(config.missed_heartbeats));
    match config.kind {
        RegistryKind::Static => {
            let source = StaticSource::from_config(&config.instances)?;
            cache.replace(source.instances().to_vec());
            tracing::info!(instances = config.instances.len(), "Static registry loaded");
            Ok((cache, None))
        }
        RegistryKind::Http => {
            let source = HttpSource::new(config)?;
            let poller = RegistryPoller::new(Arc::new(source), cache.clone(), config);
            Ok((cache, Some(poller)))
        }
    }
}
