//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the registry and the dispatcher from a validated configuration
//! - Start the Prometheus exporter when enabled
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::{ConfigError, ObservabilityConfig};
use crate::observability::metrics;
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(String),
}

/// Install the Prometheus exporter if the configuration asks for it.
pub fn start_metrics(config: &ObservabilityConfig) -> Result<Option<SocketAddr>, StartupError> {
    if !config.metrics_enabled {
        return Ok(None);
    }
    let addr: SocketAddr = config
        .metrics_address
        .parse()
        .map_err(|_| StartupError::MetricsAddress(config.metrics_address.clone()))?;
    metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    Ok(Some(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_start_nothing() {
        let config = ObservabilityConfig::default();
        assert!(start_metrics(&config).unwrap().is_none());
    }

    #[test]
    fn bad_metrics_address_is_reported() {
        let config = ObservabilityConfig {
            metrics_enabled: true,
            metrics_address: "not-an-address".into(),
            ..ObservabilityConfig::default()
        };
        assert!(matches!(
            start_metrics(&config),
            Err(StartupError::MetricsAddress(_))
        ));
    }
}
