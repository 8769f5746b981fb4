//! Service instance model.
//!
//! # Responsibilities
//! - Represent one running instance of a logical service
//! - Derive routability from registry status and heartbeat age
//!
//! # Design Decisions
//! - Instances are immutable; a registry sync replaces them wholesale
//! - Statically declared instances carry no heartbeat and are judged on
//!   status alone

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::registry::RegistryError;

/// Health status reported by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Map a registry status string (Eureka uses `STARTING` and
    /// `OUT_OF_SERVICE` too) onto the three states we route on.
    pub fn from_registry_str(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "UP" => HealthStatus::Up,
            "DOWN" | "OUT_OF_SERVICE" | "STARTING" => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        }
    }
}

/// A single instance of a logical service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstance {
    /// Logical service name.
    pub service: String,
    /// Instance id, unique within the service.
    pub id: String,
    /// Base URL requests are forwarded to.
    pub base_url: Url,
    pub status: HealthStatus,
    /// Last heartbeat seen by the registry, if it tracks them.
    pub last_heartbeat: Option<SystemTime>,
    /// Heartbeat interval the instance promised.
    pub lease_interval: Duration,
}

impl ServiceInstance {
    /// Create an UP instance without heartbeat tracking.
    pub fn new(
        service: impl Into<String>,
        id: impl Into<String>,
        address: &str,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            service: service.into(),
            id: id.into(),
            base_url: Self::parse_base_url(address)?,
            status: HealthStatus::Up,
            last_heartbeat: None,
            lease_interval: Duration::from_secs(30),
        })
    }

    /// Accepts `host:port` or a full `http://` base URL.
    pub fn parse_base_url(address: &str) -> Result<Url, RegistryError> {
        let candidate = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let url = Url::parse(&candidate)
            .map_err(|e| RegistryError::InvalidAddress(format!("{address}: {e}")))?;
        if url.scheme() != "http" || url.host_str().is_none() {
            return Err(RegistryError::InvalidAddress(format!(
                "{address}: expected an http host"
            )));
        }
        Ok(url)
    }

    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_heartbeat(mut self, at: SystemTime, lease_interval: Duration) -> Self {
        self.last_heartbeat = Some(at);
        self.lease_interval = lease_interval;
        self
    }

    /// Key identifying this instance across services.
    pub fn key(&self) -> String {
        format!("{}/{}", self.service, self.id)
    }

    /// `host:port` of the instance.
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Returns true if the instance may receive traffic at `now`.
    ///
    /// An instance that has missed `missed_heartbeats` consecutive lease
    /// renewals is treated as DOWN even if the registry still lists it UP.
    pub fn is_routable(&self, now: SystemTime, missed_heartbeats: u32) -> bool {
        if self.status != HealthStatus::Up {
            return false;
        }
        match self.last_heartbeat {
            None => true,
            Some(at) => {
                let age = now.duration_since(at).unwrap_or(Duration::ZERO);
                // A lease too long to multiply never expires.
                self.lease_interval
                    .checked_mul(missed_heartbeats)
                    .map_or(true, |limit| age <= limit)
            }
        }
    }
}
