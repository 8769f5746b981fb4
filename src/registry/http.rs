//! HTTP registry sources.
//!
//! # Formats
//! - `json`: `GET {url}` returns an array of
//!   `{service, instance_id, address, status, last_heartbeat_ms, lease_interval_secs}`
//! - `eureka`: `GET {url}/apps` returns the Eureka applications document;
//!   application names are lower-cased to match route service names
//!
//! Records that cannot be turned into an instance are skipped with a warning
//! so one bad registration does not blank out a whole service.

use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

use crate::config::{RegistryConfig, RegistryFormat};
use crate::registry::{HealthStatus, RegistryError, RegistrySource, ServiceInstance};

/// Polls a registry endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
    format: RegistryFormat,
    default_lease: Duration,
}

impl HttpSource {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let base = config.url.trim_end_matches('/');
        let url = match config.format {
            RegistryFormat::Json => Url::parse(base)?,
            RegistryFormat::Eureka => Url::parse(&format!("{base}/apps"))?,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            format: config.format,
            default_lease: Duration::from_secs(config.default_lease_secs),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RegistrySource for HttpSource {
    fn name(&self) -> &'static str {
        match self.format {
            RegistryFormat::Json => "http-json",
            RegistryFormat::Eureka => "eureka",
        }
    }

    async fn fetch(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status()));
        }

        let body = response.bytes().await?;
        match self.format {
            RegistryFormat::Json => parse_instance_list(&body, self.default_lease),
            RegistryFormat::Eureka => parse_eureka_apps(&body, self.default_lease),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstanceRecord {
    service: String,
    instance_id: String,
    address: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_heartbeat_ms: Option<u64>,
    #[serde(default)]
    lease_interval_secs: Option<u64>,
}

/// Parse the flat JSON instance list.
pub fn parse_instance_list(
    body: &[u8],
    default_lease: Duration,
) -> Result<Vec<ServiceInstance>, RegistryError> {
    let records: Vec<InstanceRecord> = serde_json::from_slice(body)?;
    let instances = records
        .into_iter()
        .filter_map(|record| {
            let status = record
                .status
                .as_deref()
                .map(HealthStatus::from_registry_str)
                .unwrap_or(HealthStatus::Up);
            let lease = record
                .lease_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default_lease);
            build_instance(
                &record.service,
                &record.instance_id,
                &record.address,
                status,
                record.last_heartbeat_ms,
                lease,
            )
        })
        .collect();
    Ok(instances)
}

#[derive(Debug, Deserialize)]
struct EurekaDocument {
    applications: EurekaApplications,
}

#[derive(Debug, Deserialize)]
struct EurekaApplications {
    #[serde(default)]
    application: OneOrMany<EurekaApplication>,
}

#[derive(Debug, Deserialize)]
struct EurekaApplication {
    name: String,
    #[serde(default)]
    instance: OneOrMany<EurekaInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EurekaInstance {
    #[serde(default)]
    instance_id: Option<String>,
    host_name: String,
    #[serde(default)]
    ip_addr: Option<String>,
    status: String,
    port: EurekaPort,
    #[serde(default)]
    lease_info: Option<EurekaLease>,
}

#[derive(Debug, Deserialize)]
struct EurekaPort {
    #[serde(rename = "$")]
    number: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EurekaLease {
    #[serde(default)]
    renewal_interval_in_secs: Option<u64>,
    #[serde(default)]
    last_renewal_timestamp: Option<u64>,
}

/// Eureka collapses single-element lists into a bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Parse a Eureka `/apps` document.
pub fn parse_eureka_apps(
    body: &[u8],
    default_lease: Duration,
) -> Result<Vec<ServiceInstance>, RegistryError> {
    let document: EurekaDocument = serde_json::from_slice(body)?;
    let mut instances = Vec::new();

    for app in document.applications.application.into_vec() {
        let service = app.name.to_ascii_lowercase();
        for raw in app.instance.into_vec() {
            let host = raw.ip_addr.as_deref().unwrap_or(&raw.host_name);
            let address = format!("{host}:{}", raw.port.number);
            let id = raw.instance_id.clone().unwrap_or_else(|| address.clone());
            let lease = raw
                .lease_info
                .as_ref()
                .and_then(|l| l.renewal_interval_in_secs)
                .map(Duration::from_secs)
                .unwrap_or(default_lease);
            let heartbeat = raw.lease_info.as_ref().and_then(|l| l.last_renewal_timestamp);

            if let Some(instance) = build_instance(
                &service,
                &id,
                &address,
                HealthStatus::from_registry_str(&raw.status),
                heartbeat,
                lease,
            ) {
                instances.push(instance);
            }
        }
    }

    Ok(instances)
}

fn build_instance(
    service: &str,
    id: &str,
    address: &str,
    status: HealthStatus,
    heartbeat_ms: Option<u64>,
    lease: Duration,
) -> Option<ServiceInstance> {
    match ServiceInstance::new(service, id, address) {
        Ok(instance) => {
            let instance = instance.with_status(status);
            Some(match heartbeat_ms {
                Some(ms) => instance.with_heartbeat(UNIX_EPOCH + Duration::from_millis(ms), lease),
                None => ServiceInstance {
                    lease_interval: lease,
                    ..instance
                },
            })
        }
        Err(e) => {
            tracing::warn!(service, instance = id, error = %e, "Skipping unusable registry record");
            None
        }
    }
}
