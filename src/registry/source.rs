//! Instance sources.

use async_trait::async_trait;

use crate::config::StaticInstanceConfig;
use crate::registry::{RegistryError, ServiceInstance};

/// Something that can list every instance the registry knows about.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<ServiceInstance>, RegistryError>;
}

/// Instances declared in the gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    instances: Vec<ServiceInstance>,
}

impl StaticSource {
    pub fn from_config(configs: &[StaticInstanceConfig]) -> Result<Self, RegistryError> {
        let instances = configs
            .iter()
            .map(|c| {
                let id = c.id.clone().unwrap_or_else(|| c.address.clone());
                ServiceInstance::new(c.service.clone(), id, &c.address).map(|i| i.with_status(c.status))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { instances })
    }

    pub fn instances(&self) -> &[ServiceInstance] {
        &self.instances
    }
}

#[async_trait]
impl RegistrySource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
        Ok(self.instances.clone())
    }
}
