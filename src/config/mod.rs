//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into a RoutingTable
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<RoutingTable>
//!     → breakers and buckets reconciled per route id
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Invalid config is fatal at startup and ignored on reload

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, GatewayConfig, LbPolicy, LimitsConfig, ListenerConfig,
    LoadBalancerConfig, LogFormat, ObservabilityConfig, RateLimitConfig, RegistryConfig,
    RegistryFormat, RegistryKind, RetryConfig, RouteConfig, StaticInstanceConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
