//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! http/server.rs (axum handler)
//!     → dispatcher.rs (route, limit, breaker, pick, forward)
//!     → upstream.rs (hyper client)
//!     → outcome.rs (classify the attempt)
//!     → fallback.rs (degraded answer when the service cannot help)
//! ```

pub mod dispatcher;
pub mod fallback;
pub mod outcome;
pub mod upstream;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use fallback::FallbackResponder;
pub use outcome::{ProxyOutcome, ProxyResult};
pub use upstream::{HyperUpstream, Upstream, UpstreamError};
