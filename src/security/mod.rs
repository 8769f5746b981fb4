//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (buffer body, reject oversized)
//!     → rate_limit.rs (per-route or per-client token bucket)
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to upstream
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any admission check failure
//! - Rate limit rejections never count against the circuit breaker

pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use rate_limit::{RateLimited, RateLimiter};
