//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → breakers.rs (per-route breaker admits or short-circuits)
//!     → timeouts.rs (enforce the route's upstream timeout)
//!     → circuit_breaker.rs (record outcome, open circuit if threshold exceeded)
//!     → On failure: retries.rs (check if retryable, retry with backoff)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod breakers;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;
pub mod window;

pub use breakers::BreakerManager;
pub use circuit_breaker::{BreakerMode, BreakerPermit, BreakerRejected, BreakerSnapshot, CircuitBreaker};
pub use retries::RetryPolicy;
