//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, background tasks)
//!     → request.rs (request ID, client key)
//!     → dispatch (route, limit, breaker, balance, forward)
//!     → response.rs (structured error bodies)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::MakeRequestUuid;
pub use server::{AppState, GatewayServer};
