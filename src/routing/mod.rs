//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → table.rs (route lookup)
//!     → matcher.rs (evaluate path prefix)
//!     → Return: matched Route or NoMatch (404)
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Parse patterns
//!     → Sort by prefix length, keep declaration order among equals
//!     → Freeze as immutable RoutingTable, published through ArcSwap
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; reload swaps the whole table
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always matches same route

pub mod matcher;
pub mod table;

pub use matcher::{PathPattern, PatternError};
pub use table::{default_display_name, Route, RoutingTable};
