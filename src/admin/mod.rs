//! Operational endpoints served on the gateway listener.

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;
use crate::http::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/actuator/health", get(health))
        .route("/actuator/gateway/routes", get(routes))
        .route("/actuator/metrics", get(metrics))
}
