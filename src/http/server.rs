//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router (actuator endpoints plus catch-all gateway route)
//! - Wire up middleware (request ID, tracing, request deadline)
//! - Bind the server to a listener and serve until shutdown
//! - Run the background tasks the dispatcher depends on:
//!   registry poller, bucket sweeper, balancer pruner and config applier

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{GatewayConfig, RegistryKind};
use crate::dispatch::{Dispatcher, HyperUpstream, Upstream};
use crate::http::request::MakeRequestUuid;
use crate::lifecycle::{Shutdown, StartupError};
use crate::registry::{
    build_registry, InstanceCache, RegistryClient, RegistryEvent, RegistryPoller, StaticSource,
};

/// How often idle per-client buckets are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// The gateway's HTTP front end.
pub struct GatewayServer {
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<InstanceCache>,
    poller: Option<RegistryPoller>,
}

impl GatewayServer {
    /// Build the registry, the upstream client and the dispatcher from a
    /// validated configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let (registry, poller) = build_registry(&config.registry)?;
        let upstream = Arc::new(HyperUpstream::new(&config.timeouts));
        Self::with_components(config, registry, poller, upstream)
    }

    /// Assemble a server from pre-built parts.
    pub fn with_components(
        config: GatewayConfig,
        registry: Arc<InstanceCache>,
        poller: Option<RegistryPoller>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, StartupError> {
        let dispatcher = Dispatcher::new(&config, registry.clone(), upstream)?;
        tracing::info!(
            routes = dispatcher.routes().len(),
            registry = ?config.registry.kind,
            "Gateway initialized"
        );
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            registry,
            poller,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let x_request_id = HeaderName::from_static("x-request-id");
        Router::new()
            .merge(admin::router())
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(x_request_id))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Validated configurations arriving on `config_updates` replace the
    /// routing table without dropping in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Arc<Shutdown>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        // Without a poller the registry is static and follows the config file.
        let static_registry = self.poller.is_none();
        if let Some(poller) = self.poller {
            tokio::spawn(poller.run(shutdown.subscribe()));
        }
        tokio::spawn(sweep_buckets(self.dispatcher.clone(), shutdown.subscribe()));
        tokio::spawn(prune_balancer(
            self.dispatcher.clone(),
            self.registry.subscribe(),
            shutdown.subscribe(),
        ));
        tokio::spawn(apply_config_updates(
            self.dispatcher.clone(),
            static_registry.then(|| self.registry.clone()),
            config_updates,
            shutdown.subscribe(),
        ));

        let state = AppState {
            dispatcher: self.dispatcher.clone(),
        };
        let app = Self::build_router(&self.config, state)
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: everything that is not an actuator path is dispatched.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    state.dispatcher.dispatch(request, Some(peer)).await
}

async fn sweep_buckets(dispatcher: Arc<Dispatcher>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = dispatcher.evict_idle_buckets();
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted idle rate-limit buckets");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn prune_balancer(
    dispatcher: Arc<Dispatcher>,
    mut events: broadcast::Receiver<RegistryEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RegistryEvent::Synced { removed_instances, .. }) => {
                    dispatcher.prune(&removed_instances);
                }
                Ok(RegistryEvent::Stale) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Balancer pruner lagged behind registry events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

async fn apply_config_updates(
    dispatcher: Arc<Dispatcher>,
    static_registry: Option<Arc<InstanceCache>>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                if let Err(e) = dispatcher.apply_config(&config) {
                    tracing::error!(error = %e, "Rejected configuration update, keeping current routing table");
                    continue;
                }
                if let (Some(registry), RegistryKind::Static) = (&static_registry, config.registry.kind) {
                    match StaticSource::from_config(&config.registry.instances) {
                        Ok(source) => registry.replace(source.instances().to_vec()),
                        Err(e) => tracing::error!(error = %e, "Static instances not reloaded"),
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
