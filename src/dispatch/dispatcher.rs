//! Request dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → routing table (404 if nothing matches)
//!     → buffer body (413 over the limit)
//!     → rate limiter (429 + Retry-After)
//!     → circuit breaker (503 fallback while open)
//!     → registry resolve + balancer pick (503 fallback, breaker failure)
//!     → upstream call bounded by the route timeout
//!     → record outcome on the breaker
//!     → 2xx/3xx/4xx verbatim; otherwise one retry on another instance
//!       for idempotent methods, then 503 fallback
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::http::{header, request::Parts, HeaderValue, Request, Response, Uri};
use http_body_util::BodyExt;
use tracing::Instrument;

use crate::config::{ConfigError, GatewayConfig};
use crate::dispatch::fallback::FallbackResponder;
use crate::dispatch::outcome::{ProxyOutcome, ProxyResult};
use crate::dispatch::upstream::{Upstream, UpstreamError};
use crate::error::GatewayError;
use crate::http::request::client_key;
use crate::http::response::{json_response, reason, timestamp, ErrorBody};
use crate::load_balancer::{Balancer, InstanceLease};
use crate::observability::{metrics, RouteStats};
use crate::registry::{RegistryClient, ServiceInstance};
use crate::resilience::{timeouts, BreakerManager, BreakerPermit, RetryPolicy};
use crate::routing::{Route, RoutingTable};
use crate::security::headers::{apply_forwarded, strip_hop_by_hop, X_REQUEST_ID};
use crate::security::limits::{buffer_body, BodyError};
use crate::security::RateLimiter;

/// Settings that are swapped together with the routing table.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_body_bytes: usize,
    pub max_staleness: Option<Duration>,
    pub retry: RetryPolicy,
}

impl DispatchSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_body_bytes: config.limits.max_body_bytes,
            max_staleness: config.registry.max_staleness_secs.map(Duration::from_secs),
            retry: RetryPolicy::new(config.retries.clone()),
        }
    }
}

/// Result of one upstream attempt.
enum Attempt {
    /// The backend produced a response the client should see.
    Answered(Response<Body>),
    Failed {
        error: GatewayError,
        instance: Option<String>,
    },
}

pub struct Dispatcher {
    routes: ArcSwap<RoutingTable>,
    settings: ArcSwap<DispatchSettings>,
    registry: Arc<dyn RegistryClient>,
    balancer: Balancer,
    breakers: BreakerManager,
    limiter: RateLimiter,
    upstream: Arc<dyn Upstream>,
    fallback: FallbackResponder,
    stats: RouteStats,
}

impl Dispatcher {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<dyn RegistryClient>,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Self, ConfigError> {
        let table = RoutingTable::from_config(config)?;
        let breakers = BreakerManager::new();
        breakers.reconcile(&table);

        Ok(Self {
            routes: ArcSwap::from_pointee(table),
            settings: ArcSwap::from_pointee(DispatchSettings::from_config(config)),
            registry,
            balancer: Balancer::new(),
            breakers,
            limiter: RateLimiter::new(),
            upstream,
            fallback: FallbackResponder,
            stats: RouteStats::default(),
        })
    }

    /// Swap in a new configuration. On error the current table stays live.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        let table = RoutingTable::from_config(config)?;
        self.breakers.reconcile(&table);
        self.limiter.reconcile(&table);
        let routes = table.len();
        self.settings.store(Arc::new(DispatchSettings::from_config(config)));
        self.routes.store(Arc::new(table));
        tracing::info!(routes, "Routing table reloaded");
        Ok(())
    }

    pub fn routes(&self) -> Arc<RoutingTable> {
        self.routes.load_full()
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    pub fn breakers(&self) -> &BreakerManager {
        &self.breakers
    }

    pub fn balancer(&self) -> &Balancer {
        &self.balancer
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }

    /// Forget in-flight counters of instances that left the registry.
    pub fn prune(&self, removed: &[String]) {
        self.balancer.prune(removed);
    }

    pub fn evict_idle_buckets(&self) -> usize {
        self.limiter.evict_idle(&self.routes.load(), Instant::now())
    }

    /// Forward one inbound request and produce exactly one response.
    pub async fn dispatch(&self, request: Request<Body>, peer: Option<SocketAddr>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        let table = self.routes.load_full();
        let Some(route) = table.match_path(&path) else {
            tracing::debug!(request_id = %request_id, path = %path, "No route matched");
            self.stats.unrouted();
            metrics::record_request("none", method.as_str(), 404, start);
            return error_response(&GatewayError::RouteNotFound { path: path.clone() }, &path);
        };

        self.stats.request(&route.id);
        let span = tracing::debug_span!(
            "dispatch",
            request_id = %request_id,
            route = %route.id,
            service = %route.service,
        );
        let response = self.dispatch_routed(&route, request, peer).instrument(span).await;

        metrics::record_request(&route.id, method.as_str(), response.status().as_u16(), start);
        response
    }

    async fn dispatch_routed(
        &self,
        route: &Route,
        request: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Response<Body> {
        let settings = self.settings.load_full();
        let (parts, body) = request.into_parts();

        let body = match buffer_body(&parts.headers, body, settings.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(BodyError::TooLarge { limit }) => {
                tracing::debug!(limit, "Request body too large");
                return error_response(&GatewayError::PayloadTooLarge { limit }, parts.uri.path());
            }
        };

        let client = client_key(&parts.headers, peer);
        if let Err(limited) = self.limiter.check(route, client.as_deref()) {
            self.stats.rate_limited(&route.id);
            return self.fail(
                route,
                GatewayError::RateLimited {
                    retry_after: limited.retry_after,
                },
            );
        }

        let breaker = self.breakers.breaker_for(route);
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejected) => {
                tracing::debug!(state = ?rejected.mode, "Short-circuited by breaker");
                self.stats.short_circuited(&route.id);
                return self.fail(route, GatewayError::BreakerOpen { route: route.id.clone() });
            }
        };

        let (error, failed_instance) =
            match self.attempt(route, &settings, &parts, &body, peer, permit, None).await {
                Attempt::Answered(response) => return response,
                Attempt::Failed { error, instance } => (error, instance),
            };

        // One retry against a different instance.
        let retryable = !matches!(error, GatewayError::NoInstanceAvailable { .. })
            && settings.retry.allows(&parts.method, 1)
            && self.has_alternative(route, &settings, failed_instance.as_deref());
        if !retryable {
            return self.fail(route, error);
        }

        tokio::time::sleep(settings.retry.delay(1)).await;
        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("Breaker refused the retry");
                return self.fail(route, error);
            }
        };

        tracing::debug!(excluded = ?failed_instance, "Retrying on another instance");
        self.stats.retry(&route.id);
        metrics::record_retry(&route.id);

        match self
            .attempt(route, &settings, &parts, &body, peer, permit, failed_instance.as_deref())
            .await
        {
            Attempt::Answered(response) => response,
            Attempt::Failed { error, .. } => self.fail(route, error),
        }
    }

    /// Healthy instances of the route's service, honouring the staleness
    /// ceiling.
    fn candidates(&self, route: &Route, settings: &DispatchSettings) -> Vec<Arc<ServiceInstance>> {
        let resolution = self.registry.resolve(&route.service);
        if let (Some(stale_for), Some(ceiling)) = (resolution.stale_for, settings.max_staleness) {
            if stale_for > ceiling {
                tracing::warn!(
                    service = %route.service,
                    stale_for_secs = stale_for.as_secs(),
                    "Registry snapshot too stale to route on"
                );
                return Vec::new();
            }
        }
        resolution.instances
    }

    fn has_alternative(&self, route: &Route, settings: &DispatchSettings, failed: Option<&str>) -> bool {
        self.candidates(route, settings)
            .iter()
            .any(|i| failed.map_or(true, |key| i.key() != key))
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        route: &Route,
        settings: &DispatchSettings,
        parts: &Parts,
        body: &Bytes,
        peer: Option<SocketAddr>,
        permit: BreakerPermit,
        exclude: Option<&str>,
    ) -> Attempt {
        let start = Instant::now();
        let instances = self.candidates(route, settings);
        let Some(lease) = self
            .balancer
            .pick(route.lb_policy, &route.service, &instances, exclude)
        else {
            permit.record(true);
            self.stats.outcome(&route.id, ProxyOutcome::NoInstance);
            tracing::warn!(service = %route.service, "No healthy instance available");
            return Attempt::Failed {
                error: GatewayError::NoInstanceAvailable {
                    service: route.service.clone(),
                },
                instance: None,
            };
        };

        let sent = match upstream_request(route, &lease, parts, body.clone(), peer) {
            Ok(request) => timeouts::bounded(route.timeout, self.upstream.send(request)).await,
            Err(e) => Err(e),
        };

        let (outcome, status, response) = match sent {
            Ok(response) => (
                ProxyOutcome::from_status(response.status()),
                Some(response.status()),
                Some(response),
            ),
            Err(e) => {
                tracing::warn!(instance = %lease.key(), error = %e, "Upstream call failed");
                (ProxyOutcome::from_error(&e), None, None)
            }
        };

        permit.record(outcome.is_failure());
        self.stats.outcome(&route.id, outcome);

        let result = ProxyResult {
            outcome,
            latency: start.elapsed(),
            instance: Some(lease.key()),
            status,
        };
        tracing::debug!(
            instance = ?result.instance,
            outcome = result.outcome.label(),
            latency_ms = result.latency.as_millis() as u64,
            "Upstream attempt finished"
        );

        match (result.error(&route.service), response) {
            (None, Some(mut response)) => {
                strip_hop_by_hop(response.headers_mut());
                Attempt::Answered(response.map(|body| hold_until_streamed(body, lease)))
            }
            (Some(error), _) => Attempt::Failed {
                error,
                instance: result.instance,
            },
            (None, None) => Attempt::Failed {
                error: GatewayError::BackendConnection,
                instance: result.instance,
            },
        }
    }

    fn fail(&self, route: &Route, error: GatewayError) -> Response<Body> {
        self.stats.fallback(&route.id);
        metrics::record_fallback(&route.id, error.kind());
        tracing::debug!(reason = error.kind(), "Serving fallback");
        self.fallback.respond(route, &error)
    }
}

/// Keep `lease` alive until the response body has been streamed or dropped.
fn hold_until_streamed(body: Body, lease: InstanceLease) -> Body {
    Body::new(body.map_frame(move |frame| {
        let _in_flight = &lease;
        frame
    }))
}

/// Build the request sent to `instance`.
fn upstream_request(
    route: &Route,
    instance: &ServiceInstance,
    parts: &Parts,
    body: Bytes,
    peer: Option<SocketAddr>,
) -> Result<Request<Body>, UpstreamError> {
    let authority = instance.authority();
    let base_path = instance.base_url.path().trim_end_matches('/');
    let mut target = format!(
        "http://{}{}{}",
        authority,
        base_path,
        route.upstream_path(parts.uri.path())
    );
    if let Some(query) = parts.uri.query() {
        target.push('?');
        target.push_str(query);
    }
    let uri: Uri = target
        .parse()
        .map_err(|e| UpstreamError::Request(format!("{e}")))?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    apply_forwarded(&mut headers, peer.map(|p| p.ip()), "http");
    let host = HeaderValue::from_str(&authority).map_err(|e| UpstreamError::Request(format!("{e}")))?;
    headers.insert(header::HOST, host);

    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    Ok(request)
}

fn error_response(error: &GatewayError, path: &str) -> Response<Body> {
    let status = error.status();
    json_response(
        status,
        &ErrorBody {
            timestamp: timestamp(),
            status: status.as_u16(),
            error: reason(status),
            message: error.to_string(),
            path,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CircuitBreakerConfig, RateLimitConfig, RouteConfig};
    use crate::registry::InstanceCache;
    use crate::resilience::BreakerMode;
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockUpstream {
        /// (authority, path and query) per call.
        calls: Mutex<Vec<(String, String)>>,
        last_headers: Mutex<Option<axum::http::HeaderMap>>,
        failing: Vec<String>,
    }

    impl MockUpstream {
        fn failing(authorities: &[&str]) -> Self {
            Self {
                failing: authorities.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn send(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
            let authority = request.uri().authority().map(|a| a.to_string()).unwrap_or_default();
            let path = request
                .uri()
                .path_and_query()
                .map(|p| p.to_string())
                .unwrap_or_default();
            self.calls.lock().unwrap().push((authority.clone(), path));
            *self.last_headers.lock().unwrap() = Some(request.headers().clone());

            let status = if self.failing.contains(&authority) {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            let mut response = Response::new(Body::from(authority));
            *response.status_mut() = status;
            Ok(response)
        }
    }

    fn cache(instances: &[(&str, &str, u16)]) -> Arc<InstanceCache> {
        let cache = Arc::new(InstanceCache::new(3));
        cache.replace(
            instances
                .iter()
                .map(|(service, id, port)| {
                    ServiceInstance::new(*service, *id, &format!("127.0.0.1:{port}")).unwrap()
                })
                .collect(),
        );
        cache
    }

    fn config(routes: Vec<RouteConfig>) -> GatewayConfig {
        let mut config = GatewayConfig {
            routes,
            ..GatewayConfig::default()
        };
        config.retries.base_delay_ms = 1;
        config.retries.max_delay_ms = 2;
        config
    }

    fn dispatcher(
        routes: Vec<RouteConfig>,
        registry: Arc<InstanceCache>,
        upstream: Arc<MockUpstream>,
    ) -> Dispatcher {
        Dispatcher::new(&config(routes), registry, upstream).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn json(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unknown_path_is_structured_404() {
        let upstream = Arc::new(MockUpstream::default());
        let d = dispatcher(
            vec![RouteConfig::new("auth", "/api/auth/**", "auth-service")],
            cache(&[]),
            upstream.clone(),
        );

        let response = d.dispatch(get("/api/nothing"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["path"], "/api/nothing");
        assert!(upstream.calls().is_empty());
        assert_eq!(d.stats().unrouted_count(), 1);
    }

    #[tokio::test]
    async fn forwards_path_query_and_headers() {
        let upstream = Arc::new(MockUpstream::default());
        let mut route = RouteConfig::new("auth", "/api/auth/**", "auth-service");
        route.strip_prefix = true;
        let d = dispatcher(vec![route], cache(&[("auth-service", "a", 9101)]), upstream.clone());

        let request = Request::builder()
            .uri("/api/auth/login?next=home")
            .header(header::HOST, "gateway.local")
            .header(header::CONNECTION, "close")
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        let response = d.dispatch(request, Some(peer)).await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            upstream.calls(),
            [("127.0.0.1:9101".to_string(), "/login?next=home".to_string())]
        );
        let headers = upstream.last_headers.lock().unwrap().clone().unwrap();
        assert_eq!(headers[header::HOST], "127.0.0.1:9101");
        assert_eq!(headers["x-forwarded-for"], "192.0.2.10");
        assert_eq!(headers["x-forwarded-host"], "gateway.local");
        assert!(!headers.contains_key(header::CONNECTION));
    }

    #[tokio::test]
    async fn breaker_opens_and_short_circuits() {
        let upstream = Arc::new(MockUpstream::failing(&["127.0.0.1:9201"]));
        let d = dispatcher(
            vec![RouteConfig::new("auth", "/api/auth/**", "auth-service")],
            cache(&[("auth-service", "a", 9201)]),
            upstream.clone(),
        );

        for _ in 0..10 {
            let response = d.dispatch(get("/api/auth/me"), None).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        let response = d.dispatch(get("/api/auth/me"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["service"], "Auth Service");

        assert_eq!(upstream.calls().len(), 10);
        let counts = d.stats().counts("auth");
        assert_eq!(counts.server_errors, 10);
        assert_eq!(counts.short_circuited, 1);
    }

    #[tokio::test]
    async fn idempotent_failure_retries_on_other_instance() {
        let upstream = Arc::new(MockUpstream::failing(&["127.0.0.1:9301"]));
        let d = dispatcher(
            vec![RouteConfig::new("users", "/api/users/**", "user-service")],
            cache(&[("user-service", "a", 9301), ("user-service", "b", 9302)]),
            upstream.clone(),
        );

        let response = d.dispatch(get("/api/users/1"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let hosts: Vec<_> = upstream.calls().into_iter().map(|(a, _)| a).collect();
        assert_eq!(hosts, ["127.0.0.1:9301", "127.0.0.1:9302"]);
        assert_eq!(d.stats().counts("users").retries, 1);
    }

    #[tokio::test]
    async fn post_is_never_retried() {
        let upstream = Arc::new(MockUpstream::failing(&["127.0.0.1:9401"]));
        let d = dispatcher(
            vec![RouteConfig::new("users", "/api/users/**", "user-service")],
            cache(&[("user-service", "a", 9401), ("user-service", "b", 9402)]),
            upstream.clone(),
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/users")
            .body(Body::from("{}"))
            .unwrap();
        let response = d.dispatch(request, None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn no_instances_yields_named_fallback() {
        let upstream = Arc::new(MockUpstream::default());
        let d = dispatcher(
            vec![RouteConfig::new("users", "/api/users/**", "user-service")],
            cache(&[("auth-service", "a", 9501)]),
            upstream.clone(),
        );

        let response = d.dispatch(get("/api/users/7"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(response).await;
        assert_eq!(body["service"], "User Service");
        assert_eq!(
            body["message"],
            "User Service is temporarily unavailable. Please try again later."
        );
        assert_eq!(d.stats().counts("users").no_instance, 1);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_requests_skip_the_breaker() {
        let upstream = Arc::new(MockUpstream::default());
        let mut route = RouteConfig::new("crm", "/api/crm/**", "crm-service");
        route.rate_limit = Some(RateLimitConfig {
            capacity: 2,
            refill_per_sec: 0.5,
            ..RateLimitConfig::default()
        });
        route.circuit_breaker = Some(CircuitBreakerConfig {
            min_samples: 1,
            ..CircuitBreakerConfig::default()
        });
        let d = dispatcher(vec![route], cache(&[("crm-service", "c", 9601)]), upstream.clone());

        assert_eq!(d.dispatch(get("/api/crm/a"), None).await.status(), StatusCode::OK);
        assert_eq!(d.dispatch(get("/api/crm/b"), None).await.status(), StatusCode::OK);

        let limited = d.dispatch(get("/api/crm/c"), None).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[header::RETRY_AFTER], "2");

        let breaker = d.breakers().get("crm").unwrap();
        assert_eq!(breaker.snapshot().failures_in_window, 0);
        assert_eq!(upstream.calls().len(), 2);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let upstream = Arc::new(MockUpstream::default());
        let mut config = config(vec![RouteConfig::new("crm", "/api/crm/**", "crm-service")]);
        config.limits.max_body_bytes = 8;
        let d = Dispatcher::new(&config, cache(&[("crm-service", "c", 9701)]), upstream.clone()).unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/crm/leads")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = d.dispatch(request, None).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_beyond_ceiling_is_not_routed() {
        let upstream = Arc::new(MockUpstream::default());
        let registry = cache(&[("crm-service", "c", 9801)]);
        registry.mark_stale();

        let mut config = config(vec![RouteConfig::new("crm", "/api/crm/**", "crm-service")]);
        config.registry.max_staleness_secs = Some(0);
        let d = Dispatcher::new(&config, registry.clone(), upstream.clone()).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = d.dispatch(get("/api/crm/x"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(upstream.calls().is_empty());

        config.registry.max_staleness_secs = None;
        d.apply_config(&config).unwrap();
        assert_eq!(d.dispatch(get("/api/crm/x"), None).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_reload_keeps_current_table() {
        let upstream = Arc::new(MockUpstream::default());
        let d = dispatcher(
            vec![RouteConfig::new("crm", "/api/crm/**", "crm-service")],
            cache(&[("crm-service", "c", 9901)]),
            upstream,
        );

        let broken = config(vec![RouteConfig::new("", "api", "")]);
        assert!(d.apply_config(&broken).is_err());
        assert!(d.routes().get("crm").is_some());
    }

    #[tokio::test]
    async fn open_breaker_blocks_the_retry() {
        let upstream = Arc::new(MockUpstream::failing(&["127.0.0.1:9311"]));
        let mut route = RouteConfig::new("users", "/api/users/**", "user-service");
        route.circuit_breaker = Some(CircuitBreakerConfig {
            min_samples: 1,
            ..CircuitBreakerConfig::default()
        });
        let d = dispatcher(
            vec![route],
            cache(&[("user-service", "a", 9311), ("user-service", "b", 9312)]),
            upstream.clone(),
        );

        let response = d.dispatch(get("/api/users/1"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["service"], "User Service");

        let hosts: Vec<_> = upstream.calls().into_iter().map(|(a, _)| a).collect();
        assert_eq!(hosts, ["127.0.0.1:9311"]);
        assert_eq!(d.stats().counts("users").retries, 0);
        assert_eq!(d.breakers().get("users").unwrap().mode(), BreakerMode::Open);
    }

    #[tokio::test]
    async fn instance_stays_in_flight_until_body_is_read() {
        let upstream = Arc::new(MockUpstream::default());
        let d = dispatcher(
            vec![RouteConfig::new("users", "/api/users/**", "user-service")],
            cache(&[("user-service", "a", 9321)]),
            upstream,
        );
        let instance = ServiceInstance::new("user-service", "a", "127.0.0.1:9321").unwrap();

        let response = d.dispatch(get("/api/users/1"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(d.balancer().outstanding().in_flight(&instance), 1);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"127.0.0.1:9321");
        assert_eq!(d.balancer().outstanding().in_flight(&instance), 0);
    }
}
