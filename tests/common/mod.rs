//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use service_gateway::config::{GatewayConfig, RouteConfig, StaticInstanceConfig};
use service_gateway::registry::HealthStatus;
use service_gateway::{GatewayServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A raw-TCP backend answering every request with a scripted response.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Number of requests the backend has answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start a backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| (200, body.to_string())).await
}

/// Start a backend whose response depends on the zero-based call index.
pub async fn start_programmable_backend<F>(respond: F) -> MockBackend
where
    F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let counter = calls.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let counter = counter.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                let _ = serve_one(socket, counter, respond).await;
            });
        }
    });

    MockBackend { addr, calls }
}

async fn serve_one<F>(
    mut socket: TcpStream,
    counter: Arc<AtomicUsize>,
    respond: Arc<F>,
) -> std::io::Result<()>
where
    F: Fn(usize) -> (u16, String),
{
    read_request(&mut socket).await?;
    let index = counter.fetch_add(1, Ordering::SeqCst);
    let (status, body) = respond(index);

    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Consume the request head and any Content-Length body.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let mut have = buf.len() - (end + 4);
            while have < length {
                let n = socket.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                have += n;
            }
            return Ok(());
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Static instance entry for a mock backend.
pub fn instance(service: &str, id: &str, backend: &MockBackend) -> StaticInstanceConfig {
    StaticInstanceConfig {
        service: service.to_string(),
        id: Some(id.to_string()),
        address: backend.addr.to_string(),
        status: HealthStatus::Up,
    }
}

/// A configuration with fast retries and the given routes and instances.
pub fn gateway_config(routes: Vec<RouteConfig>, instances: Vec<StaticInstanceConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.routes = routes;
    config.registry.instances = instances;
    config.retries.base_delay_ms = 5;
    config.retries.max_delay_ms = 10;
    config.timeouts.upstream_ms = 2_000;
    config
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub config_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Arc::new(Shutdown::new());
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let server = GatewayServer::new(config).expect("gateway should build");

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        config_tx,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
