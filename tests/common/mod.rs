//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use jsonwebtoken::{encode, EncodingKey, Header};
use strategy_gateway::config::{
    ApiKeyConfig, GatewayConfig, Role, ServiceConfig, TrafficClass,
};
use strategy_gateway::observability::events::EventPublishError;
use strategy_gateway::observability::{EventSink, GatewayEvent};
use strategy_gateway::security::auth::Claims;
use strategy_gateway::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const API_KEY: &str = "test-api-key";
pub const JWT_SECRET: &str = "integration-secret";

/// Start a programmable mock backend on an ephemeral port.
///
/// The handler receives the raw request head and returns `(status, body)`.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(head).await;
                        let response = format!(
                            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that always answers 200 with `body`.
#[allow(dead_code)]
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// An address nothing is listening on.
#[allow(dead_code)]
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

/// Gateway config with a single `intake` service pointing at `backend`.
#[allow(dead_code)]
pub fn gateway_config(backend: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.services = vec![ServiceConfig {
        name: "intake".into(),
        base_url: format!("http://{backend}"),
        timeout_ms: 2_000,
        traffic_class: TrafficClass::General,
        required_permissions: vec![],
        circuit_breaker: None,
    }];
    config.auth.api_keys = vec![ApiKeyConfig {
        key: API_KEY.into(),
        subject: "integration-suite".into(),
        role: Role::Service,
        permissions: vec!["intake:write".into()],
    }];
    config.auth.jwt_secret = JWT_SECRET.into();
    config.observability.metrics_enabled = false;
    config
}

/// Sign a token the gateway accepts (or not, with a negative `ttl_secs`).
#[allow(dead_code)]
pub fn token(subject: &str, permissions: &[&str], ttl_secs: i64) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    let claims = Claims {
        sub: subject.into(),
        exp: (now + ttl_secs) as u64,
        iss: "strategy-platform".into(),
        aud: "strategy-gateway".into(),
        role: Role::User,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

/// Event sink that keeps everything it receives.
#[allow(dead_code)]
#[derive(Default)]
pub struct CollectingSink(Mutex<Vec<GatewayEvent>>);

#[allow(dead_code)]
impl CollectingSink {
    /// Wait until at least `n` events arrived, then return them.
    pub async fn wait_for(&self, n: usize) -> Vec<GatewayEvent> {
        for _ in 0..200 {
            {
                let events = self.0.lock().unwrap();
                if events.len() >= n {
                    return events.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} events, got {:?}", self.0.lock().unwrap());
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    fn name(&self) -> &'static str {
        "collect"
    }

    async fn deliver(&self, event: &GatewayEvent) -> Result<(), EventPublishError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Serve `config` on an ephemeral port.
#[allow(dead_code)]
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    serve(HttpServer::new(config).unwrap()).await
}

/// Serve `config`, also delivering lifecycle events to the returned sink.
#[allow(dead_code)]
pub async fn start_gateway_with_events(
    config: GatewayConfig,
) -> (SocketAddr, Shutdown, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let mut server = HttpServer::new(config).unwrap();
    server.add_event_sink(sink.clone());
    let (addr, shutdown) = serve(server).await;
    (addr, shutdown, sink)
}

#[allow(dead_code)]
async fn serve(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}
