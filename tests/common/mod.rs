//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use maegashira::config::schema::ProxyConfig;
use maegashira::lifecycle::{Shutdown, ShutdownReason};
use maegashira::proxy::middleware::Middleware;
use maegashira::routing::store::RoutingStore;
use maegashira::routing::schema::RoutingTable;
use maegashira::Primary;

/// Handles to a proxy cluster running inside the test process.
pub struct TestCluster {
    #[allow(dead_code)]
    pub store: Arc<RoutingStore>,
    pub shutdown: Shutdown,
}

impl TestCluster {
    /// Stop the cluster the way an operator signal would.
    pub fn stop(&self) {
        self.shutdown.trigger(ShutdownReason::Signal);
    }
}

/// Start a one-worker cluster with the management API enabled.
pub async fn start_proxy(
    public_port: u16,
    api_port: u16,
    api_key: &str,
    middlewares: Vec<Arc<dyn Middleware>>,
) -> TestCluster {
    let mut config = ProxyConfig::default();
    config.listener.hostname = "127.0.0.1".into();
    config.listener.port = public_port;
    config.listener.workers = 1;
    config.api.enabled = true;
    config.api.hostname = "127.0.0.1".into();
    config.api.port = api_port;
    config.api.key = api_key.into();

    let mut primary = Primary::new(config);
    for middleware in middlewares {
        primary.register_middleware(middleware);
    }

    let store = primary.store();
    let shutdown = primary.shutdown_handle();

    tokio::spawn(async move {
        let _ = primary.run().await;
    });

    wait_for_port(api_port).await;
    wait_for_port(public_port).await;

    TestCluster { store, shutdown }
}

/// Install a routing table from its JSON representation.
#[allow(dead_code)]
pub fn set_table(store: &RoutingStore, table_json: serde_json::Value) {
    let table: RoutingTable = serde_json::from_value(table_json).unwrap();
    store.set(table).unwrap();
}

/// Block until something is accepting connections on the port.
pub async fn wait_for_port(port: u16) {
    for _ in 0..200 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("port {port} did not come up");
}

/// Non-pooling client so each request sees the proxy fresh.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a simple mock backend that returns a fixed response.
#[allow(dead_code)]
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let _ = socket.read(&mut buf).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a programmable mock backend with async support.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that records each request line (`METHOD path HTTP/1.1`)
/// and the received headers, answering 200.
#[allow(dead_code)]
pub async fn start_capturing_backend(addr: SocketAddr) -> Arc<Mutex<Vec<String>>> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let captured = captured.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 16384];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let head = String::from_utf8_lossy(&buf[..n]).to_string();
                        captured.lock().unwrap().push(head);

                        let body = "upstream-ok";
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    seen
}
