//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ingress_gateway::config::{parse_config, GatewayConfig};

/// Request as seen by a mock backend.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

type BackendReply = std::pin::Pin<Box<dyn Future<Output = (u16, String)> + Send>>;
type Respond = Arc<dyn Fn() -> BackendReply + Send + Sync>;

/// Start a programmable mock backend. Every request is reported on the
/// returned channel and answered with whatever `f` produces.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(
    addr: SocketAddr,
    f: F,
) -> (SocketAddr, mpsc::UnboundedReceiver<Captured>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let local = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let respond: Respond = Arc::new(move || -> BackendReply { Box::pin(f()) });

    let app = Router::new()
        .fallback(
            |State((tx, respond)): State<(mpsc::UnboundedSender<Captured>, Respond)>, request: Request<Body>| async move {
                let (parts, body) = request.into_parts();
                let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
                let _ = tx.send(Captured {
                    method: parts.method.to_string(),
                    path: parts.uri.path().to_string(),
                    authorization: parts
                        .headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
                let (status, body) = respond().await;
                (StatusCode::from_u16(status).unwrap_or(StatusCode::OK), body)
            },
        )
        .with_state((tx, respond));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (local, rx)
}

/// Parse a TOML config, pointing every source's retry store into `dir`.
#[allow(dead_code)]
pub fn config_with_retry_dir(toml: &str, dir: &Path) -> GatewayConfig {
    let mut config = parse_config(toml).unwrap();
    for source in &mut config.sources {
        source.retry_directory = dir.to_path_buf();
    }
    config
}

/// Poll `check` until it holds or the deadline passes.
#[allow(dead_code)]
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Client that never reuses connections between tests.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
