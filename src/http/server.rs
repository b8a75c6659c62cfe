//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap a source's Axum app in the shared middleware stack
//!   (request ID, tracing, request ID propagation)
//! - Bind listeners up front so address errors surface at startup
//! - Serve plain HTTP through `axum::serve`, TLS through `axum-server`
//! - Stop accepting on the shutdown broadcast and drain open requests

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::http::request::{propagate_request_id_layer, request_id_layer};

/// Time granted to in-flight TLS connections once shutdown starts.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One listening HTTP(S) server.
#[derive(Clone)]
pub struct HttpServer {
    name: String,
    app: Router,
    tls: Option<RustlsConfig>,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("name", &self.name)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl HttpServer {
    pub fn new(name: impl Into<String>, app: Router) -> Self {
        let app = app.layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        );
        Self {
            name: name.into(),
            app,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Bind a TCP listener on `address` (`host:port`).
    pub async fn bind(address: &str) -> std::io::Result<TcpListener> {
        TcpListener::bind(address).await
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();

        match self.tls {
            None => {
                tracing::info!(server = %self.name, address = %addr, "HTTP server starting");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.recv().await;
                    })
                    .await?;
            }
            Some(tls) => {
                tracing::info!(server = %self.name, address = %addr, "HTTPS server starting");
                let handle = axum_server::Handle::new();
                let trigger = handle.clone();
                tokio::spawn(async move {
                    let _ = shutdown.recv().await;
                    trigger.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
                });
                axum_server::from_tcp_rustls(listener.into_std()?, tls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!(server = %self.name, address = %addr, "HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn serves_until_shutdown_with_request_id() {
        let app = Router::new().route("/", get(|| async { "hello" }));
        let server = HttpServer::new("test", app);
        let listener = HttpServer::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(server.run(listener, rx));

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.text().await.unwrap(), "hello");

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        assert!(HttpServer::bind("not-an-address").await.is_err());
    }
}
