//! Path sources: several sources share one listener per bind address.
//!
//! Each source owns a `(method, path)` key (or glob) on the listener and a
//! queue of accepted messages. The listener builds the message, finds the
//! owning source, checks that source's authorization and enqueues.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::{GatewayConfig, SourceConfig, TlsConfig};
use crate::http::response::{parse_status, Reply};
use crate::message::{Message, MessageBuilder};
use crate::observability::metrics;
use crate::routing::PathRouter;
use crate::security::Authorizer;
use crate::source::{Callbacks, SourceError};

const MODE: &str = "paths";

/// Messages buffered per path source before the listener waits.
const QUEUE_CAPACITY: usize = 1024;

const QUEUE_FULL: &str = "Source queue is full";

#[derive(Debug)]
struct PathEntry {
    source: String,
    authorizer: Authorizer,
    queue: mpsc::Sender<Arc<Message>>,
    auto_reply: Option<Reply>,
}

/// Listener shared by every path source on one bind address.
#[derive(Debug)]
pub struct PathsListener {
    address: String,
    tls: Option<TlsConfig>,
    builder: MessageBuilder,
    response_timeout: std::time::Duration,
    queue_capacity: usize,
    routes: PathRouter<Arc<PathEntry>>,
}

impl PathsListener {
    pub fn new(address: impl Into<String>, gateway: &GatewayConfig) -> Self {
        Self {
            address: address.into(),
            tls: None,
            builder: MessageBuilder::new(gateway.security.max_body_size),
            response_timeout: std::time::Duration::from_secs(gateway.timeouts.response_secs),
            queue_capacity: QUEUE_CAPACITY,
            routes: PathRouter::new(),
        }
    }

    /// Queue size for sources registered after this call.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// TLS settings of the first registered source that has them.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Claim the source's `(method, path)` on this listener.
    pub fn register(&mut self, config: &SourceConfig) -> Result<PathSource, SourceError> {
        let method_name = config.method.as_deref().unwrap_or("get");
        let method = Method::from_str(&method_name.to_ascii_uppercase()).map_err(|_| SourceError::Method {
            source_name: config.name.clone(),
            method: method_name.to_string(),
        })?;
        let path = config.path.as_deref().unwrap_or("/");

        let authorizer = Authorizer::from_config(config.authorization.as_ref()).map_err(|error| {
            SourceError::Authorization {
                source_name: config.name.clone(),
                error,
            }
        })?;
        let auto_reply = if config.auto_respond {
            let code = parse_status(&config.response.code).ok_or_else(|| SourceError::ResponseCode {
                source_name: config.name.clone(),
                code: config.response.code.clone(),
            })?;
            Some(Reply::text(code, config.response.message.clone()))
        } else {
            None
        };

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let entry = Arc::new(PathEntry {
            source: config.name.clone(),
            authorizer,
            queue: tx,
            auto_reply,
        });

        let inserted = self
            .routes
            .insert(method.clone(), path, entry)
            .map_err(|error| SourceError::PathPattern {
                source_name: config.name.clone(),
                error,
            })?;
        if !inserted {
            return Err(SourceError::PathConflict {
                source_name: config.name.clone(),
                method: method.to_string(),
                path: path.to_string(),
                address: self.address.clone(),
            });
        }
        if self.tls.is_none() {
            self.tls = config.tls.clone();
        }

        tracing::debug!(source = %config.name, method = %method, path = %path, address = %self.address, "Path source registered");
        Ok(PathSource {
            name: config.name.clone(),
            queue: Mutex::new(rx),
        })
    }

    /// Axum app answering every path and method on this listener.
    pub fn into_router(self) -> Router {
        Router::new().fallback(handle).with_state(Arc::new(self))
    }
}

async fn handle(
    State(listener): State<Arc<PathsListener>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Reply {
    let reply = dispatch(&listener, request, remote).await;
    metrics::record_request(MODE, reply.status().as_u16());
    reply
}

async fn dispatch(listener: &PathsListener, request: Request<Body>, remote: SocketAddr) -> Reply {
    let (message, pending) = match listener.builder.build(request, remote).await {
        Ok(built) => built,
        Err(e) => {
            tracing::warn!(address = %listener.address, error = %e, "Failed to process request");
            return Reply::bad_request(e);
        }
    };

    let Some(entry) = listener.routes.get(message.method(), message.path()) else {
        tracing::warn!(
            address = %listener.address,
            method = %message.method(),
            path = %message.path(),
            "Requested path not found"
        );
        return Reply::not_found();
    };

    if !entry.authorizer.authorize(&message) {
        metrics::record_authorization_denied(&entry.source);
        return Reply::unauthorized();
    }

    // A full queue waits at most the response timeout, so the client is
    // always answered.
    let message = Arc::new(message);
    match tokio::time::timeout(listener.response_timeout, entry.queue.send(message.clone())).await {
        Ok(Ok(())) => {
            tracing::debug!(source = %entry.source, message_id = %message.id(), "Message queued");
        }
        Ok(Err(_)) => {
            tracing::error!(source = %entry.source, message_id = %message.id(), "Path source queue closed");
            return Reply::text(StatusCode::SERVICE_UNAVAILABLE, "Source is not accepting messages");
        }
        Err(_) => {
            tracing::warn!(source = %entry.source, message_id = %message.id(), "Path source queue full, message dropped");
            return Reply::text(StatusCode::SERVICE_UNAVAILABLE, QUEUE_FULL);
        }
    }

    if let Some(reply) = &entry.auto_reply {
        message.respond(reply.clone());
    }
    pending.wait(listener.response_timeout).await
}

/// Consumer side of a path source.
#[derive(Debug)]
pub struct PathSource {
    name: String,
    queue: Mutex<mpsc::Receiver<Arc<Message>>>,
}

impl PathSource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next accepted message; `None` once the listener is gone.
    pub async fn receive(&self) -> Option<Arc<Message>> {
        self.queue.lock().await.recv().await
    }

    /// Feed queued messages to `callbacks`, one message at a time, until
    /// shutdown or until the listener is gone.
    pub async fn run(self: Arc<Self>, callbacks: Callbacks, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(source = %self.name, callbacks = callbacks.len(), "Path source processing");
        loop {
            tokio::select! {
                message = self.receive() => {
                    let Some(message) = message else { break };
                    callbacks.dispatch(message).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(source = %self.name, "Path source received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
