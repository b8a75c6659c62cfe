//! HTTP sources.
//!
//! # Data Flow
//! ```text
//! axum fallback handler (request + remote address)
//!     → SourceContext::accept
//!         → MessageBuilder (400 on malformed body)
//!         → Authorizer (401 when denied)
//!     → callbacks.rs: fan out to every callback, auto-respond after
//!     → endpoints.rs: EndpointRouter lookup, 200/404 on no match
//!     → paths.rs:     shared listener, (method, path) → source queue
//!     → PendingReply::wait (500 on timeout)
//!
//! Outbound:
//!     transmit.rs → reply on open connection, or HTTP call
//!                 → on failure: RetryDelivery (persist + sweep)
//! ```
//!
//! # Design Decisions
//! - Authorization runs before any dispatch in every mode
//! - Every request gets exactly one reply
//! - Callback and handler failures stay inside their own task

pub mod callbacks;
pub mod endpoints;
pub mod paths;
pub mod transmit;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{GatewayConfig, SourceConfig};
use crate::http::request::PendingReply;
use crate::http::response::Reply;
use crate::message::{Message, MessageBuilder};
use crate::observability::metrics;
use crate::resilience::DeliveryError;
use crate::routing::{BoxFuture, HandlerError, RouterError};
use crate::security::{AuthorizationError, Authorizer};

pub use callbacks::CallbackSource;
pub use endpoints::EndpointSource;
pub use paths::{PathSource, PathsListener};
pub use transmit::{Transmission, TransmitError, TransmitOptions, Transmitter};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source `{source_name}`: {error}")]
    Authorization {
        source_name: String,
        #[source]
        error: AuthorizationError,
    },

    #[error("source `{source_name}`: unknown response code `{code}`")]
    ResponseCode { source_name: String, code: String },

    #[error("source `{source_name}`: invalid method `{method}`")]
    Method { source_name: String, method: String },

    #[error("source `{source_name}`: invalid path pattern: {error}")]
    PathPattern {
        source_name: String,
        #[source]
        error: glob::PatternError,
    },

    #[error("source `{source_name}`: {method} {path} is already served on {address}")]
    PathConflict {
        source_name: String,
        method: String,
        path: String,
        address: String,
    },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Application logic run for every message a callback source accepts.
pub trait Callback: Send + Sync + 'static {
    fn call(&self, message: Arc<Message>) -> BoxFuture<Result<(), HandlerError>>;
}

impl<F, Fut> Callback for F
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, message: Arc<Message>) -> BoxFuture<Result<(), HandlerError>> {
        Box::pin(self(message))
    }
}

/// Ordered set of named callbacks.
#[derive(Clone, Default)]
pub struct Callbacks {
    entries: Vec<(String, Arc<dyn Callback>)>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<C: Callback>(&mut self, name: impl Into<String>, callback: C) {
        self.entries.push((name.into(), Arc::new(callback)));
    }

    /// Append every callback of `other`.
    pub fn extend(&mut self, other: &Callbacks) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every callback on its own task and wait for all of them.
    /// Errors and panics are logged; they never reach the caller.
    pub async fn dispatch(&self, message: Arc<Message>) {
        let mut tasks = JoinSet::new();
        for (name, callback) in &self.entries {
            tracing::debug!(message_id = %message.id(), callback = %name, "Dispatching message to callback");
            let name = name.clone();
            let future = callback.call(message.clone());
            tasks.spawn(async move { (name, future.await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    tracing::error!(message_id = %message.id(), callback = %name, error = %e, "Callback failed");
                }
                Err(e) => {
                    tracing::error!(message_id = %message.id(), error = %e, "Callback panicked");
                }
            }
        }
    }
}

/// Per-source request intake shared by all modes.
#[derive(Debug, Clone)]
pub struct SourceContext {
    name: String,
    mode: &'static str,
    authorizer: Authorizer,
    builder: MessageBuilder,
    response_timeout: Duration,
    auto_respond: bool,
}

impl SourceContext {
    pub fn new(source: &SourceConfig, gateway: &GatewayConfig, mode: &'static str) -> Result<Self, SourceError> {
        let authorizer = Authorizer::from_config(source.authorization.as_ref()).map_err(|error| {
            SourceError::Authorization {
                source_name: source.name.clone(),
                error,
            }
        })?;

        Ok(Self {
            name: source.name.clone(),
            mode,
            authorizer,
            builder: MessageBuilder::new(gateway.security.max_body_size),
            response_timeout: Duration::from_secs(gateway.timeouts.response_secs),
            auto_respond: source.auto_respond,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &'static str {
        self.mode
    }

    pub fn auto_respond(&self) -> bool {
        self.auto_respond
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Build and authorize a message. `Err` carries the reply to send
    /// instead of dispatching.
    pub async fn accept(
        &self,
        request: Request<Body>,
        remote: SocketAddr,
    ) -> Result<(Arc<Message>, PendingReply), Reply> {
        let (message, pending) = match self.builder.build(request, remote).await {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "Failed to process request");
                return Err(Reply::bad_request(e));
            }
        };

        if !self.authorizer.authorize(&message) {
            metrics::record_authorization_denied(&self.name);
            return Err(Reply::unauthorized());
        }

        tracing::debug!(
            source = %self.name,
            message_id = %message.id(),
            method = %message.method(),
            path = %message.path(),
            "Message accepted"
        );
        Ok((Arc::new(message), pending))
    }

    /// Count the reply and hand it back.
    pub(crate) fn finish(&self, reply: Reply) -> Reply {
        metrics::record_request(self.mode, reply.status().as_u16());
        reply
    }
}
