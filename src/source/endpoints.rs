//! Endpoint routing: each accepted message goes to at most one endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::Router;

use crate::http::response::{Reply, DEFAULT_RESPONSE_MESSAGE};
use crate::routing::EndpointRouter;
use crate::source::SourceContext;

/// Source backed by an [`EndpointRouter`].
#[derive(Debug, Clone)]
pub struct EndpointSource {
    context: SourceContext,
    router: Arc<EndpointRouter>,
}

impl EndpointSource {
    pub fn new(context: SourceContext, router: Arc<EndpointRouter>) -> Self {
        Self { context, router }
    }

    pub fn router(&self) -> &EndpointRouter {
        &self.router
    }

    /// Axum app answering every path and method.
    pub fn into_router(self) -> Router {
        Router::new().fallback(handle).with_state(Arc::new(self))
    }
}

async fn handle(
    State(source): State<Arc<EndpointSource>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Reply {
    let context = &source.context;
    let (message, pending) = match context.accept(request, remote).await {
        Ok(accepted) => accepted,
        Err(reply) => return context.finish(reply),
    };

    if !source.router.deliver(message.clone()) {
        tracing::warn!(
            source = %context.name(),
            method = %message.method(),
            path = %message.path(),
            "No endpoint matched"
        );
        let reply = if context.auto_respond() {
            Reply::text(StatusCode::OK, DEFAULT_RESPONSE_MESSAGE)
        } else {
            Reply::not_found()
        };
        return context.finish(reply);
    }

    context.finish(pending.wait(context.response_timeout()).await)
}
