//! Flat dispatch: every accepted message goes to every callback.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::Router;

use crate::http::response::{Reply, DEFAULT_RESPONSE_MESSAGE};
use crate::source::{Callbacks, SourceContext};

/// Source that fans each message out to all callbacks.
#[derive(Debug, Clone)]
pub struct CallbackSource {
    context: SourceContext,
    callbacks: Callbacks,
}

impl CallbackSource {
    pub fn new(context: SourceContext, callbacks: Callbacks) -> Self {
        Self { context, callbacks }
    }

    pub fn context(&self) -> &SourceContext {
        &self.context
    }

    /// Axum app answering every path and method.
    pub fn into_router(self) -> Router {
        Router::new().fallback(handle).with_state(Arc::new(self))
    }
}

async fn handle(
    State(source): State<Arc<CallbackSource>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Reply {
    let context = &source.context;
    let (message, pending) = match context.accept(request, remote).await {
        Ok(accepted) => accepted,
        Err(reply) => return context.finish(reply),
    };

    let callbacks = source.callbacks.clone();
    let auto_respond = context.auto_respond();
    tokio::spawn(async move {
        callbacks.dispatch(message.clone()).await;
        if auto_respond {
            message.respond(Reply::text(StatusCode::OK, DEFAULT_RESPONSE_MESSAGE));
        }
    });

    context.finish(pending.wait(context.response_timeout()).await)
}
