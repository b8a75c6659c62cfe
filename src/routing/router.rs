//! Endpoint lookup and dispatch.
//!
//! # Responsibilities
//! - Store endpoints per HTTP method, static and pattern separately
//! - Look up the endpoint for a message and return its captures
//! - Dispatch matched messages to the endpoint's workers
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Static endpoints are checked before patterns
//! - First match in registration order wins
//! - Explicit no-match rather than a silent default

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;

use crate::message::Message;
use crate::routing::endpoint::{Concurrency, Endpoint, Handler};
use crate::routing::matcher::PathMatcher;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("endpoint {method} {path} registered twice")]
    Conflict { method: Method, path: String },

    #[error("invalid endpoint pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown HTTP method `{0}`")]
    UnknownMethod(String),
}

/// Path part of an endpoint registration.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    pattern: bool,
    workers: usize,
}

impl Route {
    /// Literal path; a trailing slash is ignored.
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pattern: false,
            workers: 1,
        }
    }

    /// Regular expression matched against the whole request path.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            path: pattern.into(),
            pattern: true,
            workers: 1,
        }
    }

    /// Worker count; more than one runs the endpoint as a pool.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    fn matcher(&self) -> Result<PathMatcher, RouterError> {
        if self.pattern {
            PathMatcher::pattern(&self.path).map_err(|source| RouterError::InvalidPattern {
                pattern: self.path.clone(),
                source,
            })
        } else {
            Ok(PathMatcher::literal(self.path.as_str()))
        }
    }
}

impl From<&str> for Route {
    fn from(path: &str) -> Self {
        Route::path(path)
    }
}

impl From<String> for Route {
    fn from(path: String) -> Self {
        Route::path(path)
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub endpoint: Arc<Endpoint>,
    pub captures: Vec<String>,
}

#[derive(Debug, Default)]
struct MethodTable {
    statics: Vec<Arc<Endpoint>>,
    patterns: Vec<Arc<Endpoint>>,
}

/// Router holding every enabled endpoint.
#[derive(Debug, Default)]
pub struct EndpointRouter {
    tables: HashMap<Method, MethodTable>,
}

impl EndpointRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Find the endpoint for `method` and `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let table = self.tables.get(method)?;
        table
            .statics
            .iter()
            .chain(table.patterns.iter())
            .find_map(|endpoint| {
                endpoint.matcher().captures(path).map(|captures| RouteMatch {
                    endpoint: endpoint.clone(),
                    captures,
                })
            })
    }

    /// Match the message and hand it to the endpoint on a spawned task.
    ///
    /// Returns false when no endpoint matched; the caller decides the reply.
    pub fn deliver(&self, message: Arc<Message>) -> bool {
        let Some(route) = self.find(message.method(), message.path()) else {
            return false;
        };
        tracing::debug!(
            message_id = %message.id(),
            endpoint = %route.endpoint.name(),
            path = %message.path(),
            "Delivering message to endpoint"
        );
        // Serial submits return after the handler ran; the caller's reply
        // wait runs alongside.
        tokio::spawn(async move {
            route.endpoint.submit(message, route.captures).await;
        });
        true
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.tables
            .values()
            .map(|t| t.statics.len() + t.patterns.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Registration {
    definition: String,
    method: Method,
    matcher: PathMatcher,
    concurrency: Concurrency,
    handler: Arc<dyn Handler>,
}

macro_rules! verb {
    ($($name:ident => $method:expr),* $(,)?) => {
        $(
            pub fn $name<H: Handler>(
                &mut self,
                route: impl Into<Route>,
                handler: H,
            ) -> Result<&mut Self, RouterError> {
                self.route($method, route.into(), handler)
            }
        )*
    };
}

/// Collects endpoint registrations; `build` spawns the workers.
#[derive(Default)]
pub struct RouterBuilder {
    definition: String,
    registrations: Vec<Registration>,
}

impl RouterBuilder {
    verb! {
        get => Method::GET,
        put => Method::PUT,
        post => Method::POST,
        delete => Method::DELETE,
        head => Method::HEAD,
        options => Method::OPTIONS,
        trace => Method::TRACE,
        patch => Method::PATCH,
    }

    /// Register using a method name such as `"get"` or `"POST"`.
    pub fn method<H: Handler>(
        &mut self,
        method: &str,
        route: impl Into<Route>,
        handler: H,
    ) -> Result<&mut Self, RouterError> {
        let method = Method::from_str(&method.to_ascii_uppercase())
            .map_err(|_| RouterError::UnknownMethod(method.to_string()))?;
        self.route(method, route.into(), handler)
    }

    pub fn route<H: Handler>(
        &mut self,
        method: Method,
        route: Route,
        handler: H,
    ) -> Result<&mut Self, RouterError> {
        let matcher = route.matcher()?;
        if self
            .registrations
            .iter()
            .any(|r| r.method == method && r.matcher == matcher)
        {
            return Err(RouterError::Conflict {
                method,
                path: matcher.to_string(),
            });
        }
        self.registrations.push(Registration {
            definition: self.definition.clone(),
            method,
            matcher,
            concurrency: Concurrency::from_workers(route.workers),
            handler: Arc::new(handler),
        });
        Ok(self)
    }

    /// Name recorded on endpoints registered from now on.
    pub(crate) fn set_definition(&mut self, name: &str) {
        self.definition = name.to_string();
    }

    /// Spawn every endpoint. Must be called inside a Tokio runtime.
    pub fn build(self) -> EndpointRouter {
        let mut tables: HashMap<Method, MethodTable> = HashMap::new();
        for r in self.registrations {
            let is_static = r.matcher.is_static();
            let endpoint = Arc::new(Endpoint::spawn(
                r.definition,
                r.method.clone(),
                r.matcher,
                r.concurrency,
                r.handler,
            ));
            let table = tables.entry(r.method).or_default();
            if is_static {
                table.statics.push(endpoint);
            } else {
                table.patterns.push(endpoint);
            }
        }
        EndpointRouter { tables }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::endpoint::HandlerError;
    use tokio::sync::mpsc;

    type Seen = mpsc::UnboundedSender<(&'static str, Vec<String>)>;

    fn recorder(tag: &'static str, tx: Seen) -> impl Handler {
        move |_msg: Arc<Message>, captures: Vec<String>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((tag, captures));
                Ok::<(), HandlerError>(())
            }
        }
    }

    #[tokio::test]
    async fn test_pattern_wins_over_static_prefix() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut builder = EndpointRouter::builder();
        builder.get("/a", recorder("static", tx.clone())).unwrap();
        builder
            .get(Route::pattern("/a/(.+)"), recorder("pattern", tx.clone()))
            .unwrap();
        let router = builder.build();

        let message = Arc::new(Message::new(Method::GET, "/a/b"));
        assert!(router.deliver(message));
        assert_eq!(rx.recv().await.unwrap(), ("pattern", vec!["b".to_string()]));

        let message = Arc::new(Message::new(Method::GET, "/a/"));
        assert!(router.deliver(message));
        assert_eq!(rx.recv().await.unwrap(), ("static", vec![]));
    }

    #[tokio::test]
    async fn test_method_and_path_must_match() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut builder = EndpointRouter::builder();
        builder.post("/jobs", recorder("jobs", tx)).unwrap();
        let router = builder.build();

        assert!(router.find(&Method::POST, "/jobs").is_some());
        assert!(router.find(&Method::GET, "/jobs").is_none());
        assert!(router.find(&Method::POST, "/other").is_none());
        assert!(!router.deliver(Arc::new(Message::new(Method::GET, "/jobs"))));
    }

    #[tokio::test]
    async fn test_first_registered_pattern_wins() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut builder = EndpointRouter::builder();
        builder.set_definition("first");
        builder
            .get(Route::pattern("/items/(.*)"), recorder("first", tx.clone()))
            .unwrap();
        builder.set_definition("second");
        builder
            .get(Route::pattern(r"/items/(\d+)"), recorder("second", tx))
            .unwrap();
        let router = builder.build();

        let found = router.find(&Method::GET, "/items/7").unwrap();
        assert_eq!(found.endpoint.name(), "first");
        assert_eq!(found.captures, vec!["7".to_string()]);
    }

    #[test]
    fn test_registration_errors() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut builder = EndpointRouter::builder();
        builder.get("/dup/", recorder("a", tx.clone())).unwrap();
        assert!(matches!(
            builder.get("/dup", recorder("b", tx.clone())),
            Err(RouterError::Conflict { .. })
        ));
        assert!(matches!(
            builder.get(Route::pattern("(unclosed"), recorder("c", tx.clone())),
            Err(RouterError::InvalidPattern { .. })
        ));
        assert!(matches!(
            builder.method("fetch me", "/x", recorder("d", tx.clone())),
            Err(RouterError::UnknownMethod(_))
        ));
        // Same path under another method is fine.
        assert!(builder.method("post", "/dup", recorder("e", tx)).is_ok());
    }

    #[tokio::test]
    async fn test_pooled_route_registration() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut builder = EndpointRouter::builder();
        builder
            .put(Route::path("/bulk").workers(4), recorder("bulk", tx))
            .unwrap();
        let router = builder.build();
        assert_eq!(router.len(), 1);
        let found = router.find(&Method::PUT, "/bulk").unwrap();
        assert_eq!(found.endpoint.concurrency(), Concurrency::Pooled(4));
    }
}
