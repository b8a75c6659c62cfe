//! Endpoints and their workers.
//!
//! # Responsibilities
//! - Bind a handler to a concurrency mode
//! - Run handlers on dedicated worker tasks fed by a job queue
//! - Contain handler errors and panics inside the worker
//!
//! # Design Decisions
//! - `Serial` endpoints own one worker; submitting waits for completion,
//!   which serializes requests in arrival order
//! - `Pooled(n)` endpoints share one queue across `n` workers; submitting
//!   returns once the job is queued
//! - Every handler invocation runs in its own task so a panic never takes
//!   the worker down

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::Method;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::message::Message;
use crate::observability::metrics;
use crate::routing::matcher::PathMatcher;

/// Error returned by endpoint handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Queue depth per endpoint before `submit` applies backpressure.
const JOB_QUEUE_CAPACITY: usize = 1024;

/// Application logic attached to an endpoint.
///
/// Receives the matched message and the positional captures of a pattern
/// endpoint (empty for static endpoints).
pub trait Handler: Send + Sync + 'static {
    fn call(&self, message: Arc<Message>, captures: Vec<String>) -> BoxFuture<Result<(), HandlerError>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<Message>, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, message: Arc<Message>, captures: Vec<String>) -> BoxFuture<Result<(), HandlerError>> {
        Box::pin(self(message, captures))
    }
}

/// Worker layout of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Serial,
    Pooled(usize),
}

impl Concurrency {
    /// `workers` greater than one gives a pool, anything else a single worker.
    pub fn from_workers(workers: usize) -> Self {
        if workers > 1 {
            Concurrency::Pooled(workers)
        } else {
            Concurrency::Serial
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            Concurrency::Serial => 1,
            Concurrency::Pooled(n) => *n,
        }
    }
}

struct Job {
    message: Arc<Message>,
    captures: Vec<String>,
    done: Option<oneshot::Sender<()>>,
}

/// A registered (method, matcher) binding with running workers.
pub struct Endpoint {
    name: String,
    method: Method,
    matcher: PathMatcher,
    concurrency: Concurrency,
    jobs: mpsc::Sender<Job>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("matcher", &self.matcher)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Endpoint {
    /// Create the endpoint and spawn its workers. Must be called inside a
    /// Tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        method: Method,
        matcher: PathMatcher,
        concurrency: Concurrency,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let label = format!("{} {}", method, matcher);

        for worker in 0..concurrency.workers() {
            let rx = rx.clone();
            let handler = handler.clone();
            let label = label.clone();
            tokio::spawn(async move {
                run_worker(label, worker, handler, rx).await;
            });
        }

        tracing::debug!(
            endpoint = %label,
            workers = concurrency.workers(),
            "Endpoint started"
        );

        Self {
            name,
            method,
            matcher,
            concurrency,
            jobs: tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Hand a message to the workers.
    ///
    /// Serial endpoints return after the handler finished; pooled endpoints
    /// return once the job is queued. Returns false if the workers are gone.
    pub async fn submit(&self, message: Arc<Message>, captures: Vec<String>) -> bool {
        match self.concurrency {
            Concurrency::Serial => {
                let (done_tx, done_rx) = oneshot::channel();
                let job = Job {
                    message,
                    captures,
                    done: Some(done_tx),
                };
                if self.jobs.send(job).await.is_err() {
                    return false;
                }
                done_rx.await.is_ok()
            }
            Concurrency::Pooled(_) => {
                let job = Job {
                    message,
                    captures,
                    done: None,
                };
                self.jobs.send(job).await.is_ok()
            }
        }
    }
}

async fn run_worker(
    label: String,
    worker: usize,
    handler: Arc<dyn Handler>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
) {
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };

        execute(&label, &handler, job.message, job.captures).await;

        if let Some(done) = job.done {
            let _ = done.send(());
        }
    }
    tracing::debug!(endpoint = %label, worker, "Endpoint worker stopped");
}

async fn execute(label: &str, handler: &Arc<dyn Handler>, message: Arc<Message>, captures: Vec<String>) {
    let message_id = message.id().to_string();
    let task = tokio::spawn(handler.call(message, captures));

    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(
                endpoint = %label,
                message_id = %message_id,
                error = %e,
                "Unexpected error encountered in endpoint"
            );
            metrics::record_endpoint_failure(label);
        }
        Err(e) if e.is_panic() => {
            tracing::error!(
                endpoint = %label,
                message_id = %message_id,
                "Endpoint handler panicked"
            );
            metrics::record_endpoint_failure(label);
        }
        Err(e) => {
            tracing::warn!(endpoint = %label, message_id = %message_id, error = %e, "Endpoint handler cancelled");
        }
    }
}
