//! Request identity and the response handle carried by inbound messages.
//!
//! # Responsibilities
//! - Generate or propagate `x-request-id` for every inbound request
//! - Provide the one-shot [`Responder`] that ties a message back to its
//!   open connection
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The first reply sent through a responder wins; later sends are
//!   rejected rather than queued

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use tokio::sync::oneshot;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::http::response::Reply;
use crate::resilience::timeouts::await_reply;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that assigns a UUID v4 request ID when the client sent none.
pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Extract the request ID from request headers.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Back-reference from a message to the connection awaiting its reply.
///
/// Cloning shares the same underlying slot, so exactly one reply can be
/// sent no matter how many holders exist.
#[derive(Debug, Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Reply>>>>,
}

impl Responder {
    /// Create a responder and the receiver the connection waits on.
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Send a reply. Returns `false` if a reply was already sent or the
    /// slot was claimed.
    pub fn send(&self, reply: Reply) -> bool {
        match self.take() {
            // The receiver may already be gone (client hung up); the slot is
            // still consumed so the message counts as answered.
            Some(tx) => {
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    /// Consume the slot without sending anything. Used by the timeout path
    /// so that late replies become no-ops.
    pub fn claim(&self) -> bool {
        self.take().is_some()
    }

    /// Whether a reply was sent (or the slot claimed).
    pub fn is_sent(&self) -> bool {
        self.slot
            .lock()
            .expect("responder mutex poisoned")
            .is_none()
    }

    fn take(&self) -> Option<oneshot::Sender<Reply>> {
        self.slot.lock().expect("responder mutex poisoned").take()
    }
}

/// Connection side of a [`Responder`]: waits for the one reply.
#[derive(Debug)]
pub struct PendingReply {
    responder: Responder,
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    pub(crate) fn new(responder: Responder, rx: oneshot::Receiver<Reply>) -> Self {
        Self { responder, rx }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Wait up to `limit` for the reply; a 500 timeout reply otherwise.
    pub async fn wait(self, limit: Duration) -> Reply {
        await_reply(self.rx, &self.responder, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn first_reply_wins() {
        let (responder, rx) = Responder::channel();
        let clone = responder.clone();

        assert!(responder.send(Reply::text(StatusCode::OK, "first")));
        assert!(!clone.send(Reply::text(StatusCode::OK, "second")));
        assert!(clone.is_sent());

        let reply = rx.await.unwrap();
        assert_eq!(reply.body(), "first");
    }

    #[tokio::test]
    async fn claim_blocks_later_replies() {
        let (responder, rx) = Responder::channel();
        assert!(responder.claim());
        assert!(!responder.send(Reply::text(StatusCode::OK, "late")));
        assert!(rx.await.is_err());
    }

    #[test]
    fn request_id_lookup() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), None);
        headers.insert(X_REQUEST_ID, "abc".parse().unwrap());
        assert_eq!(request_id(&headers).as_deref(), Some("abc"));
    }
}
