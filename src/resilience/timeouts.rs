//! Timeout enforcement for replies.
//!
//! # Responsibilities
//! - Bound the wait for a handler-produced reply
//! - Always produce a reply, even when no handler answered
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - On timeout the responder slot is claimed first, so a late handler
//!   reply becomes a warned no-op instead of a second write
//! - Timed-out requests return 500 "Timeout waiting for response"

use std::time::Duration;

use tokio::sync::oneshot;

use crate::http::request::Responder;
use crate::http::response::Reply;

/// Wait up to `limit` for the reply sent through `responder`.
pub async fn await_reply(
    mut rx: oneshot::Receiver<Reply>,
    responder: &Responder,
    limit: Duration,
) -> Reply {
    match tokio::time::timeout(limit, &mut rx).await {
        Ok(Ok(reply)) => reply,
        // Every holder of the responder dropped it without replying.
        Ok(Err(_)) => Reply::timeout(),
        Err(_) => {
            if responder.claim() {
                tracing::warn!(timeout = ?limit, "Timeout waiting for response");
                Reply::timeout()
            } else {
                // A reply raced the timer and won; it is already in flight.
                rx.await.unwrap_or_else(|_| Reply::timeout())
            }
        }
    }
}
