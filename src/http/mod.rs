//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID + trace layers)
//!     → request.rs (request ID, Responder back-reference)
//!     → [source handler builds, authorizes and dispatches the message]
//!     → response.rs (Reply: status, body, content type)
//!     → Send to client
//! ```
//!
//! query.rs is the nested form codec used for query strings and
//! url-encoded bodies in both directions.

pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use query::QueryMap;
pub use request::{PendingReply, Responder, X_REQUEST_ID};
pub use response::{Reply, DEFAULT_RESPONSE_MESSAGE};
pub use server::HttpServer;
