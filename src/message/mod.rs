//! Canonical message subsystem.
//!
//! # Data Flow
//! ```text
//! axum Request + remote address
//!     → builder.rs (headers, query, body dispatch, Basic auth)
//!     → Message (immutable, shared as Arc<Message>)
//!     → authorization → router / callbacks / path queues
//!     → Message::confirm / respond (one reply per message)
//! ```
//!
//! # Design Decisions
//! - Header keys are normalized once, at build time
//! - The reply slot lives on the message so handler code cannot answer twice

pub mod body;
pub mod builder;

use std::collections::BTreeMap;
use std::net::IpAddr;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;

use crate::http::query::QueryMap;
use crate::http::request::Responder;
use crate::http::response::Reply;

pub use body::{Body, SpooledBody};
pub use builder::{BuildError, MessageBuilder, INLINE_BODY_LIMIT, SPOOL_CHUNK_SIZE};

/// Credentials presented with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authentication {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Authentication {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

/// One inbound request in canonical form.
#[derive(Debug)]
pub struct Message {
    id: String,
    method: Method,
    path: String,
    headers: BTreeMap<String, String>,
    query: QueryMap,
    body: Body,
    origin: Option<IpAddr>,
    authentication: Authentication,
    responder: Option<Responder>,
}

impl Message {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            query: QueryMap::new(),
            body: Body::default(),
            origin: None,
            authentication: Authentication::default(),
            responder: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a header; the key is normalized like inbound headers are.
    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(builder::normalize_header_key(key), value.into());
        self
    }

    pub fn with_query(mut self, query: QueryMap) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_origin(mut self, origin: IpAddr) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Normalized headers (`Content-Type` is stored as `content_type`).
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&builder::normalize_header_key(key))
            .map(String::as_str)
    }

    pub fn query(&self) -> &QueryMap {
        &self.query
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn origin(&self) -> Option<IpAddr> {
        self.origin
    }

    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Reply handle of the originating connection, if any.
    pub fn responder(&self) -> Option<&Responder> {
        self.responder.as_ref()
    }

    /// Whether this message is tied to an open inbound connection.
    pub fn has_connection(&self) -> bool {
        self.responder.is_some()
    }

    /// Whether a reply has already gone out for this message.
    pub fn is_confirmed(&self) -> bool {
        self.responder.as_ref().map(Responder::is_sent).unwrap_or(false)
    }

    /// Send a reply if none was sent yet. Silent on repeat; returns whether
    /// this call produced the reply.
    pub fn respond(&self, reply: Reply) -> bool {
        self.responder
            .as_ref()
            .map(|responder| responder.send(reply))
            .unwrap_or(false)
    }

    /// Confirm processing of the message. Only the first confirmation is
    /// sent; repeats log a warning and do nothing else.
    pub fn confirm(&self, confirmation: Confirmation) -> bool {
        let Some(responder) = &self.responder else {
            tracing::warn!(message_id = %self.id, "Message has no open connection. Confirmation not sent!");
            return false;
        };

        let reply = confirmation.into_reply();
        tracing::debug!(
            message_id = %self.id,
            status = %reply.status(),
            "Confirming message"
        );
        if responder.send(reply) {
            true
        } else {
            tracing::warn!(message_id = %self.id, "Message was already confirmed. Confirmation not sent!");
            false
        }
    }
}

#[derive(Debug, Clone)]
enum ConfirmBody {
    Text(String),
    Json(Value),
    Form(QueryMap),
}

/// Options for [`Message::confirm`].
#[derive(Debug, Clone, Default)]
pub struct Confirmation {
    code: Option<StatusCode>,
    body: Option<ConfirmBody>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Confirmation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: StatusCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(ConfirmBody::Text(body.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(ConfirmBody::Json(body));
        self
    }

    pub fn form(mut self, body: QueryMap) -> Self {
        self.body = Some(ConfirmBody::Form(body));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// A bare OK confirmation answers with `Thanks`.
    pub fn into_reply(self) -> Reply {
        let code = self.code.unwrap_or(StatusCode::OK);
        let reply = match self.body {
            Some(ConfirmBody::Text(text)) => Reply::text(code, text),
            Some(ConfirmBody::Json(value)) => Reply::json(code, &value),
            Some(ConfirmBody::Form(map)) => Reply::form(code, &map),
            None if code == StatusCode::OK && self.headers.is_empty() => Reply::text(code, "Thanks"),
            None => Reply::empty(code),
        };
        self.headers
            .into_iter()
            .fold(reply, |reply, (name, value)| reply.with_header(name, value))
    }
}
