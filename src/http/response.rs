//! Reply construction for inbound requests.
//!
//! # Responsibilities
//! - Build text, JSON and form replies with a matching content type
//! - Resolve symbolic status names (`ok`, `not_found`, ...) and numeric codes
//! - Convert replies into axum responses
//!
//! # Design Decisions
//! - A reply is plain data so it can cross task boundaries via a oneshot
//! - Explicit `content-type` headers win over the body-derived default

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::http::query::{self, QueryMap};

/// Default body for auto-responded requests.
pub const DEFAULT_RESPONSE_MESSAGE: &str = "So long and thanks for all the fish!";

/// A response destined for an open inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    content_type: Option<&'static str>,
    body: String,
}

impl Reply {
    /// Plain text reply.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: Some("text/plain"),
            body: body.into(),
        }
    }

    /// JSON encoded reply.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: Some("application/json"),
            body: body.to_string(),
        }
    }

    /// Form encoded reply.
    pub fn form(status: StatusCode, body: &QueryMap) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: Some("application/x-www-form-urlencoded"),
            body: query::encode(body),
        }
    }

    /// Reply with no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content_type: None,
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    pub(crate) fn unauthorized() -> Self {
        Self::text(
            StatusCode::UNAUTHORIZED,
            "You are not authorized to perform requested action!",
        )
    }

    pub(crate) fn not_found() -> Self {
        Self::text(StatusCode::NOT_FOUND, "Requested path not found!")
    }

    pub(crate) fn timeout() -> Self {
        Self::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Timeout waiting for response",
        )
    }

    pub(crate) fn bad_request(reason: impl std::fmt::Display) -> Self {
        Self::text(
            StatusCode::BAD_REQUEST,
            format!("Failed to process request -> {reason}"),
        )
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if let Some(content_type) = self.content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        for (name, value) in self.headers {
            headers.insert(name, value);
        }
        response
    }
}

/// Resolve a status from its numeric form (`"404"`) or its snake-case
/// reason phrase (`"not_found"`, `"im_a_teapot"`).
pub fn parse_status(code: &str) -> Option<StatusCode> {
    let code = code.trim().trim_start_matches(':');
    if let Ok(numeric) = code.parse::<u16>() {
        return StatusCode::from_u16(numeric).ok();
    }

    let wanted = code.to_ascii_lowercase();
    (100u16..600)
        .filter_map(|n| StatusCode::from_u16(n).ok())
        .find(|status| {
            status
                .canonical_reason()
                .map(|reason| status_name(reason) == wanted)
                .unwrap_or(false)
        })
}

fn status_name(reason: &str) -> String {
    reason
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}
