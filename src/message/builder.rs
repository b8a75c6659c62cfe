//! Build canonical messages from raw inbound requests.
//!
//! # Responsibilities
//! - Normalize header keys (lower-case, `-` → `_`)
//! - Parse the query string
//! - Decode the body by content type, spilling large opaque bodies to disk
//! - Extract HTTP Basic credentials
//!
//! # Design Decisions
//! - Bodies above [`INLINE_BODY_LIMIT`] that are neither JSON nor form are
//!   streamed to a temp file in [`SPOOL_CHUNK_SIZE`] chunks
//! - In-memory reads are capped by the configured maximum body size
//! - A malformed body fails the request (400), never the process

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::net::SocketAddr;

use axum::body::Body as RequestBody;
use axum::http::{HeaderMap, Request};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::http::query;
use crate::http::request::{self, PendingReply, Responder};
use crate::message::{Authentication, Body, Message, SpooledBody};

/// Bodies larger than this are spooled to disk.
pub const INLINE_BODY_LIMIT: u64 = 10 * 1024;

/// Write size used when spooling.
pub const SPOOL_CHUNK_SIZE: usize = 2 * 1024;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

/// Errors raised while turning a request into a message.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The body declared JSON but did not parse.
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// Reading the body from the connection failed (or exceeded the limit).
    #[error("failed to read request body: {0}")]
    Read(String),

    /// Writing the spool file failed.
    #[error("failed to spool request body: {0}")]
    Spool(#[from] std::io::Error),
}

/// Converts raw requests into [`Message`]s.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    max_body_size: usize,
}

impl MessageBuilder {
    /// `max_body_size` caps bodies that are read into memory.
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }

    /// Build a message and return it with the handle its reply arrives on.
    pub async fn build(
        &self,
        request: Request<RequestBody>,
        remote: SocketAddr,
    ) -> Result<(Message, PendingReply), BuildError> {
        let (parts, body) = request.into_parts();

        let headers = normalize_headers(&parts.headers);
        let query = query::parse(parts.uri.query().unwrap_or_default());
        let body = self.decode_body(&headers, body).await?;
        let authentication = headers
            .get("authorization")
            .and_then(|value| basic_credentials(value))
            .unwrap_or_default();
        let id = request::request_id(&parts.headers)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (responder, rx) = Responder::channel();
        let mut message = Message::new(parts.method, parts.uri.path())
            .with_id(id)
            .with_query(query)
            .with_body(body)
            .with_origin(remote.ip().to_canonical())
            .with_authentication(authentication)
            .with_responder(responder.clone());
        message.headers = headers;

        Ok((message, PendingReply::new(responder, rx)))
    }

    async fn decode_body(
        &self,
        headers: &BTreeMap<String, String>,
        body: RequestBody,
    ) -> Result<Body, BuildError> {
        let content_type = headers.get("content_type").map(|v| media_type(v));
        let content_length = headers
            .get("content_length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);

        match content_type.as_deref() {
            Some(JSON) => {
                let bytes = self.read_inline(body).await?;
                if bytes.iter().all(u8::is_ascii_whitespace) {
                    return Ok(Body::Json(serde_json::Value::Null));
                }
                Ok(Body::Json(serde_json::from_slice(&bytes)?))
            }
            Some(FORM) => {
                let bytes = self.read_inline(body).await?;
                let form = query::parse(&String::from_utf8_lossy(&bytes));
                Ok(collapse_bare_token(form))
            }
            _ if content_length > INLINE_BODY_LIMIT => {
                Ok(Body::Spooled(spool(body).await?))
            }
            _ => {
                let bytes = self.read_inline(body).await?;
                Ok(Body::Text(String::from_utf8_lossy(&bytes).into_owned()))
            }
        }
    }

    async fn read_inline(&self, body: RequestBody) -> Result<axum::body::Bytes, BuildError> {
        axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| BuildError::Read(e.to_string()))
    }
}

/// Normalize a header name: lower-case, dashes to underscores.
pub fn normalize_header_key(key: &str) -> String {
    key.to_ascii_lowercase().replace('-', "_")
}

/// Normalize a header map. Repeated headers are joined with `, `.
pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        normalized
            .entry(normalize_header_key(name.as_str()))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    normalized
}

/// Decode an `Authorization: Basic <base64>` header value.
pub fn basic_credentials(header: &str) -> Option<Authentication> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let encoded = parts.next()?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let authentication = match decoded.split_once(':') {
        Some((user, pass)) => Authentication::basic(user, pass),
        None => Authentication {
            username: Some(decoded),
            password: None,
        },
    };
    Some(authentication)
}

/// `text/html; charset=utf-8` → `text/html`
fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A form body that was a single bare token (`ping`) becomes that string.
fn collapse_bare_token(form: query::QueryMap) -> Body {
    if form.len() == 1 {
        if let Some((key, serde_json::Value::Array(values))) = form.iter().next() {
            if values.is_empty() {
                return Body::Text(key.clone());
            }
        }
    }
    Body::Form(form)
}

async fn spool(body: RequestBody) -> Result<SpooledBody, BuildError> {
    let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
    let mut stream = body.into_data_stream();
    let mut len = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BuildError::Read(e.to_string()))?;
        for piece in chunk.chunks(SPOOL_CHUNK_SIZE) {
            file.write_all(piece).await?;
            len += piece.len() as u64;
        }
    }

    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    tracing::debug!(bytes = len, "Request body spooled to disk");
    Ok(SpooledBody::new(file.into_std().await, len))
}
