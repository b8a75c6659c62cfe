//! Outbound side of a source.
//!
//! A transmission is either a reply on a message's open connection or a
//! new HTTP request to the configured destination. Requests that fail are
//! persisted and redelivered by the source's [`RetryDelivery`].

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::config::SourceConfig;
use crate::http::response::Reply;
use crate::message::{Confirmation, Message};
use crate::observability::metrics;
use crate::resilience::{DeliveryError, RetryDelivery, RetryRecord};

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("invalid destination URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
}

/// Per-call options for [`Transmitter::transmit`].
#[derive(Debug, Clone, Default)]
pub struct TransmitOptions {
    /// Message whose open connection receives the payload as its reply.
    pub reply_to: Option<Arc<Message>>,
    /// Reply status; defaults to 200.
    pub code: Option<StatusCode>,
    /// Path joined onto the destination URL.
    pub path: Option<String>,
    pub method: Option<Method>,
    pub headers: BTreeMap<String, String>,
}

impl TransmitOptions {
    pub fn reply_to(message: Arc<Message>) -> Self {
        Self {
            reply_to: Some(message),
            ..Self::default()
        }
    }

    pub fn code(mut self, code: StatusCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// What [`Transmitter::transmit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    /// Sent as a reply; `false` if the message had already been answered.
    Replied(bool),
    /// Handed to a background delivery task.
    Dispatched { message_id: String },
}

/// Transmit gateway for one source.
#[derive(Debug)]
pub struct Transmitter {
    source: String,
    endpoint: Option<String>,
    scheme: &'static str,
    bind: String,
    port: u16,
    path: Option<String>,
    method: Option<String>,
    retry: Arc<RetryDelivery>,
}

impl Transmitter {
    pub fn new(config: &SourceConfig, retry: Arc<RetryDelivery>) -> Self {
        Self {
            source: config.name.clone(),
            endpoint: config.endpoint.clone(),
            scheme: if config.ssl { "https" } else { "http" },
            bind: config.bind.clone(),
            port: config.port,
            path: config.path.clone(),
            method: config.method.clone(),
            retry,
        }
    }

    pub fn retry(&self) -> &Arc<RetryDelivery> {
        &self.retry
    }

    /// Send `payload`. String payloads pass through; anything else is sent
    /// as JSON.
    pub fn transmit(&self, payload: &Value, options: TransmitOptions) -> Result<Transmission, TransmitError> {
        if let Some(message) = options.reply_to.as_ref().filter(|m| m.has_connection()) {
            let code = options.code.unwrap_or(StatusCode::OK);
            tracing::info!(source = %self.source, message_id = %message.id(), code = %code, "Transmit response");
            let reply = match payload {
                Value::String(text) => Reply::text(code, text.clone()),
                other => Reply::json(code, other),
            };
            let sent = message.respond(reply);
            if !sent {
                tracing::warn!(message_id = %message.id(), "Message was already answered. Response not sent!");
            }
            return Ok(Transmission::Replied(sent));
        }

        let record = self.outbound_record(payload, &options)?;
        let message_id = record.message_id.clone();

        tracing::info!(source = %self.source, message_id = %message_id, "Transmit request");
        let retry = self.retry.clone();
        let id = message_id.clone();
        tokio::spawn(async move {
            if let Err(e) = perform_transmission(retry, record).await {
                tracing::error!(message_id = %id, error = %e, "Failed to persist message for resend");
            }
        });
        Ok(Transmission::Dispatched { message_id })
    }

    /// Build the outbound record for `payload`: id from the payload's `id`
    /// field or a fresh UUID, destination and method resolved from
    /// `options` over the source config.
    pub fn outbound_record(&self, payload: &Value, options: &TransmitOptions) -> Result<RetryRecord, TransmitError> {
        let url = self.destination(options.path.as_deref())?;
        let method = self.method_for(options.method.clone())?;
        Ok(RetryRecord {
            message_id: payload_id(payload).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            payload: match payload {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            method: method.to_string(),
            url: url.to_string(),
            headers: options
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect::<Map<String, Value>>(),
        })
    }

    /// Confirm processing of `message`. Only the first confirmation is sent.
    pub fn confirm(&self, message: &Message, confirmation: Confirmation) -> bool {
        message.confirm(confirmation)
    }

    /// Destination URL: the configured endpoint, or one derived from bind,
    /// port and path; `path` is joined on top.
    pub fn destination(&self, path: Option<&str>) -> Result<Url, TransmitError> {
        let base = match &self.endpoint {
            Some(endpoint) => parse_url(endpoint)?,
            None => {
                let root = parse_url(&format!("{}://{}:{}", self.scheme, self.bind, self.port))?;
                join(&root, self.path.as_deref().unwrap_or("/"))?
            }
        };
        match path {
            Some(path) => join(&base, path),
            None => Ok(base),
        }
    }

    fn method_for(&self, method: Option<Method>) -> Result<Method, TransmitError> {
        if let Some(method) = method {
            return Ok(method);
        }
        match &self.method {
            Some(name) => Method::from_str(&name.to_ascii_uppercase())
                .map_err(|_| TransmitError::InvalidMethod(name.clone())),
            None => Ok(Method::POST),
        }
    }
}

/// Try the live call; on failure persist the record and trigger a sweep.
///
/// Returns `true` when the live call succeeded. `false` means the record
/// was persisted; it may already have been delivered by the sweep, so
/// check [`RetryDelivery::record_path`] for what is still pending.
pub async fn perform_transmission(retry: Arc<RetryDelivery>, record: RetryRecord) -> Result<bool, DeliveryError> {
    if retry.redeliver(&record).await {
        metrics::record_transmission("delivered");
        return Ok(true);
    }
    metrics::record_transmission("failed");

    retry.write_for_retry(&record).await?;
    retry.attempt_redelivery(&record.message_id).await;
    Ok(false)
}

/// `id` field of an object payload, if any.
fn payload_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_url(url: &str) -> Result<Url, TransmitError> {
    Url::parse(url).map_err(|source| TransmitError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

fn join(base: &Url, path: &str) -> Result<Url, TransmitError> {
    base.join(path).map_err(|source| TransmitError::InvalidUrl {
        url: format!("{base} + {path}"),
        source,
    })
}
