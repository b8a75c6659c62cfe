//! Durable redelivery of failed outbound transmissions.
//!
//! # Responsibilities
//! - Persist failed transmissions as one JSON record per message id
//! - Redeliver records on a timer and on demand
//! - Delete a record only after a verified 2xx response
//!
//! # Design Decisions
//! - Records are written to a staging directory and renamed into place,
//!   so a sweep never reads a partial record
//! - Only one sweep runs at a time; an overlapping trigger is dropped
//! - Delivery is at-least-once: a lost acknowledgement means a duplicate,
//!   never a lost record
//! - Optional per-record backoff; disabled, every sweep retries everything
//! - One process owns a retry directory
//! - File names are derived from the id: plain ids are used as-is, any
//!   other id is encoded, so every id can be persisted

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Staging sub-directory for records being written.
const STAGING_DIR: &str = ".write";

/// Matches every record in a sweep.
pub const ALL_RECORDS: &str = "*";

/// Longest id used verbatim (or base64-encoded) as a file stem.
const MAX_PLAIN_STEM: usize = 128;

/// One persisted failed transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub message_id: String,
    pub payload: String,
    pub method: String,
    pub url: String,
    /// Header values are JSON; non-string values are sent in their JSON
    /// text form.
    #[serde(default)]
    pub headers: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("retry store I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed retry record {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize retry record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    attempts: u32,
    next_attempt: Instant,
}

/// Retry store and redelivery worker for one source.
#[derive(Debug)]
pub struct RetryDelivery {
    directory: PathBuf,
    staging: PathBuf,
    client: reqwest::Client,
    config: RetryConfig,
    delivering: AtomicBool,
    schedule: DashMap<String, Schedule>,
}

/// Clears the in-progress flag when a sweep ends, even on panic.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetryDelivery {
    /// Open (creating if needed) the retry directory and its staging area.
    pub fn new(
        directory: impl Into<PathBuf>,
        config: RetryConfig,
        outbound_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let directory = directory.into();
        let staging = directory.join(STAGING_DIR);
        std::fs::create_dir_all(&staging).map_err(|source| DeliveryError::Io {
            path: staging.clone(),
            source,
        })?;
        let client = reqwest::Client::builder().timeout(outbound_timeout).build()?;

        Ok(Self {
            directory,
            staging,
            client,
            config,
            delivering: AtomicBool::new(false),
            schedule: DashMap::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Live path of the record for `message_id`.
    pub fn record_path(&self, message_id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", file_stem(message_id)))
    }

    /// Persist a record: write to staging, then rename into the live
    /// directory.
    pub async fn write_for_retry(&self, record: &RetryRecord) -> Result<PathBuf, DeliveryError> {
        let data = serde_json::to_vec(record)?;
        let file_name = format!("{}.json", file_stem(&record.message_id));
        let stage_path = self.staging.join(&file_name);
        let final_path = self.directory.join(&file_name);

        tokio::fs::write(&stage_path, &data)
            .await
            .map_err(|source| DeliveryError::Io {
                path: stage_path.clone(),
                source,
            })?;
        tokio::fs::rename(&stage_path, &final_path)
            .await
            .map_err(|source| DeliveryError::Io {
                path: final_path.clone(),
                source,
            })?;

        metrics::record_retry_persisted();
        tracing::info!(message_id = %record.message_id, "Failed message persisted for resend");
        Ok(final_path)
    }

    /// One live HTTP attempt. Any 2xx is success; every other status and
    /// every transport error is reported as `false`.
    pub async fn redeliver(&self, record: &RetryRecord) -> bool {
        let method = match Method::from_str(&record.method.to_ascii_uppercase()) {
            Ok(method) => method,
            Err(_) => {
                tracing::error!(
                    message_id = %record.message_id,
                    method = %record.method,
                    "Invalid HTTP method on transmission"
                );
                return false;
            }
        };
        let mut url = match url::Url::parse(&record.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(message_id = %record.message_id, url = %record.url, error = %e, "Invalid transmission URL");
                return false;
            }
        };

        let credentials = if url.username().is_empty() {
            None
        } else {
            let username = percent_decode(url.username());
            let password = url.password().map(percent_decode);
            // Userinfo is sent as an Authorization header, not in the URL.
            let _ = url.set_username("");
            let _ = url.set_password(None);
            Some((username, password))
        };

        let mut request = self
            .client
            .request(method, url)
            .body(record.payload.clone());
        for (name, value) in &record.headers {
            request = match value {
                Value::String(text) => request.header(name.as_str(), text.as_str()),
                other => request.header(name.as_str(), other.to_string()),
            };
        }
        if let Some((username, password)) = credentials {
            request = request.basic_auth(username, password);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(message_id = %record.message_id, "Successful delivery of message");
                true
            }
            Ok(response) => {
                tracing::error!(
                    message_id = %record.message_id,
                    status = %response.status(),
                    "Invalid response code received for transmission"
                );
                false
            }
            Err(e) => {
                tracing::error!(message_id = %record.message_id, error = %e, "Transmission delivery failure");
                false
            }
        }
    }

    /// Sweep records matching `message_id` (or [`ALL_RECORDS`]).
    ///
    /// Returns whether a sweep ran; `false` means another sweep was in
    /// progress. Callers check [`Self::record_path`] for the outcome.
    pub async fn attempt_redelivery(&self, message_id: &str) -> bool {
        if self
            .delivering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(message_id = %message_id, "Redelivery already in progress, skipping");
            return false;
        }
        let _guard = SweepGuard(&self.delivering);

        let files = match self.matching_records(message_id) {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan retry directory");
                return true;
            }
        };

        for file in files {
            tracing::debug!(file = ?file, "Redelivery processing");
            if let Err(e) = self.process_record(&file).await {
                tracing::error!(file = ?file, error = %e, "Failed to process retry record");
            }
        }
        true
    }

    /// Files currently pending in the retry directory.
    pub fn pending(&self) -> Result<Vec<PathBuf>, DeliveryError> {
        self.matching_records(ALL_RECORDS)
    }

    /// Periodic sweep until shutdown. The first sweep runs immediately so
    /// records left by a previous run are picked up at startup.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        tracing::info!(
            directory = ?self.directory,
            interval_secs = self.config.interval_secs,
            "Retry delivery starting"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.attempt_redelivery(ALL_RECORDS).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(directory = ?self.directory, "Retry delivery received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn matching_records(&self, message_id: &str) -> Result<Vec<PathBuf>, DeliveryError> {
        let base = glob::Pattern::escape(&self.directory.to_string_lossy());
        let stem = if message_id == ALL_RECORDS {
            ALL_RECORDS.to_string()
        } else {
            file_stem(message_id)
        };
        let pattern = format!("{}/{}.json", base, stem);
        let paths = glob::glob(&pattern).map_err(|e| DeliveryError::Io {
            path: self.directory.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.msg),
        })?;
        Ok(paths.filter_map(Result::ok).filter(|p| p.is_file()).collect())
    }

    async fn process_record(&self, file: &Path) -> Result<(), DeliveryError> {
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|source| DeliveryError::Io {
                path: file.to_path_buf(),
                source,
            })?;
        let record: RetryRecord =
            serde_json::from_str(&content).map_err(|source| DeliveryError::Malformed {
                path: file.to_path_buf(),
                source,
            })?;

        if !self.is_due(&record.message_id) {
            tracing::debug!(message_id = %record.message_id, "Redelivery not due yet");
            return Ok(());
        }

        if self.redeliver(&record).await {
            metrics::record_redelivery("success");
            self.schedule.remove(&record.message_id);
            tokio::fs::remove_file(file)
                .await
                .map_err(|source| DeliveryError::Io {
                    path: file.to_path_buf(),
                    source,
                })?;
        } else {
            metrics::record_redelivery("failure");
            self.schedule_next(&record.message_id);
        }
        Ok(())
    }

    fn is_due(&self, message_id: &str) -> bool {
        if !self.config.backoff_enabled {
            return true;
        }
        self.schedule
            .get(message_id)
            .map(|s| Instant::now() >= s.next_attempt)
            .unwrap_or(true)
    }

    fn schedule_next(&self, message_id: &str) {
        if !self.config.backoff_enabled {
            return;
        }
        let mut entry = self.schedule.entry(message_id.to_string()).or_insert(Schedule {
            attempts: 0,
            next_attempt: Instant::now(),
        });
        entry.attempts = entry.attempts.saturating_add(1);
        let delay = calculate_backoff(entry.attempts, self.config.base_delay_ms, self.config.max_delay_ms);
        entry.next_attempt = Instant::now() + delay;
    }
}

/// File stem for a record. Plain ids (ASCII alphanumerics, `-`, `_`, `.`,
/// not leading `.`) map to themselves; anything else becomes `~` plus the
/// base64url id, or `~~` plus the base64url SHA-1 when too long. `~` never
/// appears in a plain stem, so the two forms cannot collide.
fn file_stem(message_id: &str) -> String {
    let plain = !message_id.is_empty()
        && message_id.len() <= MAX_PLAIN_STEM
        && !message_id.starts_with('.')
        && message_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if plain {
        message_id.to_string()
    } else if message_id.len() <= MAX_PLAIN_STEM {
        format!("~{}", URL_SAFE_NO_PAD.encode(message_id))
    } else {
        format!("~~{}", URL_SAFE_NO_PAD.encode(Sha1::digest(message_id.as_bytes())))
    }
}

fn percent_decode(value: &str) -> String {
    let escaped = value.replace('+', "%2B");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| value.to_string())
}
