//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, retry interval > 0)
//! - Detect duplicate source names and conflicting path routes
//! - Reject authorization blocks that could never be built
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, SourceConfig, SourceKind};
use crate::http::response::parse_status;
use crate::security::{OriginAllowList, ValidOn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate source name `{0}`")]
    DuplicateSource(String),

    #[error("source `{name}`: {reason}")]
    Source { name: String, reason: String },

    #[error("sources `{first}` and `{second}` both route {method} {path} on {address}")]
    PathConflict {
        first: String,
        second: String,
        method: String,
        path: String,
        address: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeouts.response_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.response_secs"));
    }
    if config.timeouts.outbound_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.outbound_secs"));
    }
    if config.retries.interval_secs == 0 {
        errors.push(ValidationError::Zero("retries.interval_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    let mut names = HashSet::new();
    // (address, METHOD, path) → owning source
    let mut routes: Vec<(String, String, String, String)> = Vec::new();

    for source in &config.sources {
        if !names.insert(source.name.as_str()) {
            errors.push(ValidationError::DuplicateSource(source.name.clone()));
        }
        validate_source(source, &mut errors);

        if source.kind == SourceKind::Paths {
            let method = source.method.as_deref().unwrap_or("get").to_ascii_uppercase();
            let path = source.path.clone().unwrap_or_else(|| "/".to_string());
            let address = source.bind_address();
            let owner = routes
                .iter()
                .find(|(a, m, p, _)| *a == address && *m == method && *p == path)
                .map(|(_, _, _, name)| name.clone());
            if let Some(first) = owner {
                errors.push(ValidationError::PathConflict {
                    first,
                    second: source.name.clone(),
                    method,
                    path,
                    address,
                });
            } else {
                routes.push((address, method, path, source.name.clone()));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_source(source: &SourceConfig, errors: &mut Vec<ValidationError>) {
    let mut fail = |reason: String| {
        errors.push(ValidationError::Source {
            name: source.name.clone(),
            reason,
        })
    };

    if source.name.is_empty() {
        fail("name must not be empty".to_string());
    }
    if source.name.contains('/') || source.name.contains('\\') || source.name == ".." {
        fail("name must not contain path separators".to_string());
    }
    if source.retry_directory.as_os_str().is_empty() {
        fail("retry_directory must not be empty".to_string());
    }
    if let Some(method) = &source.method {
        if Method::from_str(&method.to_ascii_uppercase()).is_err() {
            fail(format!("invalid method `{method}`"));
        }
    }
    if let Some(path) = &source.path {
        if !path.starts_with('/') {
            fail(format!("path `{path}` must start with '/'"));
        }
    }
    if source.kind == SourceKind::Paths && parse_status(&source.response.code).is_none() {
        fail(format!("unknown response code `{}`", source.response.code));
    }
    if let Some(endpoint) = &source.endpoint {
        if let Err(e) = url::Url::parse(endpoint) {
            fail(format!("invalid endpoint `{endpoint}`: {e}"));
        }
    }
    if let Some(auth) = &source.authorization {
        if let Some(valid_on) = &auth.valid_on {
            if let Err(e) = valid_on.parse::<ValidOn>() {
                fail(e.to_string());
            }
        }
        if let Err(e) = OriginAllowList::parse(&auth.allowed_origins) {
            fail(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AuthorizationConfig;

    fn paths_source(name: &str, path: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            kind: SourceKind::Paths,
            path: Some(path.to_string()),
            method: Some("post".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn detects_path_conflicts_on_same_listener() {
        let mut config = GatewayConfig::default();
        config.sources = vec![paths_source("a", "/fubar"), paths_source("b", "/fubar")];
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(&errors[0], ValidationError::PathConflict { first, .. } if first == "a"));

        // Different port: no conflict.
        config.sources[1].port = 3001;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_bad_source_fields() {
        let mut config = GatewayConfig::default();
        config.sources = vec![SourceConfig {
            name: "bad".to_string(),
            method: Some("FETCH ME".to_string()),
            endpoint: Some("not a url".to_string()),
            authorization: Some(AuthorizationConfig {
                allowed_origins: vec!["999.1.1.1".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn rejects_zero_intervals() {
        let mut config = GatewayConfig::default();
        config.retries.interval_secs = 0;
        config.timeouts.response_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero("retries.interval_secs")));
        assert!(errors.contains(&ValidationError::Zero("timeouts.response_secs")));
    }
}
