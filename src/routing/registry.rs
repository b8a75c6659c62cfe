//! Named endpoint definitions.
//!
//! Application code registers each definition once at startup with
//! [`EndpointRegistry::register`]; an endpoints source builds its router from
//! the registry, filtered by the configured `only` / `except` lists.

use crate::config::EndpointsConfig;
use crate::routing::router::{EndpointRouter, RouterBuilder, RouterError};

type Definition = Box<dyn Fn(&mut RouterBuilder) -> Result<(), RouterError> + Send + Sync>;

#[derive(Default)]
pub struct EndpointRegistry {
    definitions: Vec<(String, Definition)>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named definition. The closure registers its endpoints on the
    /// builder it is given.
    pub fn register<F>(&mut self, name: impl Into<String>, define: F) -> &mut Self
    where
        F: Fn(&mut RouterBuilder) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.definitions.push((name.into(), Box::new(define)));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Run every enabled definition and spawn the resulting endpoints.
    /// Must be called inside a Tokio runtime.
    pub fn build(&self, filter: &EndpointsConfig) -> Result<EndpointRouter, RouterError> {
        let mut builder = EndpointRouter::builder();
        for (name, define) in &self.definitions {
            if !enabled(name, filter) {
                tracing::debug!(definition = %name, "Endpoint definition filtered out");
                continue;
            }
            builder.set_definition(name);
            define(&mut builder)?;
        }
        Ok(builder.build())
    }
}

/// `except` wins over `only`.
fn enabled(name: &str, filter: &EndpointsConfig) -> bool {
    if let Some(except) = &filter.except {
        if except.iter().any(|n| n == name) {
            return false;
        }
    }
    match &filter.only {
        Some(only) => only.iter().any(|n| n == name),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::routing::endpoint::HandlerError;
    use crate::routing::router::Route;
    use axum::http::Method;
    use std::sync::Arc;

    async fn noop(_msg: Arc<Message>, _caps: Vec<String>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn registry() -> EndpointRegistry {
        let mut registry = EndpointRegistry::new();
        registry
            .register("status", |points| {
                points.get("/status", noop)?;
                Ok(())
            })
            .register("jobs", |points| {
                points.post("/jobs", noop)?;
                points.get(Route::pattern(r"/jobs/(\d+)"), noop)?;
                Ok(())
            });
        registry
    }

    #[tokio::test]
    async fn builds_all_definitions_by_default() {
        let router = registry().build(&EndpointsConfig::default()).unwrap();
        assert_eq!(router.len(), 3);
        let found = router.find(&Method::GET, "/jobs/12").unwrap();
        assert_eq!(found.endpoint.name(), "jobs");
    }

    #[tokio::test]
    async fn only_and_except_filters() {
        let only = EndpointsConfig {
            only: Some(vec!["status".into()]),
            except: None,
        };
        let router = registry().build(&only).unwrap();
        assert_eq!(router.len(), 1);
        assert!(router.find(&Method::POST, "/jobs").is_none());

        let both = EndpointsConfig {
            only: Some(vec!["status".into(), "jobs".into()]),
            except: Some(vec!["status".into()]),
        };
        let router = registry().build(&both).unwrap();
        assert!(router.find(&Method::GET, "/status").is_none());
        assert!(router.find(&Method::POST, "/jobs").is_some());
    }

    #[tokio::test]
    async fn definition_errors_propagate() {
        let mut registry = registry();
        registry.register("dup", |points| {
            points.get("/status", noop)?;
            Ok(())
        });
        assert!(matches!(
            registry.build(&EndpointsConfig::default()),
            Err(RouterError::Conflict { .. })
        ));
    }

    #[test]
    fn names_in_registration_order() {
        let names: Vec<_> = registry().names().map(String::from).collect();
        assert_eq!(names, vec!["status", "jobs"]);
    }
}
