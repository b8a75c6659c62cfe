//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint definitions (at startup):
//!     registry.rs (named definitions, only/except filter)
//!     → router.rs RouterBuilder (verb registrations)
//!     → endpoint.rs (spawn serial worker or worker pool)
//!     → EndpointRouter (immutable)
//!
//! Incoming Message (method, path):
//!     → router.rs (static lookup, then patterns)
//!     → matcher.rs (literal / anchored regex, captures)
//!     → endpoint.rs (submit to workers) or no-match
//!
//! Path listeners:
//!     → paths.rs (exact (method, path), then glob)
//! ```
//!
//! # Design Decisions
//! - Endpoints registered at startup, immutable at runtime
//! - Deterministic: same input always matches same endpoint
//! - First match wins (registration order)
//! - Each endpoint is its own failure domain

pub mod endpoint;
pub mod matcher;
pub mod paths;
pub mod registry;
pub mod router;

pub use endpoint::{BoxFuture, Concurrency, Endpoint, Handler, HandlerError};
pub use matcher::PathMatcher;
pub use paths::PathRouter;
pub use registry::EndpointRegistry;
pub use router::{EndpointRouter, Route, RouteMatch, RouterBuilder, RouterError};
