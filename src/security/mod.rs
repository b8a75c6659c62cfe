//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! authorization config block (at setup)
//!     → origins.rs (CIDR / address allow-list)
//!     → htpasswd.rs (credential file)
//!     → authorization.rs (AuthorizationPolicy, valid_on composition)
//!
//! Per request:
//!     Message (origin + Basic credentials)
//!     → Authorizer::authorize → allow / 401
//! ```
//!
//! # Design Decisions
//! - Evaluation is synchronous and in-memory
//! - Denials are expected traffic, logged at debug and counted

pub mod authorization;
pub mod htpasswd;
pub mod origins;

use thiserror::Error;

pub use authorization::{AuthorizationPolicy, Authorizer, ValidOn};
pub use htpasswd::{HtpasswdError, HtpasswdFile};
pub use origins::OriginAllowList;

/// Errors building an authorization policy.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("unknown authorization `valid_on` provided: {0} (allowed: all, any, none)")]
    UnknownValidOn(String),

    #[error("invalid allowed origin: {0}")]
    InvalidOrigin(String),

    #[error(transparent)]
    Htpasswd(#[from] HtpasswdError),
}
