//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → one SourceConfig per HTTP source
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthorizationConfig, EndpointsConfig, GatewayConfig, LogFormat, ObservabilityConfig,
    ResponseConfig, RetryConfig, SecurityConfig, SourceConfig, SourceKind, TimeoutConfig,
    TlsConfig,
};
pub use validation::ValidationError;
