//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Source config `tls` table
//!     → tls.rs (load PEM certificate + key)
//!     → http::server (axum-server rustls acceptor)
//! ```
//!
//! # Design Decisions
//! - TLS is optional per listener
//! - Certificate errors are startup errors, never per-request ones

pub mod tls;

pub use tls::{load_source_tls, load_tls_config};
