//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request awaiting a reply:
//!     → timeouts.rs (bounded wait, 500 on timeout)
//!
//! Outbound transmission failed:
//!     → retries.rs (persist record, staged write + rename)
//!     → retries.rs sweep (timer / on demand, one at a time)
//!     → backoff.rs (optional per-record delay)
//!     → 2xx → delete record
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every wait for a reply has a deadline
//! - Failed transmissions are never dropped, only retried
//! - Sweep errors are logged and never end the sweep task

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{DeliveryError, RetryDelivery, RetryRecord, ALL_RECORDS};
pub use timeouts::await_reply;
