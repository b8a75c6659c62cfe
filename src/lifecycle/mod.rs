//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Retry stores + transmitters → Source apps
//!         → Bind all listeners → Serve under the supervisor
//!
//! Supervision (supervisor.rs):
//!     Task error or panic → Jittered backoff → Restart
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then retry stores, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced abort after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{Gateway, GatewayBuilder, StartupError};
pub use supervisor::supervise;
