//! Restart loop for long-running tasks.
//!
//! # Responsibilities
//! - Run a task factory on its own Tokio task
//! - Restart after an error or a panic, with jittered backoff
//! - Stop restarting once shutdown is triggered
//!
//! # Design Decisions
//! - A clean `Ok(())` exit is final; only failures restart
//! - The backoff resets after a run that stayed up for a while

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::lifecycle::Shutdown;
use crate::resilience::backoff::calculate_backoff;

const RESTART_BASE_MS: u64 = 100;
const RESTART_MAX_MS: u64 = 30_000;

/// A run at least this long counts as healthy and resets the backoff.
const STABLE_RUN: Duration = Duration::from_secs(60);

/// Run `task` until it exits cleanly or shutdown is triggered.
pub async fn supervise<F, Fut, E>(name: impl Into<String>, shutdown: Shutdown, mut task: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let name = name.into();
    let mut attempt: u32 = 0;

    loop {
        let started = Instant::now();
        match tokio::spawn(task()).await {
            Ok(Ok(())) => {
                tracing::debug!(task = %name, "Supervised task finished");
                return;
            }
            Ok(Err(e)) => {
                tracing::error!(task = %name, error = %e, "Supervised task failed");
            }
            Err(e) => {
                tracing::error!(task = %name, error = %e, "Supervised task panicked");
            }
        }

        if shutdown.is_triggered() {
            return;
        }
        if started.elapsed() >= STABLE_RUN {
            attempt = 0;
        }
        attempt = attempt.saturating_add(1);

        let delay = calculate_backoff(attempt, RESTART_BASE_MS, RESTART_MAX_MS);
        tracing::info!(task = %name, attempt, delay = ?delay, "Restarting supervised task");

        let mut stop = shutdown.subscribe();
        if shutdown.is_triggered() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.recv() => return,
        }
    }
}
