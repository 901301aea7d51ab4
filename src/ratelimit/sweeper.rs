//! Background removal of idle client windows.
//!
//! Client keys are otherwise never forgotten, so a long-running process that
//! sees many distinct callers would grow without bound.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::limiter::SlidingWindowLimiter;
use crate::error::{Result, TurnstileError};

/// Handle to a running sweeper task.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps `limiter` every `interval`.
    ///
    /// Must be called from within a tokio runtime. A zero interval is a
    /// configuration error.
    pub fn spawn(limiter: Arc<SlidingWindowLimiter>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(interval = ?interval, "Idle window sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_idle(Instant::now());
                        debug!(
                            removed = removed,
                            remaining = limiter.key_count(),
                            "Swept idle client windows"
                        );
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Idle window sweeper stopped");
        });

        Ok(Self { shutdown, handle })
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Idle window sweeper task failed");
        }
    }
}
