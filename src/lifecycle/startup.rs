//! Startup window: race a blocking `start` against a grace period.
//!
//! The auxiliary servers are accept loops with no "ready" callback. Their
//! `start` future only resolves when the server dies, so the only usable
//! signal is the absence of an error within the window.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::observability::metrics;
use crate::subsystem::{Subsystem, SubsystemError};

/// Grace period after which a silent service is assumed to be running.
pub const DEFAULT_STARTUP_WINDOW: Duration = Duration::from_secs(5);

/// Result of racing a start against the window.
#[derive(Debug)]
pub enum StartupOutcome {
    /// `start` returned without error inside the window.
    Succeeded,
    /// `start` reported an error inside the window.
    FailedFast(SubsystemError),
    /// Nothing was heard inside the window; treated as running.
    TimedOutAssumedRunning,
}

impl StartupOutcome {
    /// Whether the service should be considered running.
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::FailedFast(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::FailedFast(_) => "failed_fast",
            Self::TimedOutAssumedRunning => "assumed_running",
        }
    }

    pub fn into_result(self) -> Result<(), SubsystemError> {
        match self {
            Self::FailedFast(e) => Err(e),
            _ => Ok(()),
        }
    }
}

/// Spawn `start` and wait for its first error or for `window` to elapse.
pub async fn race_start<F>(name: &str, start: F, window: Duration) -> StartupOutcome
where
    F: Future<Output = Result<(), SubsystemError>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tx.send(start.await);
    });

    tokio::select! {
        reported = rx => match reported {
            Ok(Ok(())) => StartupOutcome::Succeeded,
            Ok(Err(e)) => StartupOutcome::FailedFast(e),
            // The start task panicked and dropped the sender.
            Err(_) => StartupOutcome::FailedFast(SubsystemError::Aborted {
                subsystem: name.to_string(),
            }),
        },
        _ = tokio::time::sleep(window) => StartupOutcome::TimedOutAssumedRunning,
    }
}

/// Startup window applied to subsystems.
#[derive(Debug, Clone, Copy)]
pub struct StartupWindow {
    window: Duration,
}

impl StartupWindow {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn duration(&self) -> Duration {
        self.window
    }

    /// Start `subsystem` in the background and decide whether it came up.
    pub async fn race(&self, subsystem: Arc<dyn Subsystem>) -> StartupOutcome {
        let name = subsystem.name().to_string();
        tracing::debug!(subsystem = %name, window_ms = self.window.as_millis() as u64, "Starting");

        let outcome = race_start(&name, async move { subsystem.start().await }, self.window).await;
        metrics::record_start(&name, outcome.label());
        match &outcome {
            StartupOutcome::FailedFast(e) => {
                tracing::error!(subsystem = %name, error = %e, "Failed to start");
            }
            _ => tracing::info!(subsystem = %name, outcome = outcome.label(), "Started"),
        }
        outcome
    }
}

impl Default for StartupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_STARTUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn early_error_fails_fast() {
        let outcome = race_start(
            "api-server",
            async { Err(SubsystemError::failed("api-server", "address in use")) },
            WINDOW,
        )
        .await;
        match outcome {
            StartupOutcome::FailedFast(e) => assert_eq!(e.to_string(), "api-server: address in use"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn silence_is_success() {
        let outcome = race_start(
            "grpc-server",
            std::future::pending::<Result<(), SubsystemError>>(),
            WINDOW,
        ).await;
        assert!(matches!(outcome, StartupOutcome::TimedOutAssumedRunning));
        assert!(outcome.is_running());
    }

    #[tokio::test]
    async fn late_error_is_not_seen() {
        let outcome = race_start(
            "rosetta",
            async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Err(SubsystemError::failed("rosetta", "too late"))
            },
            WINDOW,
        )
        .await;
        assert!(outcome.is_running());
    }

    #[tokio::test]
    async fn clean_return_is_success() {
        let outcome = race_start("grpc-web", async { Ok(()) }, WINDOW).await;
        assert!(matches!(outcome, StartupOutcome::Succeeded));
    }

    #[tokio::test]
    async fn panicking_start_fails_fast() {
        let outcome = race_start(
            "api-server",
            async {
                if true {
                    panic!("boom");
                }
                Ok(())
            },
            WINDOW,
        )
        .await;
        assert!(matches!(
            outcome,
            StartupOutcome::FailedFast(SubsystemError::Aborted { .. })
        ));
    }
}
