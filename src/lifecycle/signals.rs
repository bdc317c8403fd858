//! Quit signal handling.
//!
//! # Responsibilities
//! - Install SIGINT/SIGTERM handlers before any subsystem starts
//! - Accept an application-raised halt as a typed, clean quit reason
//! - Unblock the supervisor exactly once
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered when the waiter is armed, not when it is awaited,
//!   so a signal delivered during startup is not lost
//! - OS handlers can be armed once per process

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

static OS_HANDLERS_ARMED: AtomicBool = AtomicBool::new(false);

/// Application-raised stop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCondition {
    /// Configured halt height reached.
    Height(u64),
    /// Configured halt time (Unix seconds) reached.
    Time(u64),
}

impl fmt::Display for HaltCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height(h) => write!(f, "halt requested at height {h}"),
            Self::Time(t) => write!(f, "halt requested at time {t}"),
        }
    }
}

/// Why the supervisor stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitReason {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The application reached a configured halt boundary.
    Halt(HaltCondition),
}

impl QuitReason {
    /// Conventional signal number reported in logs.
    pub fn code(&self) -> i32 {
        match self {
            Self::Interrupt => 2,
            Self::Terminate => 15,
            Self::Halt(_) => 0,
        }
    }
}

impl fmt::Display for QuitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("interrupt signal received"),
            Self::Terminate => f.write_str("terminate signal received"),
            Self::Halt(condition) => condition.fmt(f),
        }
    }
}

/// Signal handler problems.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal handler failed: {0}")]
    Install(#[source] std::io::Error),

    #[error("OS signal handlers are already armed in this process")]
    AlreadyArmed,

    #[error("signal stream closed")]
    Closed,
}

/// Cloneable handle that raises a quit reason from inside the process.
#[derive(Debug, Clone)]
pub struct QuitTrigger {
    tx: mpsc::UnboundedSender<QuitReason>,
}

impl QuitTrigger {
    /// Raise a halt. Only the first reason raised is observed by the waiter.
    pub fn halt(&self, condition: HaltCondition) {
        tracing::info!(%condition, "Halt raised by application");
        let _ = self.tx.send(QuitReason::Halt(condition));
    }

    /// Deliver a quit reason as if it came from the OS.
    pub fn raise(&self, reason: QuitReason) {
        let _ = self.tx.send(reason);
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn install() -> Result<Self, SignalError> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(SignalError::Install)?,
            terminate: signal(SignalKind::terminate()).map_err(SignalError::Install)?,
        })
    }

    async fn recv(&mut self) -> Result<QuitReason, SignalError> {
        tokio::select! {
            s = self.interrupt.recv() => s.map(|()| QuitReason::Interrupt).ok_or(SignalError::Closed),
            s = self.terminate.recv() => s.map(|()| QuitReason::Terminate).ok_or(SignalError::Closed),
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn install() -> Result<Self, SignalError> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Result<QuitReason, SignalError> {
        tokio::signal::ctrl_c()
            .await
            .map(|()| QuitReason::Interrupt)
            .map_err(SignalError::Install)
    }
}

/// Blocks the supervisor until a quit reason arrives.
pub struct QuitWaiter {
    os: Option<OsSignals>,
    rx: mpsc::UnboundedReceiver<QuitReason>,
    // Keeps the channel open when every external trigger has been dropped.
    _tx: mpsc::UnboundedSender<QuitReason>,
}

impl QuitWaiter {
    /// Install the OS handlers now and return the waiter with its trigger.
    pub fn arm() -> Result<(Self, QuitTrigger), SignalError> {
        if OS_HANDLERS_ARMED.swap(true, Ordering::SeqCst) {
            return Err(SignalError::AlreadyArmed);
        }
        let os = OsSignals::install()?;
        tracing::debug!("Quit signal handlers armed");
        Ok(Self::build(Some(os)))
    }

    /// A waiter that only listens to its trigger.
    pub fn manual() -> (Self, QuitTrigger) {
        Self::build(None)
    }

    fn build(os: Option<OsSignals>) -> (Self, QuitTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        let trigger = QuitTrigger { tx: tx.clone() };
        (Self { os, rx, _tx: tx }, trigger)
    }

    /// Wait for the first quit reason. Consumes the waiter.
    pub async fn wait(mut self) -> Result<QuitReason, SignalError> {
        let reason = match self.os.as_mut() {
            Some(os) => {
                tokio::select! {
                    reason = os.recv() => reason?,
                    reason = self.rx.recv() => reason.ok_or(SignalError::Closed)?,
                }
            }
            None => self.rx.recv().await.ok_or(SignalError::Closed)?,
        };
        tracing::info!(%reason, code = reason.code(), "Received quit signal");
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn halt_is_a_typed_reason() {
        let (waiter, trigger) = QuitWaiter::manual();
        let handle = tokio::spawn(waiter.wait());
        trigger.halt(HaltCondition::Height(42));

        let reason = handle.await.unwrap().unwrap();
        assert_eq!(reason, QuitReason::Halt(HaltCondition::Height(42)));
        assert_eq!(reason.to_string(), "halt requested at height 42");
    }

    #[tokio::test]
    async fn first_reason_wins() {
        let (waiter, trigger) = QuitWaiter::manual();
        trigger.raise(QuitReason::Terminate);
        trigger.halt(HaltCondition::Time(1_700_000_000));
        assert_eq!(waiter.wait().await.unwrap(), QuitReason::Terminate);
    }

    #[tokio::test]
    async fn waits_while_triggers_are_dropped() {
        let (waiter, trigger) = QuitWaiter::manual();
        drop(trigger);
        let waited = tokio::time::timeout(Duration::from_millis(50), waiter.wait()).await;
        assert!(waited.is_err(), "waiter must keep blocking");
    }
}
