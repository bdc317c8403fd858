//! Shutdown coordination.
//!
//! `Shutdown` is the per-service stop signal; `ShutdownPlan` is the ordered
//! list of cleanup actions the supervisor accumulates while starting things.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;

use crate::observability::metrics;
use crate::subsystem::Subsystem;

/// Stop signal shared between a service and whoever stops it.
///
/// Backed by a watch channel so a listener created after `trigger` still
/// observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a `Shutdown`.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown has been triggered.
    pub async fn recv(&mut self) {
        // The sender lives inside `Shutdown`; if every handle is gone nobody can stop us
        // anymore, which is as good as a trigger.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// Error produced by a cleanup action.
pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CleanupError>> + Send>;

struct CleanupAction {
    name: String,
    run: CleanupFn,
}

/// Ordered cleanup actions, executed last-registered first.
///
/// Each action runs once. A failing or panicking action is logged and the
/// next one still runs.
#[derive(Default)]
pub struct ShutdownPlan {
    actions: Vec<CleanupAction>,
}

/// What happened while executing a plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Actions that completed, in execution order.
    pub completed: Vec<String>,
    /// Actions that failed, with the error text, in execution order.
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ShutdownPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action.
    pub fn register<F, Fut, E>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<CleanupError>,
    {
        let name = name.into();
        tracing::debug!(action = %name, "Registered for shutdown");
        self.actions.push(CleanupAction {
            name,
            run: Box::new(move || async move { action().await.map_err(Into::into) }.boxed()),
        });
    }

    /// Register `subsystem.stop()`.
    pub fn register_subsystem(&mut self, subsystem: Arc<dyn Subsystem>) {
        let name = subsystem.name().to_string();
        self.register(name, move || async move { subsystem.stop().await });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Names in the order they will run.
    pub fn execution_order(&self) -> Vec<&str> {
        self.actions.iter().rev().map(|a| a.name.as_str()).collect()
    }

    /// Run every action in reverse registration order.
    pub async fn execute(mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        while let Some(action) = self.actions.pop() {
            let CleanupAction { name, run } = action;
            let result = AssertUnwindSafe(run()).catch_unwind().await;
            match result {
                Ok(Ok(())) => {
                    tracing::info!(action = %name, "Stopped");
                    metrics::record_stop(&name, true);
                    report.completed.push(name);
                }
                Ok(Err(e)) => {
                    tracing::error!(action = %name, error = %e, "Failed to stop cleanly");
                    metrics::record_stop(&name, false);
                    report.failed.push((name, e.to_string()));
                }
                Err(_) => {
                    tracing::error!(action = %name, "Cleanup action panicked");
                    metrics::record_stop(&name, false);
                    report.failed.push((name, "panicked".to_string()));
                }
            }
        }
        report
    }
}
