//! Standalone mode: serve the application over ABCI for an external engine.

use crate::abci::Transport;
use crate::lifecycle::{QuitReason, QuitWaiter, ShutdownPlan};
use crate::net::ListenAddr;
use crate::observability::metrics;
use crate::subsystem::SubsystemError;
use crate::supervisor::{unwind, Supervisor, SupervisorError};

const ABCI_LISTENER: &str = "abci-server";

impl Supervisor {
    pub(super) async fn run_standalone(self, quit: QuitWaiter) -> Result<QuitReason, SupervisorError> {
        let mut plan = ShutdownPlan::new();

        let app = match self.open_app(&mut plan) {
            Ok(app) => app,
            Err(e) => return unwind(plan, e).await,
        };

        let abci = &self.ctx.config.abci;
        let listener = abci
            .address
            .parse::<ListenAddr>()
            .map_err(SupervisorError::from)
            .and_then(|address| {
                let transport: Transport = abci
                    .transport
                    .parse()
                    .map_err(|e: String| SubsystemError::failed(ABCI_LISTENER, e))?;
                Ok(self.services.abci_listener(&address, transport, app)?)
            });
        let listener = match listener {
            Ok(listener) => listener,
            Err(e) => return unwind(plan, e).await,
        };

        if let Err(e) = listener.start().await {
            metrics::record_start(listener.name(), "failed_fast");
            return unwind(plan, e.into()).await;
        }
        metrics::record_start(listener.name(), "succeeded");
        tracing::info!(module = listener.name(), address = %abci.address, transport = %abci.transport, "ABCI listener started");

        let reason = quit.wait().await;
        match &reason {
            Ok(reason) => tracing::info!(reason = %reason, "Shutting down"),
            Err(e) => tracing::error!(error = %e, "Quit waiter failed; shutting down"),
        }

        let stopped = listener.stop().await;
        metrics::record_stop(listener.name(), stopped.is_ok());
        let report = plan.execute().await;
        if !report.is_clean() {
            tracing::warn!(failed = ?report.failed, "Some cleanups failed");
        }

        if let Err(source) = stopped {
            return Err(SupervisorError::Stop {
                subsystem: listener.name().to_string(),
                source,
            });
        }
        Ok(reason?)
    }
}
