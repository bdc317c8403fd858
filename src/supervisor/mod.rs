//! Process supervisor: decides what runs, starts it in order, tears it down in reverse.
//!
//! # Data Flow
//! ```text
//! RunContext
//!     ├─ abci.with_consensus = false → standalone.rs
//!     │     store → app → ABCI listener → wait → stop listener
//!     └─ abci.with_consensus = true  → in_process.rs
//!           profiler → store → app → genesis → node → local client
//!           → API → gRPC → gRPC-Web → Rosetta (each raced against the window)
//!           → wait → ShutdownPlan (reverse order)
//! ```
//!
//! # Design Decisions
//! - Everything that started is registered in one `ShutdownPlan`
//! - A fast startup failure unwinds the partial plan, then returns the original error
//! - Stop failures are logged and absorbed, except the standalone listener's

mod context;
mod in_process;
mod standalone;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use crate::app::{AppCreator, AppEnv, AppError, Application};
use crate::config::ConfigError;
use crate::lifecycle::{QuitReason, QuitWaiter, ShutdownPlan, SignalError, StartupWindow};
use crate::net::ListenerError;
use crate::node::{GenesisError, NodeFactory};
use crate::server::ServiceFactory;
use crate::store::{open_db, open_trace_writer, DbBackend, StoreError};
use crate::subsystem::{Subsystem, SubsystemError};

pub use context::RunContext;

/// Why a run ended with an error.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Genesis(#[from] GenesisError),

    #[error("failed to create application: {0}")]
    App(AppError),

    #[error("failed to start CPU profiler: {0}")]
    Profiler(#[source] std::io::Error),

    #[error(transparent)]
    Address(#[from] ListenerError),

    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    #[error("consensus node does not provide a local client, required by the API and gRPC servers")]
    MissingLocalClient,

    #[error("failed to stop {subsystem}: {source}")]
    Stop {
        subsystem: String,
        #[source]
        source: SubsystemError,
    },

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Runs one invocation of the node.
pub struct Supervisor {
    ctx: RunContext,
    app_creator: AppCreator,
    node_factory: Arc<dyn NodeFactory>,
    services: Arc<dyn ServiceFactory>,
    window: StartupWindow,
}

impl Supervisor {
    pub fn new(
        ctx: RunContext,
        app_creator: AppCreator,
        node_factory: Arc<dyn NodeFactory>,
        services: Arc<dyn ServiceFactory>,
    ) -> Self {
        Self {
            ctx,
            app_creator,
            node_factory,
            services,
            window: StartupWindow::default(),
        }
    }

    /// Override the startup window (5 seconds by default).
    pub fn with_startup_window(mut self, window: Duration) -> Self {
        self.window = StartupWindow::new(window);
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run until a quit reason arrives or startup fails.
    ///
    /// `quit` must already be armed so that signals delivered during startup are kept.
    pub async fn run(self, quit: QuitWaiter) -> Result<QuitReason, SupervisorError> {
        let span = self.ctx.span.clone();
        async move {
            if self.ctx.config.abci.with_consensus {
                tracing::info!("Starting node with in-process consensus");
                self.run_in_process(quit).await
            } else {
                tracing::info!("Starting ABCI listener without consensus");
                self.run_standalone(quit).await
            }
        }
        .instrument(span)
        .await
    }

    /// Open the store and trace writer, then build the application.
    ///
    /// Registers a store flush so it runs after everything that uses the store.
    fn open_app(&self, plan: &mut ShutdownPlan) -> Result<Arc<dyn Application>, SupervisorError> {
        let base = &self.ctx.config.base;
        let backend: DbBackend = base.app_db_backend.parse()?;
        let data_dir = self.ctx.config.data_dir();
        std::fs::create_dir_all(&data_dir).map_err(|source| StoreError::Io {
            path: data_dir.display().to_string(),
            source,
        })?;
        let store = open_db(&data_dir, backend)?;
        let trace_writer = open_trace_writer(base.trace_store.as_deref())?;

        let flushed = store.clone();
        let trace = trace_writer.clone();
        plan.register("store", move || async move {
            flushed.flush()?;
            match trace {
                Some(trace) => trace.flush(),
                None => Ok::<(), StoreError>(()),
            }
        });

        let env = AppEnv {
            span: self.ctx.span_for("app"),
            store,
            trace_writer,
            options: self.ctx.options.clone(),
        };
        (self.app_creator)(env).map_err(SupervisorError::App)
    }

    /// Race `subsystem` against the startup window; register it if it came up.
    async fn launch(&self, subsystem: Arc<dyn Subsystem>, plan: &mut ShutdownPlan) -> Result<(), SupervisorError> {
        let outcome = self.window.race(subsystem.clone()).await;
        if outcome.is_running() {
            plan.register_subsystem(subsystem);
            Ok(())
        } else {
            outcome.into_result().map_err(SupervisorError::from)
        }
    }
}

/// Execute `plan` after a startup failure and hand back `err` unchanged.
async fn unwind<T>(plan: ShutdownPlan, err: SupervisorError) -> Result<T, SupervisorError> {
    tracing::error!(error = %err, stopping = plan.len(), "Startup failed; stopping what already started");
    let report = plan.execute().await;
    if !report.is_clean() {
        tracing::warn!(failed = ?report.failed, "Some cleanups failed during unwind");
    }
    Err(err)
}
