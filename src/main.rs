//! node-launcher
//!
//! # Architecture Overview
//!
//! ```text
//!   app.toml + flags ─▶ RunContext ─▶ Supervisor
//!                                        │
//!              ┌─────────────────────────┴──────────────────────────┐
//!              │ with consensus                    without consensus │
//!              ▼                                                    ▼
//!   profiler, store, app, node                         store, app, ABCI listener
//!   API ─ gRPC ─ gRPC-Web ─ Rosetta
//!              │                                                    │
//!              └──────────── quit signal or halt ───────────────────┘
//!                                        │
//!                               ShutdownPlan (reverse order)
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use node_launcher::app::{AppCreator, KvStoreApp};
use node_launcher::cli::{init_home, Cli, Command, StartArgs};
use node_launcher::config::load_config;
use node_launcher::lifecycle::QuitWaiter;
use node_launcher::node::LocalNodeFactory;
use node_launcher::observability::{logging::init_logging, metrics::install_prometheus};
use node_launcher::server::NetworkServices;
use node_launcher::{RunContext, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Start(args) => start(args).await,
        Command::Init(args) => {
            init_logging("info");
            match init_home(args) {
                Ok(config) => {
                    println!("Initialized {}", config.home.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "Init failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn start(args: StartArgs) -> ExitCode {
    let home = args.home();
    let mut config = match load_config(&home) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            tracing::error!(error = %e, home = %home.display(), "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);
    init_logging(&config.logging.level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), home = %home.display(), "node-launcher starting");

    let telemetry = config.telemetry.enabled;
    let ctx = match RunContext::new(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Armed before anything starts so an early Ctrl-C is not lost.
    let (quit, trigger) = match QuitWaiter::arm() {
        Ok(armed) => armed,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };
    let ctx = ctx.with_halt_trigger(trigger);

    let metrics = if telemetry { install_prometheus() } else { None };
    let app_creator: AppCreator = Arc::new(KvStoreApp::create);
    let supervisor = Supervisor::new(
        ctx,
        app_creator,
        Arc::new(LocalNodeFactory),
        Arc::new(NetworkServices::new().with_metrics(metrics)),
    );

    match supervisor.run(quit).await {
        Ok(reason) => {
            tracing::info!(%reason, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Node exited with error");
            ExitCode::FAILURE
        }
    }
}
