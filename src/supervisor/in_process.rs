//! In-process mode: consensus node plus the network services that expose it.

use std::sync::Arc;

use crate::lifecycle::{CpuProfiler, QuitReason, QuitWaiter, ShutdownPlan};
use crate::net::ListenAddr;
use crate::node::{ConsensusNode, GenesisDoc};
use crate::observability::metrics;
use crate::server::{ClientContext, GrpcClient, GrpcRegistry, RosettaSettings};
use crate::supervisor::{unwind, Supervisor, SupervisorError};

impl Supervisor {
    pub(super) async fn run_in_process(self, quit: QuitWaiter) -> Result<QuitReason, SupervisorError> {
        let mut plan = ShutdownPlan::new();
        if let Err(e) = self.start_in_process(&mut plan).await {
            return unwind(plan, e).await;
        }
        tracing::info!(running = plan.len(), "Node is up");

        let reason = quit.wait().await;
        match &reason {
            Ok(reason) => tracing::info!(reason = %reason, "Shutting down"),
            Err(e) => tracing::error!(error = %e, "Quit waiter failed; shutting down"),
        }

        let report = plan.execute().await;
        if !report.is_clean() {
            tracing::warn!(failed = ?report.failed, "Some subsystems did not stop cleanly");
        }
        Ok(reason?)
    }

    /// Bring everything up in dependency order, registering each piece as it comes up.
    async fn start_in_process(&self, plan: &mut ShutdownPlan) -> Result<(), SupervisorError> {
        let config = &self.ctx.config;

        if let Some(profiler) =
            CpuProfiler::acquire(config.base.cpu_profile.as_deref()).map_err(SupervisorError::Profiler)?
        {
            plan.register("cpu-profiler", move || async move { profiler.release() });
        }

        let app = self.open_app(plan)?;

        let genesis = GenesisDoc::load(&config.genesis_file())?;
        let chain_id = genesis.chain_id.clone();

        let node = self.node_factory.new_node(
            &config.consensus,
            self.ctx.span_for("consensus"),
            app.clone(),
            genesis,
        )?;
        if self.ctx.needs_local_client() && node.local_client_provider().is_none() {
            return Err(SupervisorError::MissingLocalClient);
        }

        if let Err(e) = node.start().await {
            metrics::record_start(node.name(), "failed_fast");
            return Err(e.into());
        }
        metrics::record_start(node.name(), "succeeded");
        register_node(plan, node.clone());

        let mut client_ctx = ClientContext::new()
            .with_home_dir(self.ctx.home())
            .with_chain_id(chain_id);
        let registry = GrpcRegistry::new();
        if let Some(provider) = node.local_client_provider().filter(|_| self.ctx.needs_local_client()) {
            client_ctx = client_ctx.with_client(provider.local_client()?);
            app.register_tx_service(&client_ctx, &registry);
            app.register_tendermint_service(&client_ctx, &registry);
        }

        if config.api.enable {
            let mut api_ctx = client_ctx.clone();
            if config.grpc.enable {
                if let Some(target) = config.grpc.address.parse::<ListenAddr>()?.loopback() {
                    api_ctx = api_ctx.with_grpc_client(GrpcClient::new(target));
                }
            }
            let api = self.services.api_server(api_ctx, &app, &config.api)?;
            self.launch(api, plan).await?;
        }

        let mut grpc = None;
        if config.grpc.enable {
            let endpoint = self.services.grpc_server(registry, &app, &config.grpc)?;
            self.launch(endpoint.server.clone(), plan).await?;
            grpc = Some(endpoint);
        }

        if config.grpc_web.enable {
            if let Some(endpoint) = &grpc {
                let proxy = self.services.grpc_web_proxy(endpoint, &config.grpc_web)?;
                self.launch(proxy, plan).await?;
            }
        }

        if config.rosetta.enable {
            let settings = RosettaSettings::from_config(&config.rosetta, &config.grpc)?;
            let rosetta = self.services.rosetta_server(settings)?;
            self.launch(rosetta, plan).await?;
        }

        Ok(())
    }
}

/// Stop the node on shutdown unless it already stopped on its own.
fn register_node(plan: &mut ShutdownPlan, node: Arc<dyn ConsensusNode>) {
    let name = node.name().to_string();
    plan.register(name, move || async move {
        if node.is_running() {
            node.stop().await
        } else {
            Ok(())
        }
    });
}
