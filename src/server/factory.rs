//! Construction of every network-facing subsystem.
//!
//! The supervisor only talks to `ServiceFactory`; `NetworkServices` builds the
//! real servers and tests substitute recording factories.

use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::abci::{AbciListener, Transport};
use crate::app::Application;
use crate::config::{ApiConfig, GrpcConfig, GrpcWebConfig};
use crate::net::ListenAddr;
use crate::server::api::api_router;
use crate::server::context::ClientContext;
use crate::server::grpc::grpc_router;
use crate::server::grpc_web::grpc_web_router;
use crate::server::registry::GrpcRegistry;
use crate::server::rosetta::{rosetta_router, RosettaSettings};
use crate::server::serve::HttpService;
use crate::subsystem::{Subsystem, SubsystemError};

pub const API_SERVER: &str = "api-server";
pub const GRPC_SERVER: &str = "grpc-server";
pub const GRPC_WEB_PROXY: &str = "grpc-web-proxy";
pub const ROSETTA_SERVER: &str = "rosetta-server";

/// A gRPC server plus the router it serves, for the gRPC-Web proxy to reuse.
#[derive(Clone)]
pub struct GrpcEndpoint {
    pub server: Arc<dyn Subsystem>,
    pub router: Router,
}

/// Builds the subsystems the supervisor starts.
pub trait ServiceFactory: Send + Sync {
    fn abci_listener(
        &self,
        address: &ListenAddr,
        transport: Transport,
        app: Arc<dyn Application>,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError>;

    fn api_server(
        &self,
        ctx: ClientContext,
        app: &Arc<dyn Application>,
        config: &ApiConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError>;

    fn grpc_server(
        &self,
        registry: GrpcRegistry,
        app: &Arc<dyn Application>,
        config: &GrpcConfig,
    ) -> Result<GrpcEndpoint, SubsystemError>;

    fn grpc_web_proxy(
        &self,
        grpc: &GrpcEndpoint,
        config: &GrpcWebConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError>;

    fn rosetta_server(&self, settings: RosettaSettings) -> Result<Arc<dyn Subsystem>, SubsystemError>;
}

fn parse_address(subsystem: &str, address: &str) -> Result<ListenAddr, SubsystemError> {
    address
        .parse()
        .map_err(|e| SubsystemError::listen(subsystem, e))
}

/// Production factory.
#[derive(Clone, Default)]
pub struct NetworkServices {
    metrics: Option<PrometheusHandle>,
}

impl NetworkServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `/metrics` from the API server with this recorder.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

impl ServiceFactory for NetworkServices {
    fn abci_listener(
        &self,
        address: &ListenAddr,
        transport: Transport,
        app: Arc<dyn Application>,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(Arc::new(AbciListener::new(address.clone(), transport, app)))
    }

    fn api_server(
        &self,
        ctx: ClientContext,
        app: &Arc<dyn Application>,
        config: &ApiConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        let address = parse_address(API_SERVER, &config.address)?;
        let router = api_router(ctx, app, config, self.metrics.clone());
        Ok(Arc::new(HttpService::new(API_SERVER, address, router)))
    }

    fn grpc_server(
        &self,
        registry: GrpcRegistry,
        app: &Arc<dyn Application>,
        config: &GrpcConfig,
    ) -> Result<GrpcEndpoint, SubsystemError> {
        let address = parse_address(GRPC_SERVER, &config.address)?;
        app.register_grpc_services(&registry);
        tracing::debug!(module = GRPC_SERVER, methods = ?registry.methods(), "gRPC services registered");
        let router = grpc_router(registry);
        Ok(GrpcEndpoint {
            server: Arc::new(HttpService::new(GRPC_SERVER, address, router.clone())),
            router,
        })
    }

    fn grpc_web_proxy(
        &self,
        grpc: &GrpcEndpoint,
        config: &GrpcWebConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        let address = parse_address(GRPC_WEB_PROXY, &config.address)?;
        let router = grpc_web_router(grpc.router.clone(), config);
        Ok(Arc::new(HttpService::new(GRPC_WEB_PROXY, address, router)))
    }

    fn rosetta_server(&self, settings: RosettaSettings) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        let router = rosetta_router(&settings);
        Ok(Arc::new(HttpService::new(ROSETTA_SERVER, settings.address, router)))
    }
}
