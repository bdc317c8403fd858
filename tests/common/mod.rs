//! Shared fixtures for supervisor integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;

use node_launcher::abci::{RequestQuery, ResponseQuery, Transport};
use node_launcher::app::{AppCreator, Application, KvStoreApp};
use node_launcher::config::{ApiConfig, ConsensusConfig, GrpcConfig, GrpcWebConfig, NodeConfig};
use node_launcher::lifecycle::Shutdown;
use node_launcher::net::ListenAddr;
use node_launcher::node::{
    BlockSummary, ClientError, ConsensusNode, GenesisDoc, LocalClient, LocalClientProvider, NodeFactory,
    NodeService, NodeStatus, TxResult,
};
use node_launcher::server::{
    ClientContext, GrpcEndpoint, GrpcRegistry, RosettaSettings, ServiceFactory, API_SERVER, GRPC_SERVER,
    GRPC_WEB_PROXY, ROSETTA_SERVER,
};
use node_launcher::subsystem::{Subsystem, SubsystemError};

pub const ABCI_SERVER: &str = "abci-server";
pub const NODE: &str = "consensus-node";

/// Startup window short enough to keep the suite fast.
pub const WINDOW: Duration = Duration::from_millis(100);

/// Ordered log of what the mocks saw: `build:x`, `start:x`, `stop:x`.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Only the events with `prefix`, prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_owned))
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }
}

/// How a mock service behaves when started.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Block until stopped, like a real accept loop.
    Serve,
    /// Return `Ok` at once.
    Return,
    /// Return this error at once.
    FailFast(String),
}

pub struct MockService {
    name: String,
    behavior: Behavior,
    events: Events,
    shutdown: Shutdown,
    fail_stop: bool,
}

impl MockService {
    pub fn new(name: &str, behavior: Behavior, events: Events) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            events,
            shutdown: Shutdown::new(),
            fail_stop: false,
        }
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }
}

#[async_trait]
impl Subsystem for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.events.push(format!("start:{}", self.name));
        match &self.behavior {
            Behavior::Serve => {
                self.shutdown.subscribe().recv().await;
                Ok(())
            }
            Behavior::Return => Ok(()),
            Behavior::FailFast(message) => Err(SubsystemError::failed(&self.name, message.clone())),
        }
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.events.push(format!("stop:{}", self.name));
        self.shutdown.trigger();
        if self.fail_stop {
            return Err(SubsystemError::failed(&self.name, "stop failed"));
        }
        Ok(())
    }
}

/// `ServiceFactory` that hands out mocks and records what it built.
#[derive(Clone, Default)]
pub struct RecordingServices {
    pub events: Events,
    behaviors: Arc<HashMap<String, Behavior>>,
    failing_stops: Arc<Vec<String>>,
}

impl RecordingServices {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_behavior(mut self, name: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.behaviors).insert(name.to_string(), behavior);
        self
    }

    pub fn with_failing_stop(mut self, name: &str) -> Self {
        Arc::make_mut(&mut self.failing_stops).push(name.to_string());
        self
    }

    fn build(&self, name: &str, default: Behavior) -> Arc<dyn Subsystem> {
        self.events.push(format!("build:{name}"));
        let behavior = self.behaviors.get(name).cloned().unwrap_or(default);
        let mut service = MockService::new(name, behavior, self.events.clone());
        if self.failing_stops.iter().any(|n| n == name) {
            service = service.failing_stop();
        }
        Arc::new(service)
    }
}

impl ServiceFactory for RecordingServices {
    fn abci_listener(
        &self,
        _address: &ListenAddr,
        _transport: Transport,
        _app: Arc<dyn Application>,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(self.build(ABCI_SERVER, Behavior::Return))
    }

    fn api_server(
        &self,
        _ctx: ClientContext,
        _app: &Arc<dyn Application>,
        _config: &ApiConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(self.build(API_SERVER, Behavior::Serve))
    }

    fn grpc_server(
        &self,
        _registry: GrpcRegistry,
        _app: &Arc<dyn Application>,
        _config: &GrpcConfig,
    ) -> Result<GrpcEndpoint, SubsystemError> {
        Ok(GrpcEndpoint {
            server: self.build(GRPC_SERVER, Behavior::Serve),
            router: Router::new(),
        })
    }

    fn grpc_web_proxy(
        &self,
        _grpc: &GrpcEndpoint,
        _config: &GrpcWebConfig,
    ) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(self.build(GRPC_WEB_PROXY, Behavior::Serve))
    }

    fn rosetta_server(&self, _settings: RosettaSettings) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(self.build(ROSETTA_SERVER, Behavior::Serve))
    }
}

/// Node service that answers with fixed values.
struct IdleNodeService;

impl NodeService for IdleNodeService {
    fn broadcast_tx(&self, _tx: Vec<u8>) -> Result<TxResult, ClientError> {
        Err(ClientError::NotRunning)
    }

    fn abci_query(&self, _req: RequestQuery) -> ResponseQuery {
        ResponseQuery::default()
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::default()
    }

    fn latest_block(&self) -> Option<BlockSummary> {
        None
    }

    fn block(&self, _height: u64) -> Option<BlockSummary> {
        None
    }
}

pub struct MockNode {
    events: Events,
    running: AtomicBool,
    with_client: bool,
}

#[async_trait]
impl Subsystem for MockNode {
    fn name(&self) -> &str {
        NODE
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        self.events.push(format!("start:{NODE}"));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.events.push(format!("stop:{NODE}"));
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl ConsensusNode for MockNode {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn local_client_provider(&self) -> Option<&dyn LocalClientProvider> {
        if self.with_client {
            Some(self)
        } else {
            None
        }
    }
}

impl LocalClientProvider for MockNode {
    fn local_client(&self) -> Result<LocalClient, SubsystemError> {
        Ok(LocalClient::new(Arc::new(IdleNodeService)))
    }
}

/// `NodeFactory` producing `MockNode`s.
#[derive(Clone)]
pub struct RecordingNodes {
    pub events: Events,
    pub with_client: bool,
}

impl RecordingNodes {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            with_client: true,
        }
    }

    pub fn without_client(mut self) -> Self {
        self.with_client = false;
        self
    }
}

impl NodeFactory for RecordingNodes {
    fn new_node(
        &self,
        _config: &ConsensusConfig,
        _span: tracing::Span,
        _app: Arc<dyn Application>,
        _genesis: GenesisDoc,
    ) -> Result<Arc<dyn ConsensusNode>, SubsystemError> {
        self.events.push(format!("build:{NODE}"));
        Ok(Arc::new(MockNode {
            events: self.events.clone(),
            running: AtomicBool::new(false),
            with_client: self.with_client,
        }))
    }
}

pub fn kvstore_creator() -> AppCreator {
    Arc::new(KvStoreApp::create)
}

/// Config rooted at `home` with an in-memory store and a genesis file on disk.
pub fn node_config(home: &Path) -> NodeConfig {
    let mut config = NodeConfig::with_home(home);
    config.base.minimum_gas_prices = "0stake".into();
    config.base.app_db_backend = "memdb".into();
    GenesisDoc::new("test-chain")
        .save(&config.genesis_file())
        .unwrap();
    config
}

/// Turn every auxiliary service on or off at once.
pub fn enable_all(config: &mut NodeConfig, enabled: bool) {
    config.api.enable = enabled;
    config.grpc.enable = enabled;
    config.grpc_web.enable = enabled;
    config.rosetta.enable = enabled;
}

/// A free TCP port on the loopback interface.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
