//! Application boundary: the trait the supervisor drives and the factory that builds it.
//!
//! # Data Flow
//! ```text
//! RunContext → AppOptions (+ halt trigger)
//!     → AppCreator(AppEnv { span, store, trace writer, options })
//!     → Arc<dyn Application>
//!         ├─ driven over ABCI by the engine or the ABCI listener
//!         └─ asked to register API routes and gRPC services
//! ```

pub mod kvstore;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Router;

use crate::abci::types::*;
use crate::config::{parse_gas_prices, ApiConfig, GasPrice, NodeConfig, PruningOptions, ValidationError};
use crate::lifecycle::{HaltCondition, QuitTrigger};
use crate::server::{services, ClientContext, GrpcRegistry};
use crate::store::{SharedStore, TraceWriter};

pub use kvstore::KvStoreApp;

/// Error returned by an application factory.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// A state machine driven through ABCI.
pub trait Application: Send + Sync + 'static {
    fn info(&self, req: RequestInfo) -> ResponseInfo;

    fn init_chain(&self, _req: RequestInitChain) -> ResponseInitChain {
        ResponseInitChain::default()
    }

    fn check_tx(&self, req: RequestCheckTx) -> ResponseCheckTx;

    fn deliver_tx(&self, req: RequestDeliverTx) -> ResponseDeliverTx;

    fn commit(&self, req: RequestCommit) -> ResponseCommit;

    fn query(&self, req: RequestQuery) -> ResponseQuery;

    /// Add application routes to the API server.
    fn register_api_routes(&self, router: Router, _config: &ApiConfig) -> Router {
        router
    }

    /// Add application query services to the gRPC registry.
    fn register_grpc_services(&self, _registry: &GrpcRegistry) {}

    /// Register the transaction service backed by the node client.
    fn register_tx_service(&self, client: &ClientContext, registry: &GrpcRegistry) {
        services::register_tx_service(client, registry);
    }

    /// Register the node status service backed by the node client.
    fn register_tendermint_service(&self, client: &ClientContext, registry: &GrpcRegistry) {
        services::register_tendermint_service(client, registry);
    }
}

/// Everything an application factory receives.
pub struct AppEnv {
    /// Parent span for the application's own events.
    pub span: tracing::Span,
    pub store: SharedStore,
    pub trace_writer: Option<TraceWriter>,
    pub options: AppOptions,
}

/// Builds the application for one invocation.
pub type AppCreator = Arc<dyn Fn(AppEnv) -> Result<Arc<dyn Application>, AppError> + Send + Sync>;

/// Typed options handed to the application.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub home: PathBuf,
    pub minimum_gas_prices: Vec<GasPrice>,
    pub pruning: PruningOptions,
    pub halt_height: u64,
    pub halt_time: u64,
    pub min_retain_blocks: u64,
    pub inter_block_cache: bool,
    pub index_events: Vec<String>,
    pub unsafe_skip_upgrades: Vec<u64>,
    pub inv_check_period: u64,
    pub trace: bool,
    pub snapshot_interval: u64,
    pub snapshot_keep_recent: u32,
    /// Raised when a halt boundary is reached.
    pub halt_trigger: Option<QuitTrigger>,
}

impl AppOptions {
    /// Derive options from a validated configuration.
    pub fn from_config(config: &NodeConfig) -> Result<Self, ValidationError> {
        let base = &config.base;
        Ok(Self {
            home: config.home.clone(),
            minimum_gas_prices: parse_gas_prices(&base.minimum_gas_prices)
                .map_err(ValidationError::InvalidGasPrices)?,
            pruning: PruningOptions::from_config(base)?,
            halt_height: base.halt_height,
            halt_time: base.halt_time,
            min_retain_blocks: base.min_retain_blocks,
            inter_block_cache: base.inter_block_cache,
            index_events: base.index_events.clone(),
            unsafe_skip_upgrades: base.unsafe_skip_upgrades.clone(),
            inv_check_period: base.inv_check_period,
            trace: base.trace,
            snapshot_interval: config.state_sync.snapshot_interval,
            snapshot_keep_recent: config.state_sync.snapshot_keep_recent,
            halt_trigger: None,
        })
    }

    pub fn with_halt_trigger(mut self, trigger: QuitTrigger) -> Self {
        self.halt_trigger = Some(trigger);
        self
    }

    pub fn halt_policy(&self) -> HaltPolicy {
        HaltPolicy::new(self.halt_height, self.halt_time, self.halt_trigger.clone())
    }

    /// Height below which blocks may be pruned after committing `height`.
    pub fn retain_height(&self, height: u64) -> u64 {
        if self.min_retain_blocks == 0 {
            0
        } else {
            height.saturating_sub(self.min_retain_blocks)
        }
    }
}

/// Decides at commit time whether a halt boundary has been reached.
#[derive(Debug)]
pub struct HaltPolicy {
    halt_height: u64,
    halt_time: u64,
    trigger: Option<QuitTrigger>,
    raised: AtomicBool,
}

impl HaltPolicy {
    pub fn new(halt_height: u64, halt_time: u64, trigger: Option<QuitTrigger>) -> Self {
        Self {
            halt_height,
            halt_time,
            trigger,
            raised: AtomicBool::new(false),
        }
    }

    /// Returns the condition reached by a block at `height` / `time`, raising it once.
    pub fn check(&self, height: u64, time: u64) -> Option<HaltCondition> {
        let condition = if self.halt_height > 0 && height >= self.halt_height {
            HaltCondition::Height(height)
        } else if self.halt_time > 0 && time >= self.halt_time {
            HaltCondition::Time(time)
        } else {
            return None;
        };

        if !self.raised.swap(true, Ordering::SeqCst) {
            tracing::info!(height, time, %condition, "Halting node per configuration");
            if let Some(trigger) = &self.trigger {
                trigger.halt(condition);
            }
        }
        Some(condition)
    }
}
