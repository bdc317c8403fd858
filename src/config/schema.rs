//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the node
//! (`<home>/config/app.toml`). All types derive Serde traits for
//! deserialization from config files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration for a node invocation.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    /// Application home directory. Never read from the file itself.
    #[serde(skip)]
    pub home: PathBuf,

    /// Application-level settings handed to the application factory.
    pub base: BaseConfig,

    /// How the application is driven (embedded engine or ABCI listener).
    pub abci: AbciConfig,

    /// In-process consensus engine settings.
    pub consensus: ConsensusConfig,

    /// REST/JSON API server.
    pub api: ApiConfig,

    /// gRPC server.
    pub grpc: GrpcConfig,

    /// gRPC-Web proxy.
    pub grpc_web: GrpcWebConfig,

    /// Rosetta API server.
    pub rosetta: RosettaConfig,

    /// State sync snapshot settings.
    pub state_sync: StateSyncConfig,

    /// Prometheus exposition.
    pub telemetry: TelemetryConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Directory holding `app.toml` and `genesis.json`.
    pub fn config_dir(&self) -> PathBuf {
        self.home.join("config")
    }

    /// Directory holding the application database.
    pub fn data_dir(&self) -> PathBuf {
        self.home.join("data")
    }

    /// Path of `app.toml`.
    pub fn app_config_file(&self) -> PathBuf {
        self.config_dir().join("app.toml")
    }

    /// Genesis file path, resolved against the home directory when relative.
    pub fn genesis_file(&self) -> PathBuf {
        resolve(&self.home, &self.consensus.genesis_file)
    }
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Minimum gas prices to accept for transactions (e.g. `0.01photino;0.0001stake`).
    pub minimum_gas_prices: String,

    /// Pruning strategy: default, nothing, everything or custom.
    pub pruning: String,

    /// Recent heights to keep on disk (custom pruning only).
    pub pruning_keep_recent: u64,

    /// Height interval between pruning runs (custom pruning only).
    pub pruning_interval: u64,

    /// Block height at which to gracefully halt (0 disables).
    pub halt_height: u64,

    /// Minimum block time in Unix seconds at which to gracefully halt (0 disables).
    pub halt_time: u64,

    /// Minimum block height offset during commit to prune engine blocks.
    pub min_retain_blocks: u64,

    /// Enable inter-block caching.
    pub inter_block_cache: bool,

    /// Event keys to index (empty indexes everything).
    pub index_events: Vec<String>,

    /// Upgrade heights to skip.
    pub unsafe_skip_upgrades: Vec<u64>,

    /// Assert registered invariants every N blocks (0 disables).
    pub inv_check_period: u64,

    /// Include full error traces in ABCI logs.
    pub trace: bool,

    /// Database backend name (`memdb` or `filedb`).
    pub app_db_backend: String,

    /// KV store trace output file. Empty disables tracing.
    pub trace_store: Option<PathBuf>,

    /// CPU profile output file. Empty disables profiling.
    pub cpu_profile: Option<PathBuf>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            minimum_gas_prices: String::new(),
            pruning: "default".to_string(),
            pruning_keep_recent: 0,
            pruning_interval: 0,
            halt_height: 0,
            halt_time: 0,
            min_retain_blocks: 0,
            inter_block_cache: true,
            index_events: Vec::new(),
            unsafe_skip_upgrades: Vec::new(),
            inv_check_period: 0,
            trace: false,
            app_db_backend: "filedb".to_string(),
            trace_store: None,
            cpu_profile: None,
        }
    }
}

/// ABCI wiring.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AbciConfig {
    /// Run the consensus engine in-process. When false only the ABCI listener runs.
    pub with_consensus: bool,

    /// ABCI listen address (`tcp://host:port` or `unix:///path`).
    pub address: String,

    /// ABCI transport: socket or grpc.
    pub transport: String,
}

impl Default for AbciConfig {
    fn default() -> Self {
        Self {
            with_consensus: true,
            address: "tcp://0.0.0.0:26658".to_string(),
            transport: "socket".to_string(),
        }
    }
}

/// In-process consensus engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Human readable node name.
    pub moniker: String,

    /// Genesis document, relative to home unless absolute.
    pub genesis_file: PathBuf,

    /// Engine RPC listen address advertised to Rosetta.
    pub rpc_address: String,

    /// Interval between produced blocks in milliseconds.
    pub block_interval_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            moniker: "node".to_string(),
            genesis_file: PathBuf::from("config/genesis.json"),
            rpc_address: "tcp://127.0.0.1:26657".to_string(),
            block_interval_ms: 1000,
        }
    }
}

/// REST/JSON API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enable: bool,

    /// Listen address (`tcp://host:port`).
    pub address: String,

    /// Allow any origin.
    pub enabled_unsafe_cors: bool,

    /// Maximum number of simultaneous connections (0 = unlimited).
    pub max_open_connections: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable: false,
            address: "tcp://0.0.0.0:1317".to_string(),
            enabled_unsafe_cors: false,
            max_open_connections: 1000,
        }
    }
}

/// gRPC server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub enable: bool,

    /// Listen address (`host:port`).
    pub address: String,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enable: true,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// gRPC-Web proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcWebConfig {
    /// Requires `grpc.enable`.
    pub enable: bool,

    /// Listen address (`host:port`).
    pub address: String,

    /// Allow any origin.
    pub enable_unsafe_cors: bool,
}

impl Default for GrpcWebConfig {
    fn default() -> Self {
        Self {
            enable: true,
            address: "0.0.0.0:9091".to_string(),
            enable_unsafe_cors: false,
        }
    }
}

/// Rosetta API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RosettaConfig {
    pub enable: bool,

    /// Listen address (`host:port`).
    pub address: String,

    /// Blockchain identifier reported by `/network/list`.
    pub blockchain: String,

    /// Network identifier reported by `/network/list`.
    pub network: String,

    /// Attempts made against the gRPC endpoint before giving up.
    pub retries: u32,

    /// Offline mode. Forced on when gRPC is disabled.
    pub offline: bool,
}

impl Default for RosettaConfig {
    fn default() -> Self {
        Self {
            enable: false,
            address: "0.0.0.0:8080".to_string(),
            blockchain: "app".to_string(),
            network: "network".to_string(),
            retries: 3,
            offline: false,
        }
    }
}

/// State sync snapshot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateSyncConfig {
    /// Block interval between snapshots (0 disables).
    pub snapshot_interval: u64,

    /// Number of snapshots to keep.
    pub snapshot_keep_recent: u32,
}

impl Default for StateSyncConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 0,
            snapshot_keep_recent: 2,
        }
    }
}

/// Prometheus exposition through the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
