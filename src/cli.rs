//! Command line interface.
//!
//! Flags on `start` override `app.toml` only when given.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::config::{write_config, ConfigError, NodeConfig};
use crate::node::{GenesisDoc, GenesisError};

#[derive(Parser, Debug)]
#[command(name = "node-launcher")]
#[command(about = "Run a node: in-process consensus with API, gRPC and Rosetta servers, or a standalone ABCI listener", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the node until interrupted or halted
    Start(StartArgs),
    /// Write a default app.toml and genesis.json into the home directory
    Init(InitArgs),
}

/// Home directory used when `--home` is not given.
pub fn default_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".node-launcher")
}

#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Application home directory
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Run the consensus engine in-process (false serves ABCI only)
    #[arg(long = "with-tendermint")]
    pub with_consensus: Option<bool>,

    /// ABCI listen address
    #[arg(long)]
    pub address: Option<String>,

    /// ABCI transport: socket or grpc
    #[arg(long)]
    pub transport: Option<String>,

    /// Stream KV store writes to this file
    #[arg(long = "trace-store")]
    pub trace_store: Option<PathBuf>,

    /// Write a CPU profile to this file
    #[arg(long = "cpu-profile")]
    pub cpu_profile: Option<PathBuf>,

    /// Minimum gas prices, e.g. 0.01photino;0.0001stake
    #[arg(long = "minimum-gas-prices")]
    pub minimum_gas_prices: Option<String>,

    /// Halt at this block height (0 disables)
    #[arg(long = "halt-height")]
    pub halt_height: Option<u64>,

    /// Halt at this block time in Unix seconds (0 disables)
    #[arg(long = "halt-time")]
    pub halt_time: Option<u64>,

    /// Pruning strategy: default, nothing, everything or custom
    #[arg(long)]
    pub pruning: Option<String>,

    #[arg(long = "pruning-keep-recent")]
    pub pruning_keep_recent: Option<u64>,

    #[arg(long = "pruning-interval")]
    pub pruning_interval: Option<u64>,

    #[arg(long = "inter-block-cache")]
    pub inter_block_cache: Option<bool>,

    /// Include full error traces in ABCI logs
    #[arg(long)]
    pub trace: Option<bool>,

    #[arg(long = "inv-check-period")]
    pub inv_check_period: Option<u64>,

    #[arg(long = "min-retain-blocks")]
    pub min_retain_blocks: Option<u64>,

    /// Comma separated upgrade heights to skip
    #[arg(long = "unsafe-skip-upgrades", value_delimiter = ',')]
    pub unsafe_skip_upgrades: Vec<u64>,

    /// Comma separated event keys to index
    #[arg(long = "index-events", value_delimiter = ',')]
    pub index_events: Vec<String>,

    /// Database backend: memdb or filedb
    #[arg(long = "db-backend")]
    pub db_backend: Option<String>,

    #[arg(long = "grpc.enable")]
    pub grpc_enable: Option<bool>,

    #[arg(long = "grpc.address")]
    pub grpc_address: Option<String>,

    #[arg(long = "grpc-web.enable")]
    pub grpc_web_enable: Option<bool>,

    #[arg(long = "grpc-web.address")]
    pub grpc_web_address: Option<String>,

    #[arg(long = "state-sync.snapshot-interval")]
    pub snapshot_interval: Option<u64>,

    #[arg(long = "state-sync.snapshot-keep-recent")]
    pub snapshot_keep_recent: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

impl StartArgs {
    pub fn home(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(default_home)
    }

    /// Apply every flag that was given on top of `config`.
    pub fn apply(self, config: &mut NodeConfig) {
        let base = &mut config.base;
        set(&mut base.minimum_gas_prices, self.minimum_gas_prices);
        set(&mut base.halt_height, self.halt_height);
        set(&mut base.halt_time, self.halt_time);
        set(&mut base.pruning, self.pruning);
        set(&mut base.pruning_keep_recent, self.pruning_keep_recent);
        set(&mut base.pruning_interval, self.pruning_interval);
        set(&mut base.inter_block_cache, self.inter_block_cache);
        set(&mut base.trace, self.trace);
        set(&mut base.inv_check_period, self.inv_check_period);
        set(&mut base.min_retain_blocks, self.min_retain_blocks);
        set(&mut base.app_db_backend, self.db_backend);
        if self.trace_store.is_some() {
            base.trace_store = self.trace_store;
        }
        if self.cpu_profile.is_some() {
            base.cpu_profile = self.cpu_profile;
        }
        if !self.unsafe_skip_upgrades.is_empty() {
            base.unsafe_skip_upgrades = self.unsafe_skip_upgrades;
        }
        if !self.index_events.is_empty() {
            base.index_events = self.index_events;
        }

        set(&mut config.abci.with_consensus, self.with_consensus);
        set(&mut config.abci.address, self.address);
        set(&mut config.abci.transport, self.transport);
        set(&mut config.grpc.enable, self.grpc_enable);
        set(&mut config.grpc.address, self.grpc_address);
        set(&mut config.grpc_web.enable, self.grpc_web_enable);
        set(&mut config.grpc_web.address, self.grpc_web_address);
        set(&mut config.state_sync.snapshot_interval, self.snapshot_interval);
        set(&mut config.state_sync.snapshot_keep_recent, self.snapshot_keep_recent);
        set(&mut config.logging.level, self.log_level);
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Application home directory
    #[arg(long)]
    pub home: Option<PathBuf>,

    #[arg(long = "chain-id", default_value = "test-chain")]
    pub chain_id: String,

    #[arg(long, default_value = "node")]
    pub moniker: String,

    /// Replace existing files
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Genesis(#[from] GenesisError),

    #[error("{0} already exists (use --overwrite to replace it)")]
    Exists(PathBuf),
}

fn refuse_existing(path: &Path, overwrite: bool) -> Result<(), InitError> {
    if path.exists() && !overwrite {
        return Err(InitError::Exists(path.to_path_buf()));
    }
    Ok(())
}

/// Write `app.toml` and `genesis.json` for a fresh single-node chain.
pub fn init_home(args: InitArgs) -> Result<NodeConfig, InitError> {
    let home = args.home.unwrap_or_else(default_home);
    let mut config = NodeConfig::with_home(home);
    config.base.minimum_gas_prices = "0stake".to_string();
    config.consensus.moniker = args.moniker;

    refuse_existing(&config.app_config_file(), args.overwrite)?;
    refuse_existing(&config.genesis_file(), args.overwrite)?;

    write_config(&config)?;
    GenesisDoc::new(args.chain_id).save(&config.genesis_file())?;
    tracing::info!(home = %config.home.display(), "Initialized node home");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{finalize_config, load_config};

    #[test]
    fn only_given_flags_override() {
        let cli = Cli::try_parse_from([
            "node-launcher",
            "start",
            "--halt-height",
            "100",
            "--grpc.enable=false",
            "--grpc-web.enable=false",
            "--unsafe-skip-upgrades",
            "5,7",
        ])
        .unwrap();
        let Command::Start(args) = cli.command else {
            panic!("expected start");
        };

        let mut config = NodeConfig::with_home("/tmp/node");
        config.base.pruning = "nothing".into();
        args.apply(&mut config);

        assert_eq!(config.base.halt_height, 100);
        assert!(!config.grpc.enable);
        assert!(!config.grpc_web.enable);
        assert_eq!(config.base.unsafe_skip_upgrades, vec![5, 7]);
        assert_eq!(config.base.pruning, "nothing");
        assert_eq!(config.grpc.address, "0.0.0.0:9090");
    }

    #[test]
    fn init_writes_a_startable_home() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs {
            home: Some(dir.path().to_path_buf()),
            chain_id: "demo-1".into(),
            moniker: "alpha".into(),
            overwrite: false,
        };
        init_home(args).unwrap();

        let config = finalize_config(load_config(dir.path()).unwrap()).unwrap();
        assert_eq!(config.base.minimum_gas_prices, "0stake");
        assert_eq!(config.consensus.moniker, "alpha");
        let genesis = GenesisDoc::load(&config.genesis_file()).unwrap();
        assert_eq!(genesis.chain_id, "demo-1");
    }

    #[test]
    fn init_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let args = || InitArgs {
            home: Some(dir.path().to_path_buf()),
            chain_id: "demo-1".into(),
            moniker: "alpha".into(),
            overwrite: false,
        };
        init_home(args()).unwrap();
        assert!(matches!(init_home(args()), Err(InitError::Exists(_))));
    }
}
