//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check cross-section constraints (gRPC-Web needs gRPC, snapshots need history)
//! - Validate listen addresses, transports and backend names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before any subsystem is constructed

use thiserror::Error;

use crate::abci::Transport;
use crate::config::gas::parse_gas_prices;
use crate::config::pruning::{PruningError, PruningOptions, PruningStrategy};
use crate::config::schema::NodeConfig;
use crate::net::ListenAddr;
use crate::store::DbBackend;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("set min gas price in app.toml or flag or env variable")]
    MissingMinGasPrices,

    #[error("invalid minimum gas prices: {0}")]
    InvalidGasPrices(String),

    #[error(transparent)]
    Pruning(#[from] PruningError),

    #[error("cannot enable state sync snapshots with 'everything' pruning setting")]
    SnapshotsWithPruneEverything,

    #[error("gRPC-Web requires gRPC to be enabled")]
    GrpcWebWithoutGrpc,

    #[error("{field}: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("unknown ABCI transport '{0}' (expected socket or grpc)")]
    UnknownTransport(String),

    #[error("unknown db backend '{0}' (expected memdb or filedb)")]
    UnknownDbBackend(String),

    #[error("consensus.block_interval_ms must be greater than 0")]
    ZeroBlockInterval,
}

/// Validate the whole configuration, collecting every problem found.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let base = &config.base;
    if base.minimum_gas_prices.trim().is_empty() {
        errors.push(ValidationError::MissingMinGasPrices);
    } else if let Err(reason) = parse_gas_prices(&base.minimum_gas_prices) {
        errors.push(ValidationError::InvalidGasPrices(reason));
    }

    match PruningOptions::from_config(base) {
        Ok(opts) => {
            if opts.strategy == PruningStrategy::Everything && config.state_sync.snapshot_interval > 0 {
                errors.push(ValidationError::SnapshotsWithPruneEverything);
            }
        }
        Err(e) => errors.push(e.into()),
    }

    if base.app_db_backend.parse::<DbBackend>().is_err() {
        errors.push(ValidationError::UnknownDbBackend(base.app_db_backend.clone()));
    }

    if config.abci.transport.parse::<Transport>().is_err() {
        errors.push(ValidationError::UnknownTransport(config.abci.transport.clone()));
    }
    check_address(&mut errors, "abci.address", &config.abci.address);

    if config.consensus.block_interval_ms == 0 {
        errors.push(ValidationError::ZeroBlockInterval);
    }

    if config.grpc_web.enable && !config.grpc.enable {
        errors.push(ValidationError::GrpcWebWithoutGrpc);
    }
    if config.api.enable {
        check_address(&mut errors, "api.address", &config.api.address);
    }
    if config.grpc.enable {
        check_address(&mut errors, "grpc.address", &config.grpc.address);
    }
    if config.grpc_web.enable {
        check_address(&mut errors, "grpc_web.address", &config.grpc_web.address);
    }
    if config.rosetta.enable {
        check_address(&mut errors, "rosetta.address", &config.rosetta.address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, address: &str) {
    if let Err(e) = address.parse::<ListenAddr>() {
        errors.push(ValidationError::InvalidAddress {
            field,
            reason: e.to_string(),
        });
    }
}
