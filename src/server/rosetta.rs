//! Rosetta Data API server (network endpoints).
//!
//! `/network/status` is answered from the gRPC endpoint and needs online mode;
//! `/network/list` and `/network/options` work offline too.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::{GrpcConfig, RosettaConfig};
use crate::net::{ListenAddr, ListenerError};
use crate::resilience::RetryPolicy;
use crate::server::client::GrpcClient;
use crate::server::registry::{GrpcCode, GrpcStatus};
use crate::server::services::GET_LATEST_BLOCK;

pub const ROSETTA_VERSION: &str = "1.4.13";

/// Resolved Rosetta settings.
#[derive(Debug, Clone)]
pub struct RosettaSettings {
    pub address: ListenAddr,
    pub blockchain: String,
    pub network: String,
    pub retries: u32,
    pub offline: bool,
    /// gRPC endpoint dialled in online mode.
    pub grpc_endpoint: Option<String>,
}

impl RosettaSettings {
    /// Resolve settings, forcing offline mode when gRPC is disabled.
    pub fn from_config(rosetta: &RosettaConfig, grpc: &GrpcConfig) -> Result<Self, ListenerError> {
        let address = rosetta.address.parse()?;
        let grpc_endpoint = if grpc.enable {
            grpc.address.parse::<ListenAddr>()?.loopback()
        } else {
            None
        };
        let offline = rosetta.offline || grpc_endpoint.is_none();
        if offline && !rosetta.offline {
            tracing::info!(module = "rosetta", "gRPC is disabled; Rosetta runs in offline mode");
        }
        Ok(Self {
            address,
            blockchain: rosetta.blockchain.clone(),
            network: rosetta.network.clone(),
            retries: rosetta.retries,
            offline,
            grpc_endpoint,
        })
    }
}

#[derive(Clone)]
struct RosettaState {
    blockchain: String,
    network: String,
    client: Option<GrpcClient>,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct NetworkIdentifier {
    blockchain: String,
    network: String,
}

#[derive(Debug, Deserialize)]
struct NetworkRequest {
    network_identifier: NetworkIdentifier,
}

/// Rosetta error object.
#[derive(Debug, Clone, Serialize)]
struct RosettaError {
    code: u32,
    message: String,
    retriable: bool,
}

impl RosettaError {
    const OFFLINE: u32 = 1;
    const UNAVAILABLE: u32 = 2;
    const BAD_NETWORK: u32 = 3;
    const NO_BLOCKS: u32 = 4;

    fn new(code: u32, message: impl Into<String>, retriable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retriable,
        }
    }

    fn catalogue() -> Vec<Self> {
        vec![
            Self::new(Self::OFFLINE, "endpoint unavailable in offline mode", false),
            Self::new(Self::UNAVAILABLE, "node endpoint unavailable", true),
            Self::new(Self::BAD_NETWORK, "unsupported network identifier", false),
            Self::new(Self::NO_BLOCKS, "no block produced yet", true),
        ]
    }
}

impl IntoResponse for RosettaError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

/// Build the Rosetta router.
pub fn rosetta_router(settings: &RosettaSettings) -> Router {
    let client = match (&settings.grpc_endpoint, settings.offline) {
        (Some(endpoint), false) => Some(GrpcClient::new(endpoint.clone())),
        _ => None,
    };
    let state = RosettaState {
        blockchain: settings.blockchain.clone(),
        network: settings.network.clone(),
        client,
        retry: RetryPolicy::new(settings.retries).with_delays(Duration::from_millis(200), Duration::from_secs(5)),
    };
    Router::new()
        .route("/network/list", post(network_list))
        .route("/network/options", post(network_options))
        .route("/network/status", post(network_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

impl RosettaState {
    fn identifier(&self) -> NetworkIdentifier {
        NetworkIdentifier {
            blockchain: self.blockchain.clone(),
            network: self.network.clone(),
        }
    }

    fn check_network(&self, req: &NetworkRequest) -> Result<(), RosettaError> {
        if req.network_identifier == self.identifier() {
            Ok(())
        } else {
            Err(RosettaError::new(
                RosettaError::BAD_NETWORK,
                format!(
                    "unsupported network {}/{}",
                    req.network_identifier.blockchain, req.network_identifier.network
                ),
                false,
            ))
        }
    }
}

async fn network_list(State(state): State<RosettaState>) -> Json<Value> {
    Json(json!({ "network_identifiers": [state.identifier()] }))
}

async fn network_options(
    State(state): State<RosettaState>,
    Json(req): Json<NetworkRequest>,
) -> Result<Json<Value>, RosettaError> {
    state.check_network(&req)?;
    Ok(Json(json!({
        "version": {
            "rosetta_version": ROSETTA_VERSION,
            "node_version": env!("CARGO_PKG_VERSION"),
        },
        "allow": {
            "operation_statuses": [
                { "status": "SUCCESS", "successful": true },
                { "status": "FAILURE", "successful": false },
            ],
            "operation_types": ["kv_write"],
            "errors": RosettaError::catalogue(),
            "historical_balance_lookup": false,
            "call_methods": [],
            "balance_exemptions": [],
            "mempool_coins": false,
        },
    })))
}

async fn network_status(
    State(state): State<RosettaState>,
    Json(req): Json<NetworkRequest>,
) -> Result<Json<Value>, RosettaError> {
    state.check_network(&req)?;
    let client = state.client.as_ref().ok_or_else(|| {
        RosettaError::new(RosettaError::OFFLINE, "/network/status is unavailable in offline mode", false)
    })?;

    let request = Value::Null;
    let request = &request;
    let reply = state
        .retry
        .run(
            "rosetta.network_status",
            |status: &GrpcStatus| status.code == GrpcCode::Unavailable,
            move || client.call(GET_LATEST_BLOCK, request),
        )
        .await
        .map_err(|status| match status.code {
            GrpcCode::NotFound => RosettaError::new(RosettaError::NO_BLOCKS, status.message, true),
            _ => RosettaError::new(RosettaError::UNAVAILABLE, status.to_string(), true),
        })?;

    let block = &reply["block"];
    let earliest = reply["earliest_block_height"].as_u64().unwrap_or(1);
    Ok(Json(json!({
        "current_block_identifier": {
            "index": block["height"],
            "hash": reply["block_id"]["hash"],
        },
        "current_block_timestamp": block["time"].as_u64().unwrap_or_default() * 1000,
        "genesis_block_identifier": { "index": 1, "hash": "" },
        "oldest_block_identifier": { "index": earliest, "hash": "" },
        "sync_status": { "synced": true },
        "peers": [],
    })))
}
