//! Node-backed gRPC services registered through the application.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::node::{BlockSummary, ClientError, LocalClient, NodeStatus};
use crate::server::context::ClientContext;
use crate::server::registry::{GrpcRegistry, GrpcStatus};

pub const BROADCAST_TX: &str = "/cosmos.tx.v1beta1.Service/BroadcastTx";
pub const GET_NODE_INFO: &str = "/cosmos.base.tendermint.v1beta1.Service/GetNodeInfo";
pub const GET_LATEST_BLOCK: &str = "/cosmos.base.tendermint.v1beta1.Service/GetLatestBlock";
pub const GET_BLOCK_BY_HEIGHT: &str = "/cosmos.base.tendermint.v1beta1.Service/GetBlockByHeight";

/// Body of a broadcast request (gRPC and REST).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastRequest {
    /// Raw transaction as UTF-8 text.
    pub tx: String,
}

#[derive(Debug, Deserialize)]
struct BlockByHeightRequest {
    height: u64,
}

pub fn client_error_status(e: ClientError) -> GrpcStatus {
    match e {
        ClientError::NotRunning => GrpcStatus::unavailable(e.to_string()),
        ClientError::MempoolFull(_) => GrpcStatus::unavailable(e.to_string()),
    }
}

fn require_client(ctx: &ClientContext, service: &str) -> Option<LocalClient> {
    let client = ctx.client().cloned();
    if client.is_none() {
        tracing::warn!(service, "No local client in context; service not registered");
    }
    client
}

/// JSON shape of a node status reply.
pub fn node_info_json(status: &NodeStatus) -> Value {
    json!({
        "default_node_info": {
            "moniker": status.moniker,
            "network": status.chain_id,
            "version": status.version,
        },
        "application_version": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "latest_block_height": status.latest_block_height,
        "catching_up": status.catching_up,
    })
}

/// JSON shape of a block reply.
pub fn block_json(block: &BlockSummary, earliest: u64) -> Value {
    json!({
        "block_id": { "hash": block.hash },
        "block": {
            "height": block.height,
            "time": block.time,
            "app_hash": block.app_hash,
            "num_txs": block.tx_hashes.len(),
            "tx_hashes": block.tx_hashes,
        },
        "earliest_block_height": earliest,
    })
}

/// Register `BroadcastTx`.
pub fn register_tx_service(ctx: &ClientContext, registry: &GrpcRegistry) {
    let Some(client) = require_client(ctx, "tx") else {
        return;
    };
    registry.register(BROADCAST_TX, move |req: Value| {
        let client = client.clone();
        async move {
            let req: BroadcastRequest =
                serde_json::from_value(req).map_err(|e| GrpcStatus::invalid_argument(e.to_string()))?;
            let result = client
                .broadcast_tx(req.tx.into_bytes())
                .map_err(client_error_status)?;
            Ok(json!({ "tx_response": result }))
        }
    });
}

/// Register `GetNodeInfo`, `GetLatestBlock` and `GetBlockByHeight`.
pub fn register_tendermint_service(ctx: &ClientContext, registry: &GrpcRegistry) {
    let Some(client) = require_client(ctx, "tendermint") else {
        return;
    };

    let node = client.clone();
    registry.register(GET_NODE_INFO, move |_| {
        let status = node.status();
        async move { Ok(node_info_json(&status)) }
    });

    let node = client.clone();
    registry.register(GET_LATEST_BLOCK, move |_| {
        let block = node.latest_block();
        let earliest = node.status().earliest_block_height;
        async move {
            match block {
                Some(block) => Ok(block_json(&block, earliest)),
                None => Err(GrpcStatus::not_found("no block produced yet")),
            }
        }
    });

    let node = client;
    registry.register(GET_BLOCK_BY_HEIGHT, move |req: Value| {
        let node = node.clone();
        async move {
            let req: BlockByHeightRequest =
                serde_json::from_value(req).map_err(|e| GrpcStatus::invalid_argument(e.to_string()))?;
            let earliest = node.status().earliest_block_height;
            node.block(req.height)
                .map(|block| block_json(&block, earliest))
                .ok_or_else(|| GrpcStatus::not_found(format!("block {} not available", req.height)))
        }
    });
}
