//! In-process client for a running consensus node.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::abci::types::{RequestQuery, ResponseQuery};

/// Errors returned through a `LocalClient`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("node is not running")]
    NotRunning,

    #[error("mempool is full ({0} transactions)")]
    MempoolFull(usize),
}

/// Node status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub moniker: String,
    pub chain_id: String,
    pub version: String,
    pub latest_block_height: u64,
    pub latest_block_hash: String,
    pub latest_app_hash: String,
    /// Unix seconds of the latest block.
    pub latest_block_time: u64,
    pub earliest_block_height: u64,
    pub catching_up: bool,
}

/// A produced block, without its transactions' payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    pub time: u64,
    pub app_hash: String,
    pub tx_hashes: Vec<String>,
}

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub txhash: String,
    pub code: u32,
    pub log: String,
}

/// Upper-case hex SHA-256 of a transaction.
pub fn tx_hash(tx: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx))
}

/// Operations a node exposes to in-process callers.
pub trait NodeService: Send + Sync + 'static {
    /// Run `check_tx` and, when accepted, queue the transaction for the next block.
    fn broadcast_tx(&self, tx: Vec<u8>) -> Result<TxResult, ClientError>;

    fn abci_query(&self, req: RequestQuery) -> ResponseQuery;

    fn status(&self) -> NodeStatus;

    fn latest_block(&self) -> Option<BlockSummary>;

    fn block(&self, height: u64) -> Option<BlockSummary>;
}

/// Cloneable handle to a node's `NodeService`.
#[derive(Clone)]
pub struct LocalClient {
    inner: Arc<dyn NodeService>,
}

impl LocalClient {
    pub fn new(service: Arc<dyn NodeService>) -> Self {
        Self { inner: service }
    }

    pub fn broadcast_tx(&self, tx: Vec<u8>) -> Result<TxResult, ClientError> {
        self.inner.broadcast_tx(tx)
    }

    pub fn abci_query(&self, req: RequestQuery) -> ResponseQuery {
        self.inner.abci_query(req)
    }

    pub fn status(&self) -> NodeStatus {
        self.inner.status()
    }

    pub fn latest_block(&self) -> Option<BlockSummary> {
        self.inner.latest_block()
    }

    pub fn block(&self, height: u64) -> Option<BlockSummary> {
        self.inner.block(height)
    }
}

impl fmt::Debug for LocalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClient").finish_non_exhaustive()
    }
}
