//! Single-validator in-process block producer.
//!
//! # Responsibilities
//! - Handshake with the application (`info`, then `init_chain` on a fresh chain)
//! - Produce a block every `block_interval_ms` from the mempool
//! - Prune recorded blocks below the retain height returned by `commit`
//! - Serve `LocalClient` callers (broadcast, query, status)

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::abci::types::*;
use crate::app::Application;
use crate::config::ConsensusConfig;
use crate::lifecycle::Shutdown;
use crate::node::client::{tx_hash, BlockSummary, ClientError, LocalClient, NodeService, NodeStatus, TxResult};
use crate::node::genesis::GenesisDoc;
use crate::node::{ConsensusNode, LocalClientProvider, NodeFactory};
use crate::observability::metrics;
use crate::subsystem::{Subsystem, SubsystemError};

const NAME: &str = "consensus-node";
const MAX_MEMPOOL_TXS: usize = 5_000;
const MAX_BLOCK_TXS: usize = 1_000;
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// In-process consensus node.
pub struct LocalNode {
    state: Arc<NodeState>,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct NodeState {
    app: Arc<dyn Application>,
    genesis: GenesisDoc,
    config: ConsensusConfig,
    span: tracing::Span,
    mempool: Mutex<VecDeque<Vec<u8>>>,
    blocks: RwLock<BTreeMap<u64, BlockSummary>>,
    status: ArcSwap<NodeStatus>,
    running: AtomicBool,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl LocalNode {
    pub fn new(
        config: &ConsensusConfig,
        span: tracing::Span,
        app: Arc<dyn Application>,
        genesis: GenesisDoc,
    ) -> Self {
        let status = NodeStatus {
            moniker: config.moniker.clone(),
            chain_id: genesis.chain_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..NodeStatus::default()
        };
        Self {
            state: Arc::new(NodeState {
                app,
                genesis,
                config: config.clone(),
                span,
                mempool: Mutex::new(VecDeque::new()),
                blocks: RwLock::new(BTreeMap::new()),
                status: ArcSwap::from_pointee(status),
                running: AtomicBool::new(false),
            }),
            shutdown: Shutdown::new(),
            task: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.state.genesis.chain_id
    }
}

impl NodeState {
    /// Align with the application and return the next height to produce.
    fn handshake(&self) -> u64 {
        let info = self.app.info(RequestInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        if info.last_block_height == 0 {
            tracing::info!(chain_id = %self.genesis.chain_id, "Initialising application from genesis");
            let res = self.app.init_chain(RequestInitChain {
                chain_id: self.genesis.chain_id.clone(),
                time: self.genesis.genesis_time,
                initial_height: self.genesis.initial_height,
                app_state: self.genesis.app_state.clone(),
            });
            self.update_status(|s| s.latest_app_hash = hex::encode_upper(&res.app_hash));
            return self.genesis.initial_height;
        }

        tracing::info!(
            height = info.last_block_height,
            app_hash = %hex::encode_upper(&info.last_block_app_hash),
            "Resuming from application state"
        );
        self.update_status(|s| {
            s.latest_block_height = info.last_block_height;
            s.latest_app_hash = hex::encode_upper(&info.last_block_app_hash);
        });
        info.last_block_height + 1
    }

    fn update_status(&self, f: impl FnOnce(&mut NodeStatus)) {
        let mut next = NodeStatus::clone(&self.status.load());
        f(&mut next);
        self.status.store(Arc::new(next));
    }

    /// Returns false when the application did not reach `height`, so the
    /// same height is tried again on the next tick.
    fn produce_block(&self, height: u64) -> bool {
        let txs: Vec<Vec<u8>> = {
            let mut mempool = self.mempool.lock();
            let take = mempool.len().min(MAX_BLOCK_TXS);
            mempool.drain(..take).collect()
        };

        let mut tx_hashes = Vec::with_capacity(txs.len());
        for tx in txs {
            let res = self.app.deliver_tx(RequestDeliverTx { tx: tx.clone() });
            if res.code != 0 {
                tracing::debug!(height, code = res.code, log = %res.log, "Transaction failed");
            }
            tx_hashes.push(tx_hash(&tx));
        }

        let time = unix_now();
        let commit = self.app.commit(RequestCommit { height, time });
        let committed = self.app.info(RequestInfo::default()).last_block_height;
        if committed < height {
            tracing::warn!(height, committed, "Application did not commit block, retrying");
            metrics::record_commit_failure();
            return false;
        }

        let prev_hash = self.status.load().latest_block_hash.clone();
        let mut hasher = Sha256::new();
        hasher.update(height.to_be_bytes());
        hasher.update(prev_hash.as_bytes());
        for hash in &tx_hashes {
            hasher.update(hash.as_bytes());
        }
        let block = BlockSummary {
            height,
            hash: hex::encode_upper(hasher.finalize()),
            time,
            app_hash: hex::encode_upper(&commit.data),
            tx_hashes,
        };

        let earliest = {
            let mut blocks = self.blocks.write();
            blocks.insert(height, block.clone());
            if commit.retain_height > 0 {
                *blocks = blocks.split_off(&commit.retain_height);
            }
            blocks.keys().next().copied().unwrap_or(height)
        };

        tracing::debug!(height, txs = block.tx_hashes.len(), app_hash = %block.app_hash, "Produced block");
        metrics::record_block_height(height);
        self.update_status(|s| {
            s.latest_block_height = height;
            s.latest_block_hash = block.hash;
            s.latest_app_hash = block.app_hash;
            s.latest_block_time = time;
            s.earliest_block_height = earliest;
        });
        true
    }
}

impl NodeService for NodeState {
    fn broadcast_tx(&self, tx: Vec<u8>) -> Result<TxResult, ClientError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ClientError::NotRunning);
        }
        let txhash = tx_hash(&tx);
        let check = self.app.check_tx(RequestCheckTx { tx: tx.clone() });
        if check.code == 0 {
            let mut mempool = self.mempool.lock();
            if mempool.len() >= MAX_MEMPOOL_TXS {
                return Err(ClientError::MempoolFull(mempool.len()));
            }
            mempool.push_back(tx);
        }
        Ok(TxResult {
            txhash,
            code: check.code,
            log: check.log,
        })
    }

    fn abci_query(&self, req: RequestQuery) -> ResponseQuery {
        self.app.query(req)
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::clone(&self.status.load())
    }

    fn latest_block(&self) -> Option<BlockSummary> {
        self.blocks.read().values().next_back().cloned()
    }

    fn block(&self, height: u64) -> Option<BlockSummary> {
        self.blocks.read().get(&height).cloned()
    }
}

#[async_trait]
impl Subsystem for LocalNode {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(SubsystemError::already_started(NAME));
        }

        let state = self.state.clone();
        let mut next_height = {
            let _enter = state.span.enter();
            state.handshake()
        };

        let interval = Duration::from_millis(state.config.block_interval_ms);
        let mut shutdown = self.shutdown.subscribe();
        state.running.store(true, Ordering::SeqCst);
        tracing::info!(
            module = NAME,
            moniker = %state.config.moniker,
            chain_id = %state.genesis.chain_id,
            next_height,
            interval_ms = state.config.block_interval_ms,
            "Consensus node started"
        );

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let _enter = state.span.enter();
                        if state.produce_block(next_height) {
                            next_height += 1;
                        }
                    }
                }
            }
            state.running.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        self.shutdown.trigger();
        match tokio::time::timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SubsystemError::failed(NAME, format!("block loop failed: {e}"))),
            Err(_) => return Err(SubsystemError::failed(NAME, "block loop did not stop in time")),
        }
        self.state.running.store(false, Ordering::SeqCst);
        tracing::info!(
            module = NAME,
            height = self.state.status.load().latest_block_height,
            "Consensus node stopped"
        );
        Ok(())
    }
}

impl ConsensusNode for LocalNode {
    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    fn local_client_provider(&self) -> Option<&dyn LocalClientProvider> {
        Some(self)
    }
}

impl LocalClientProvider for LocalNode {
    fn local_client(&self) -> Result<LocalClient, SubsystemError> {
        Ok(LocalClient::new(self.state.clone()))
    }
}

/// Builds `LocalNode`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalNodeFactory;

impl NodeFactory for LocalNodeFactory {
    fn new_node(
        &self,
        config: &ConsensusConfig,
        span: tracing::Span,
        app: Arc<dyn Application>,
        genesis: GenesisDoc,
    ) -> Result<Arc<dyn ConsensusNode>, SubsystemError> {
        genesis
            .validate()
            .map_err(|e| SubsystemError::failed(NAME, e.to_string()))?;
        Ok(Arc::new(LocalNode::new(config, span, app, genesis)))
    }
}
