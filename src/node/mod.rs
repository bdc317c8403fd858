//! Consensus node collaborator.
//!
//! # Data Flow
//! ```text
//! GenesisDoc + Arc<dyn Application>
//!     → NodeFactory::new_node
//!     → Arc<dyn ConsensusNode> (started synchronously by the supervisor)
//!         └─ LocalClientProvider → LocalClient (API, gRPC services)
//! ```
//!
//! # Design Decisions
//! - The in-process client is an explicit capability; a node without it can
//!   still run, but not alongside the API or gRPC servers

pub mod client;
pub mod genesis;
pub mod local;

use std::sync::Arc;

use crate::app::Application;
use crate::config::ConsensusConfig;
use crate::subsystem::{Subsystem, SubsystemError};

pub use client::{BlockSummary, ClientError, LocalClient, NodeService, NodeStatus, TxResult};
pub use genesis::{GenesisDoc, GenesisError};
pub use local::{LocalNode, LocalNodeFactory};

/// Mints clients that talk to a node without a network hop.
pub trait LocalClientProvider: Send + Sync {
    fn local_client(&self) -> Result<LocalClient, SubsystemError>;
}

/// A consensus engine running inside this process.
pub trait ConsensusNode: Subsystem {
    fn is_running(&self) -> bool;

    /// The in-process client capability, when the engine has one.
    fn local_client_provider(&self) -> Option<&dyn LocalClientProvider> {
        None
    }
}

/// Constructs the consensus node for one invocation.
pub trait NodeFactory: Send + Sync {
    fn new_node(
        &self,
        config: &ConsensusConfig,
        span: tracing::Span,
        app: Arc<dyn Application>,
        genesis: GenesisDoc,
    ) -> Result<Arc<dyn ConsensusNode>, SubsystemError>;
}
