//! Long-running services managed by the supervisor.
//!
//! # Lifecycle
//! ```text
//! constructed (dependencies running) → start() once → stop() at most once
//! ```
//!
//! Auxiliary servers (API, gRPC, gRPC-Web, Rosetta) block inside `start` for
//! the life of the service and are raced against the startup window. The
//! consensus node and the ABCI listener return from `start` promptly and run
//! their own tasks.

use async_trait::async_trait;
use thiserror::Error;

use crate::net::ListenerError;

/// Errors reported by a subsystem's `start` or `stop`.
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("{subsystem}: {source}")]
    Listen {
        subsystem: String,
        #[source]
        source: ListenerError,
    },

    #[error("{subsystem}: {source}")]
    Io {
        subsystem: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{subsystem}: already started")]
    AlreadyStarted { subsystem: String },

    #[error("{subsystem}: start task ended without reporting")]
    Aborted { subsystem: String },

    #[error("{subsystem}: {message}")]
    Failed { subsystem: String, message: String },
}

impl SubsystemError {
    pub fn failed(subsystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            subsystem: subsystem.into(),
            message: message.into(),
        }
    }

    pub fn io(subsystem: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            subsystem: subsystem.into(),
            source,
        }
    }

    pub fn listen(subsystem: impl Into<String>, source: ListenerError) -> Self {
        Self::Listen {
            subsystem: subsystem.into(),
            source,
        }
    }

    pub fn already_started(subsystem: impl Into<String>) -> Self {
        Self::AlreadyStarted {
            subsystem: subsystem.into(),
        }
    }
}

/// A service with start/stop semantics.
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    /// Stable name used in logs, metrics and the shutdown plan.
    fn name(&self) -> &str;

    /// Start the service. May block for the life of the service.
    async fn start(&self) -> Result<(), SubsystemError>;

    /// Stop the service. Stopping an already stopped service is not an error.
    async fn stop(&self) -> Result<(), SubsystemError>;
}
