//! Network layer helpers shared by every listener.
//!
//! # Data Flow
//! ```text
//! Configured address string
//!     → listener.rs (parse tcp:// / unix:// / host:port, bind)
//!     → connection.rs (per-connection tracking, drain on stop)
//!     → Hand off to the ABCI or HTTP layer
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{split_host_port, AcceptedStream, BoundListener, ListenAddr, ListenerError};
