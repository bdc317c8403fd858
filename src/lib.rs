//! node-launcher: brings a node online and tears it down in order.

// Collaborators
pub mod abci;
pub mod app;
pub mod node;
pub mod store;

// Services and their lifecycle
pub mod lifecycle;
pub mod net;
pub mod server;
pub mod subsystem;
pub mod supervisor;

// Cross-cutting concerns
pub mod config;
pub mod observability;
pub mod resilience;

pub mod cli;

pub use config::NodeConfig;
pub use lifecycle::{QuitReason, QuitWaiter};
pub use supervisor::{RunContext, Supervisor, SupervisorError};
