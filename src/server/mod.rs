//! Network services that expose a running node.
//!
//! # Data Flow
//! ```text
//! ClientContext (local client, home, chain id, gRPC client)
//!     ├─ api.rs      REST routes + gRPC gateway + /metrics
//!     ├─ grpc.rs     GrpcRegistry served as JSON over HTTP/2
//!     │    └─ grpc_web.rs  same router, browser content types
//!     └─ rosetta.rs  network endpoints, online via client.rs
//! ```
//!
//! # Design Decisions
//! - Every server is an `HttpService` (serve.rs): `start` blocks, `stop` drains
//! - Method handlers live in one shared `GrpcRegistry`; the gRPC-Web proxy
//!   reuses the gRPC server's router instead of registering its own

pub mod api;
pub mod client;
pub mod context;
pub mod factory;
pub mod grpc;
pub mod grpc_web;
pub mod registry;
pub mod rosetta;
pub mod serve;
pub mod services;

pub use client::GrpcClient;
pub use context::ClientContext;
pub use factory::{
    GrpcEndpoint, NetworkServices, ServiceFactory, API_SERVER, GRPC_SERVER, GRPC_WEB_PROXY, ROSETTA_SERVER,
};
pub use registry::{GrpcCode, GrpcRegistry, GrpcStatus};
pub use rosetta::RosettaSettings;
pub use serve::HttpService;
