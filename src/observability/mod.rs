//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, `module` field per service)
//!     → metrics.rs (start/stop outcomes, block height)
//!
//! Consumers:
//!     → stdout
//!     → API server `/metrics` (Prometheus scrape, when telemetry is enabled)
//! ```

pub mod logging;
pub mod metrics;
