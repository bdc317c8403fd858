//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! <home>/config/app.toml
//!     → loader.rs (parse & deserialize, defaults when absent)
//!     → CLI overrides (only flags actually given)
//!     → validation.rs (semantic checks, all errors at once)
//!     → NodeConfig (validated, immutable)
//!     → RunContext, owned by the supervisor for one invocation
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Nothing reads configuration ambiently; it is passed explicitly

pub mod gas;
pub mod loader;
pub mod pruning;
pub mod schema;
pub mod validation;

pub use gas::{parse_gas_prices, GasPrice};
pub use loader::{finalize_config, load_config, write_config, ConfigError};
pub use pruning::{PruningError, PruningOptions, PruningStrategy};
pub use schema::{
    AbciConfig, ApiConfig, BaseConfig, ConsensusConfig, GrpcConfig, GrpcWebConfig, LoggingConfig,
    NodeConfig, RosettaConfig, StateSyncConfig, TelemetryConfig,
};
pub use validation::{validate_config, ValidationError};
