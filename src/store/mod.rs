//! Application key-value store.
//!
//! # Data Flow
//! ```text
//! base.app_db_backend ("memdb" | "filedb")
//!     → open_db (under <home>/data)
//!     → SharedStore handed to the application factory
//!     → optionally wrapped by trace.rs (every write streamed to a file)
//! ```
//!
//! # Design Decisions
//! - The supervisor treats the store as opaque; no extra locking on top
//! - Backends are interchangeable behind the `KvStore` trait

pub mod filedb;
pub mod memdb;
pub mod trace;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

pub use filedb::FileDb;
pub use memdb::MemDb;
pub use trace::{open_trace_writer, TraceWriter, TracedStore};

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown db backend '{0}'")]
    UnknownBackend(String),
}

/// Byte-oriented key-value storage.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Number of keys held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every write so far durable.
    fn flush(&self) -> Result<(), StoreError>;
}

/// Store handle shared by the application, the engine and the trace wrapper.
pub type SharedStore = Arc<dyn KvStore>;

/// Database backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    MemDb,
    FileDb,
}

impl FromStr for DbBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memdb" => Ok(Self::MemDb),
            "filedb" => Ok(Self::FileDb),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for DbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MemDb => "memdb",
            Self::FileDb => "filedb",
        })
    }
}

/// Open the application database under `data_dir`.
pub fn open_db(data_dir: &Path, backend: DbBackend) -> Result<SharedStore, StoreError> {
    tracing::info!(backend = %backend, dir = %data_dir.display(), "Opening application database");
    match backend {
        DbBackend::MemDb => Ok(Arc::new(MemDb::new())),
        DbBackend::FileDb => Ok(Arc::new(FileDb::open(&data_dir.join("application.db.json"))?)),
    }
}
