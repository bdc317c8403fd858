//! Genesis document.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("failed to read genesis file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse genesis file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write genesis file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("genesis chain_id must not be empty")]
    EmptyChainId,

    #[error("genesis initial_height must be at least 1")]
    ZeroInitialHeight,
}

/// Chain identity and initial application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    /// Unix seconds.
    #[serde(default)]
    pub genesis_time: u64,
    #[serde(default = "default_initial_height")]
    pub initial_height: u64,
    #[serde(default)]
    pub app_state: serde_json::Value,
}

fn default_initial_height() -> u64 {
    1
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>) -> Self {
        let genesis_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            chain_id: chain_id.into(),
            genesis_time,
            initial_height: 1,
            app_state: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn validate(&self) -> Result<(), GenesisError> {
        if self.chain_id.trim().is_empty() {
            return Err(GenesisError::EmptyChainId);
        }
        if self.initial_height == 0 {
            return Err(GenesisError::ZeroInitialHeight);
        }
        Ok(())
    }

    /// Read and validate a genesis file.
    pub fn load(path: &Path) -> Result<Self, GenesisError> {
        let raw = std::fs::read_to_string(path).map_err(|source| GenesisError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let doc: Self = serde_json::from_str(&raw).map_err(|source| GenesisError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Write the document as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), GenesisError> {
        let write_err = |source| GenesisError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;
        std::fs::write(path, raw).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("genesis.json");
        let doc = GenesisDoc::new("test-chain");
        doc.save(&path).unwrap();
        assert_eq!(GenesisDoc::load(&path).unwrap(), doc);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, r#"{"chain_id":"c"}"#).unwrap();
        let doc = GenesisDoc::load(&path).unwrap();
        assert_eq!(doc.initial_height, 1);
        assert!(doc.app_state.is_null());
    }

    #[test]
    fn rejects_empty_chain_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.json");
        std::fs::write(&path, r#"{"chain_id":""}"#).unwrap();
        assert!(matches!(GenesisDoc::load(&path), Err(GenesisError::EmptyChainId)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GenesisDoc::load(&dir.path().join("nope.json")),
            Err(GenesisError::Read { .. })
        ));
    }
}
