//! File-backed backend: a concurrent map persisted as JSON on flush.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::store::{KvStore, StoreError};

/// Keys and values are hex encoded on disk.
pub struct FileDb {
    inner: DashMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileDb {
    /// Open `path`, loading existing contents if the file exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Self {
            inner: DashMap::new(),
            path: path.to_path_buf(),
        };
        if path.exists() {
            let file = File::open(path).map_err(|e| db.io(e))?;
            let map: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(file))
                .map_err(|source| StoreError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?;
            for (k, v) in map {
                match (hex::decode(&k), hex::decode(&v)) {
                    (Ok(k), Ok(v)) => {
                        db.inner.insert(k, v);
                    }
                    _ => tracing::warn!(path = %path.display(), key = %k, "Skipping undecodable store entry"),
                }
            }
            tracing::info!(path = %path.display(), keys = db.inner.len(), "Loaded application database");
        }
        Ok(db)
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl KvStore for FileDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io(e))?;
        }
        let map: BTreeMap<String, String> = self
            .inner
            .iter()
            .map(|r| (hex::encode(r.key()), hex::encode(r.value())))
            .collect();

        // Write aside and rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        let file = File::create(&tmp).map_err(|e| self.io(e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &map).map_err(|source| StoreError::Corrupt {
            path: tmp.display().to_string(),
            source,
        })?;
        writer.flush().map_err(|e| self.io(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io(e))?;
        tracing::debug!(path = %self.path.display(), keys = map.len(), "Flushed application database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushed_contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/application.db.json");

        let db = FileDb::open(&path).unwrap();
        db.set(b"alpha", b"1").unwrap();
        db.set(b"beta", b"2").unwrap();
        db.delete(b"alpha").unwrap();
        db.flush().unwrap();

        let reopened = FileDb::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(b"beta").unwrap(), Some(b"2".to_vec()));
        assert_eq!(reopened.get(b"alpha").unwrap(), None);
    }

    #[test]
    fn unflushed_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.db.json");

        let db = FileDb::open(&path).unwrap();
        db.set(b"k", b"v").unwrap();
        drop(db);

        assert!(FileDb::open(&path).unwrap().is_empty());
    }
}
