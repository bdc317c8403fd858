//! KV store tracing: every write and delete is streamed to a file as a JSON line.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::store::{KvStore, SharedStore, StoreError};

/// Shared, append-only trace sink.
#[derive(Clone)]
pub struct TraceWriter {
    path: Arc<str>,
    inner: Arc<Mutex<BufWriter<File>>>,
}

#[derive(Serialize)]
struct TraceOperation<'a> {
    operation: &'a str,
    key: String,
    value: String,
}

impl TraceWriter {
    fn record(&self, operation: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let entry = TraceOperation {
            operation,
            key: hex::encode(key),
            value: hex::encode(value),
        };
        let mut writer = self.inner.lock();
        serde_json::to_writer(&mut *writer, &entry).map_err(|source| StoreError::Corrupt {
            path: self.path.to_string(),
            source,
        })?;
        writer.write_all(b"\n").map_err(|e| self.io(e))
    }

    /// Push buffered trace lines to the file.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.lock().flush().map_err(|e| self.io(e))
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.to_string(),
            source,
        }
    }
}

/// Open the trace file for appending. `None` (or an empty path) disables tracing.
pub fn open_trace_writer(path: Option<&Path>) -> Result<Option<TraceWriter>, StoreError> {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };
    let file = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
    tracing::info!(path = %path.display(), "KV store tracing enabled");
    Ok(Some(TraceWriter {
        path: Arc::from(path.display().to_string()),
        inner: Arc::new(Mutex::new(BufWriter::new(file))),
    }))
}

/// Store wrapper that mirrors every mutation into a `TraceWriter`.
pub struct TracedStore {
    inner: SharedStore,
    writer: TraceWriter,
}

impl TracedStore {
    pub fn new(inner: SharedStore, writer: TraceWriter) -> Self {
        Self { inner, writer }
    }

    /// Wrap `store` when a writer is configured, otherwise hand it back untouched.
    pub fn wrap(store: SharedStore, writer: Option<TraceWriter>) -> SharedStore {
        match writer {
            Some(writer) => Arc::new(Self::new(store, writer)),
            None => store,
        }
    }
}

impl KvStore for TracedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.set(key, value)?;
        self.writer.record("write", key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.delete(key)?;
        self.writer.record("delete", key, &[])
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()?;
        self.writer.flush()
    }
}
