//! Reference application: a key-value state machine.
//!
//! Transactions are `key=value`, or a bare `key` that stores itself as value.
//! The app hash after each commit is the number of stored keys, big endian.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::abci::types::*;
use crate::app::{AppEnv, AppError, AppOptions, Application, HaltPolicy};
use crate::config::ApiConfig;
use crate::server::{GrpcRegistry, GrpcStatus};
use crate::store::{SharedStore, StoreError, TracedStore};

/// Keys with this prefix are reserved for application metadata.
const META_PREFIX: u8 = b'_';
const HEIGHT_KEY: &[u8] = b"_height";

pub const CODE_OK: u32 = 0;
pub const CODE_MALFORMED: u32 = 1;
pub const CODE_RESERVED_KEY: u32 = 2;
pub const CODE_NOT_FOUND: u32 = 3;
pub const CODE_INTERNAL: u32 = 4;

/// Query path resolving a single key.
pub const STORE_QUERY_PATH: &str = "/store";

/// Cheaply cloneable handle to the key-value application.
#[derive(Clone)]
pub struct KvStoreApp {
    inner: Arc<KvState>,
}

struct KvState {
    store: SharedStore,
    pending: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    height: AtomicU64,
    halt: HaltPolicy,
    options: AppOptions,
    span: tracing::Span,
}

impl KvStoreApp {
    pub fn new(env: AppEnv) -> Result<Self, StoreError> {
        let store = TracedStore::wrap(env.store, env.trace_writer);
        let height = match store.get(HEIGHT_KEY)? {
            Some(raw) => decode_height(&raw),
            None => 0,
        };
        let halt = env.options.halt_policy();
        Ok(Self {
            inner: Arc::new(KvState {
                store,
                pending: Mutex::new(Vec::new()),
                height: AtomicU64::new(height),
                halt,
                options: env.options,
                span: env.span,
            }),
        })
    }

    /// Factory usable as an `AppCreator`.
    pub fn create(env: AppEnv) -> Result<Arc<dyn Application>, AppError> {
        Ok(Arc::new(Self::new(env)?))
    }

    pub fn options(&self) -> &AppOptions {
        &self.inner.options
    }

    pub fn height(&self) -> u64 {
        self.inner.height.load(Ordering::SeqCst)
    }

    /// Committed value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if key.first() == Some(&META_PREFIX) {
            return Ok(None);
        }
        self.inner.store.get(key)
    }

    fn app_hash(&self) -> Vec<u8> {
        let keys = self.inner.store.len();
        // The height record is always present once anything has been committed.
        let user_keys = if self.height() > 0 { keys.saturating_sub(1) } else { keys };
        (user_keys as u64).to_be_bytes().to_vec()
    }
}

/// Split a transaction into key and value, checking reserved keys.
fn parse_tx(tx: &[u8]) -> Result<(Vec<u8>, Vec<u8>), (u32, String)> {
    if tx.is_empty() {
        return Err((CODE_MALFORMED, "empty transaction".into()));
    }
    let (key, value) = match tx.iter().position(|b| *b == b'=') {
        Some(idx) => (&tx[..idx], &tx[idx + 1..]),
        None => (tx, tx),
    };
    if key.is_empty() {
        return Err((CODE_MALFORMED, "transaction has an empty key".into()));
    }
    if key[0] == META_PREFIX {
        return Err((CODE_RESERVED_KEY, "keys starting with '_' are reserved".into()));
    }
    Ok((key.to_vec(), value.to_vec()))
}

fn decode_height(raw: &[u8]) -> u64 {
    raw.try_into().map(u64::from_be_bytes).unwrap_or(0)
}

impl Application for KvStoreApp {
    fn info(&self, _req: RequestInfo) -> ResponseInfo {
        let height = self.height();
        ResponseInfo {
            data: "kvstore".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            last_block_height: height,
            last_block_app_hash: if height > 0 { self.app_hash() } else { Vec::new() },
        }
    }

    fn init_chain(&self, req: RequestInitChain) -> ResponseInitChain {
        let _enter = self.inner.span.enter();
        if let Some(entries) = req.app_state.as_object() {
            for (key, value) in entries {
                let value = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
                self.inner.pending.lock().push((key.clone().into_bytes(), value.into_bytes()));
            }
        }
        tracing::info!(chain_id = %req.chain_id, initial_height = req.initial_height, "Initialising chain");
        ResponseInitChain::default()
    }

    fn check_tx(&self, req: RequestCheckTx) -> ResponseCheckTx {
        match parse_tx(&req.tx) {
            Ok(_) => ResponseCheckTx {
                code: CODE_OK,
                log: String::new(),
                gas_wanted: 1,
            },
            Err((code, log)) => ResponseCheckTx {
                code,
                log,
                gas_wanted: 0,
            },
        }
    }

    fn deliver_tx(&self, req: RequestDeliverTx) -> ResponseDeliverTx {
        match parse_tx(&req.tx) {
            Ok(write) => {
                self.inner.pending.lock().push(write);
                ResponseDeliverTx::default()
            }
            Err((code, log)) => ResponseDeliverTx { code, log },
        }
    }

    fn commit(&self, req: RequestCommit) -> ResponseCommit {
        let _enter = self.inner.span.enter();

        if self.inner.halt.check(req.height, req.time).is_some() {
            self.inner.pending.lock().clear();
            return ResponseCommit {
                data: self.app_hash(),
                retain_height: 0,
            };
        }

        let writes = std::mem::take(&mut *self.inner.pending.lock());
        let persisted = writes
            .iter()
            .try_for_each(|(key, value)| self.inner.store.set(key, value))
            .and_then(|()| self.inner.store.set(HEIGHT_KEY, &req.height.to_be_bytes()))
            .and_then(|()| self.inner.store.flush());
        if let Err(e) = persisted {
            tracing::error!(height = req.height, error = %e, "Failed to persist block");
            // Writes delivered since stay queued behind the ones being retried.
            let mut pending = self.inner.pending.lock();
            let later = std::mem::replace(&mut *pending, writes);
            pending.extend(later);
            return ResponseCommit {
                data: self.app_hash(),
                retain_height: 0,
            };
        }

        self.inner.height.store(req.height, Ordering::SeqCst);
        let app_hash = self.app_hash();
        tracing::debug!(height = req.height, writes = writes.len(), app_hash = %hex::encode(&app_hash), "Committed block");
        ResponseCommit {
            data: app_hash,
            retain_height: self.inner.options.retain_height(req.height),
        }
    }

    fn query(&self, req: RequestQuery) -> ResponseQuery {
        let height = self.height();
        if req.path != STORE_QUERY_PATH {
            return ResponseQuery {
                code: CODE_MALFORMED,
                log: format!("unknown query path {}", req.path),
                height,
                ..ResponseQuery::default()
            };
        }
        match self.get(&req.data) {
            Ok(Some(value)) => ResponseQuery {
                code: CODE_OK,
                log: "exists".into(),
                key: req.data,
                value,
                height,
            },
            Ok(None) => ResponseQuery {
                code: CODE_NOT_FOUND,
                log: "does not exist".into(),
                key: req.data,
                value: Vec::new(),
                height,
            },
            Err(e) => ResponseQuery {
                code: CODE_INTERNAL,
                log: e.to_string(),
                key: req.data,
                value: Vec::new(),
                height,
            },
        }
    }

    fn register_api_routes(&self, router: Router, _config: &ApiConfig) -> Router {
        let routes = Router::new()
            .route("/kv/{key}", get(get_key))
            .with_state(self.clone());
        router.merge(routes)
    }

    fn register_grpc_services(&self, registry: &GrpcRegistry) {
        let app = self.clone();
        registry.register("/kvstore.v1.Query/Get", move |req: serde_json::Value| {
            let app = app.clone();
            async move {
                let req: GetRequest = serde_json::from_value(req)
                    .map_err(|e| GrpcStatus::invalid_argument(e.to_string()))?;
                match app.get(req.key.as_bytes()) {
                    Ok(Some(value)) => Ok(serde_json::json!({
                        "key": req.key,
                        "value": String::from_utf8_lossy(&value),
                        "height": app.height(),
                    })),
                    Ok(None) => Err(GrpcStatus::not_found(format!("key {} not found", req.key))),
                    Err(e) => Err(GrpcStatus::internal(e.to_string())),
                }
            }
        });
    }
}

#[derive(Deserialize)]
struct GetRequest {
    key: String,
}

#[derive(Serialize)]
struct KeyValue {
    key: String,
    value: String,
    height: u64,
}

async fn get_key(
    State(app): State<KvStoreApp>,
    Path(key): Path<String>,
) -> Result<Json<KeyValue>, (StatusCode, String)> {
    match app.get(key.as_bytes()) {
        Ok(Some(value)) => Ok(Json(KeyValue {
            value: String::from_utf8_lossy(&value).into_owned(),
            height: app.height(),
            key,
        })),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("key {key} not found"))),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemDb};

    fn app_with(options: AppOptions) -> KvStoreApp {
        KvStoreApp::new(AppEnv {
            span: tracing::Span::none(),
            store: Arc::new(MemDb::new()),
            trace_writer: None,
            options,
        })
        .unwrap()
    }

    fn deliver(app: &KvStoreApp, tx: &[u8]) -> ResponseDeliverTx {
        app.deliver_tx(RequestDeliverTx { tx: tx.to_vec() })
    }

    #[test]
    fn check_tx_rejects_malformed() {
        let app = app_with(AppOptions::default());
        assert_eq!(app.check_tx(RequestCheckTx { tx: vec![] }).code, CODE_MALFORMED);
        assert_eq!(app.check_tx(RequestCheckTx { tx: b"=v".to_vec() }).code, CODE_MALFORMED);
        assert_eq!(app.check_tx(RequestCheckTx { tx: b"_height=1".to_vec() }).code, CODE_RESERVED_KEY);
        assert_eq!(app.check_tx(RequestCheckTx { tx: b"a=1".to_vec() }).code, CODE_OK);
    }

    #[test]
    fn commit_persists_and_hashes_key_count() {
        let app = app_with(AppOptions::default());
        deliver(&app, b"a=1");
        deliver(&app, b"b");
        assert_eq!(app.get(b"a").unwrap(), None);

        let res = app.commit(RequestCommit { height: 1, time: 0 });
        assert_eq!(res.data, 2u64.to_be_bytes().to_vec());
        assert_eq!(app.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(app.get(b"b").unwrap(), Some(b"b".to_vec()));
        assert_eq!(app.info(RequestInfo::default()).last_block_height, 1);
    }

    #[test]
    fn query_store_path() {
        let app = app_with(AppOptions::default());
        deliver(&app, b"name=node");
        app.commit(RequestCommit { height: 1, time: 0 });

        let found = app.query(RequestQuery {
            path: STORE_QUERY_PATH.into(),
            data: b"name".to_vec(),
            height: 0,
        });
        assert_eq!(found.value, b"node".to_vec());

        let missing = app.query(RequestQuery {
            path: STORE_QUERY_PATH.into(),
            data: b"other".to_vec(),
            height: 0,
        });
        assert_eq!(missing.code, CODE_NOT_FOUND);
    }

    #[test]
    fn halt_height_refuses_commit() {
        let app = app_with(AppOptions {
            halt_height: 2,
            ..AppOptions::default()
        });
        deliver(&app, b"a=1");
        app.commit(RequestCommit { height: 1, time: 0 });
        deliver(&app, b"b=2");
        app.commit(RequestCommit { height: 2, time: 0 });

        assert_eq!(app.height(), 1);
        assert_eq!(app.get(b"b").unwrap(), None);
    }

    #[test]
    fn retain_height_follows_min_retain_blocks() {
        let app = app_with(AppOptions {
            min_retain_blocks: 5,
            ..AppOptions::default()
        });
        assert_eq!(app.commit(RequestCommit { height: 3, time: 0 }).retain_height, 0);
        assert_eq!(app.commit(RequestCommit { height: 10, time: 0 }).retain_height, 5);
    }

    #[test]
    fn height_survives_reopen() {
        let store: SharedStore = Arc::new(MemDb::new());
        let env = |store: SharedStore| AppEnv {
            span: tracing::Span::none(),
            store,
            trace_writer: None,
            options: AppOptions::default(),
        };
        let app = KvStoreApp::new(env(store.clone())).unwrap();
        deliver(&app, b"a=1");
        app.commit(RequestCommit { height: 7, time: 0 });

        let reopened = KvStoreApp::new(env(store)).unwrap();
        assert_eq!(reopened.height(), 7);
        assert_eq!(reopened.info(RequestInfo::default()).last_block_app_hash, 1u64.to_be_bytes().to_vec());
    }

    /// Store whose height write fails while `broken` is set.
    struct FlakyStore {
        inner: MemDb,
        broken: std::sync::atomic::AtomicBool,
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            if key == HEIGHT_KEY && self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Io {
                    path: "flaky".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
            self.inner.delete(key)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn flush(&self) -> Result<(), StoreError> {
            self.inner.flush()
        }
    }

    #[test]
    fn failed_commit_keeps_writes_for_the_retry() {
        let store = Arc::new(FlakyStore {
            inner: MemDb::new(),
            broken: std::sync::atomic::AtomicBool::new(true),
        });
        let app = KvStoreApp::new(AppEnv {
            span: tracing::Span::none(),
            store: store.clone(),
            trace_writer: None,
            options: AppOptions::default(),
        })
        .unwrap();

        deliver(&app, b"a=1");
        app.commit(RequestCommit { height: 1, time: 0 });
        assert_eq!(app.height(), 0);

        deliver(&app, b"b=2");
        store.broken.store(false, Ordering::SeqCst);
        app.commit(RequestCommit { height: 1, time: 0 });

        assert_eq!(app.height(), 1);
        assert_eq!(app.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(app.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert!(app.inner.pending.lock().is_empty());
    }
}
