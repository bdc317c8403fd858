//! Standalone ABCI listener: serves the application to an external consensus engine.
//!
//! # Transports
//! - `socket`: one JSON `Request` per line in, one JSON `Response` per line out
//! - `grpc`: `POST /tendermint.abci.ABCIApplication/<Method>` with JSON bodies
//!
//! `start` binds and returns; connections are served on background tasks
//! until `stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::abci::types::*;
use crate::abci::{dispatch, Transport};
use crate::app::Application;
use crate::lifecycle::{Shutdown, ShutdownListener};
use crate::net::{AcceptedStream, BoundListener, ConnectionGuard, ConnectionTracker, ListenAddr};
use crate::server::grpc::grpc_router;
use crate::server::registry::{GrpcRegistry, GrpcStatus};
use crate::server::serve::serve_until;
use crate::subsystem::{Subsystem, SubsystemError};

const NAME: &str = "abci-server";
const ABCI_SERVICE: &str = "/tendermint.abci.ABCIApplication";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest request line the socket transport will buffer.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// ABCI listener subsystem.
pub struct AbciListener {
    address: ListenAddr,
    transport: Transport,
    app: Arc<dyn Application>,
    shutdown: Shutdown,
    connections: ConnectionTracker,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AbciListener {
    pub fn new(address: ListenAddr, transport: Transport, app: Arc<dyn Application>) -> Self {
        Self {
            address,
            transport,
            app,
            shutdown: Shutdown::new(),
            connections: ConnectionTracker::new(),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Open socket connections.
    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }
}

#[async_trait]
impl Subsystem for AbciListener {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SubsystemError::already_started(NAME));
        }
        let listener = self
            .address
            .bind()
            .await
            .map_err(|e| SubsystemError::listen(NAME, e))?;
        tracing::info!(
            module = NAME,
            address = %listener.local_addr(),
            transport = %self.transport,
            "Starting ABCI listener"
        );

        let app = self.app.clone();
        let shutdown = self.shutdown.subscribe();
        let task = match self.transport {
            Transport::Socket => {
                let connections = self.connections.clone();
                tokio::spawn(accept_loop(listener, app, shutdown, connections))
            }
            Transport::Grpc => {
                let router = grpc_router(abci_registry(&app));
                let mut shutdown = shutdown;
                tokio::spawn(async move {
                    if let Err(e) = serve_until(listener, router, async move { shutdown.recv().await }).await {
                        tracing::error!(module = NAME, error = %e, "ABCI gRPC server failed");
                    }
                })
            }
        };
        *self.task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.shutdown.trigger();
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SubsystemError::failed(NAME, format!("listener task failed: {e}"))),
            Err(_) => return Err(SubsystemError::failed(NAME, "listener did not stop in time")),
        }
        if !self.connections.wait_for_idle(DRAIN_TIMEOUT).await {
            return Err(SubsystemError::failed(NAME, "connections did not drain in time"));
        }
        tracing::info!(module = NAME, "ABCI listener stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: BoundListener,
    app: Arc<dyn Application>,
    mut shutdown: ShutdownListener,
    connections: ConnectionTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let guard = connections.track();
                tracing::debug!(module = NAME, connection_id = %guard.id(), peer = %peer, "Accepted connection");
                tokio::spawn(serve_connection(stream, app.clone(), shutdown.clone(), guard));
            }
            Err(e) => {
                tracing::warn!(module = NAME, error = %e, "Failed to accept connection");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn serve_connection(
    stream: Box<dyn AcceptedStream>,
    app: Arc<dyn Application>,
    mut shutdown: ShutdownListener,
    guard: ConnectionGuard,
) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_REQUEST_BYTES));
    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next() => line,
        };
        let response = match line {
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => match serde_json::from_str::<Request>(&line) {
                Ok(request) => dispatch(app.as_ref(), request),
                Err(e) => Response::Exception {
                    error: format!("malformed request: {e}"),
                },
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(
                    module = NAME,
                    connection_id = %guard.id(),
                    limit = MAX_REQUEST_BYTES,
                    "Request line too long, closing connection"
                );
                let exception = Response::Exception {
                    error: format!("request exceeds {MAX_REQUEST_BYTES} bytes"),
                };
                let _ = write_response(&mut writer, &exception).await;
                break;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::warn!(module = NAME, connection_id = %guard.id(), error = %e, "Read failed");
                break;
            }
            None => break,
        };
        if let Err(e) = write_response(&mut writer, &response).await {
            tracing::warn!(module = NAME, connection_id = %guard.id(), error = %e, "Write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_response(
    writer: &mut WriteHalf<Box<dyn AcceptedStream>>,
    response: &Response,
) -> std::io::Result<()> {
    let mut out = serde_json::to_vec(response)?;
    out.push(b'\n');
    writer.write_all(&out).await
}

fn register_method<Req, Res>(
    registry: &GrpcRegistry,
    app: &Arc<dyn Application>,
    method: &str,
    call: fn(&dyn Application, Req) -> Res,
) where
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + 'static,
{
    let app = app.clone();
    registry.register(format!("{ABCI_SERVICE}/{method}"), move |req: Value| {
        let app = app.clone();
        async move {
            let req: Req = serde_json::from_value(req).map_err(|e| GrpcStatus::invalid_argument(e.to_string()))?;
            serde_json::to_value(call(app.as_ref(), req)).map_err(|e| GrpcStatus::internal(e.to_string()))
        }
    });
}

/// gRPC methods exposing `app` over ABCI.
pub fn abci_registry(app: &Arc<dyn Application>) -> GrpcRegistry {
    let registry = GrpcRegistry::new();
    registry.register(format!("{ABCI_SERVICE}/Echo"), |req: Value| async move {
        Ok(json!({ "message": req.get("message").cloned().unwrap_or(Value::Null) }))
    });
    registry.register(format!("{ABCI_SERVICE}/Flush"), |_| async { Ok(json!({})) });
    register_method(&registry, app, "Info", |app, req: RequestInfo| app.info(req));
    register_method(&registry, app, "InitChain", |app, req: RequestInitChain| app.init_chain(req));
    register_method(&registry, app, "CheckTx", |app, req: RequestCheckTx| app.check_tx(req));
    register_method(&registry, app, "DeliverTx", |app, req: RequestDeliverTx| app.deliver_tx(req));
    register_method(&registry, app, "Commit", |app, req: RequestCommit| app.commit(req));
    register_method(&registry, app, "Query", |app, req: RequestQuery| app.query(req));
    registry
}
