//! Blocking HTTP service wrapper shared by every network server.
//!
//! `start` binds and serves until `stop` is called, so the supervisor races it
//! against the startup window. `stop` waits for in-flight requests to drain.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;

use crate::lifecycle::Shutdown;
use crate::net::{BoundListener, ListenAddr};
use crate::subsystem::{Subsystem, SubsystemError};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// An axum router bound to one listen address.
pub struct HttpService {
    name: &'static str,
    address: ListenAddr,
    router: Mutex<Option<Router>>,
    shutdown: Shutdown,
    stopped: Shutdown,
    serving: AtomicBool,
}

impl HttpService {
    pub fn new(name: &'static str, address: ListenAddr, router: Router) -> Self {
        Self {
            name,
            address,
            router: Mutex::new(Some(router)),
            shutdown: Shutdown::new(),
            stopped: Shutdown::new(),
            serving: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &ListenAddr {
        &self.address
    }
}

pub(crate) async fn serve_until<S>(listener: BoundListener, router: Router, signal: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    match listener {
        BoundListener::Tcp(l) => axum::serve(l, router).with_graceful_shutdown(signal).await,
        #[cfg(unix)]
        BoundListener::Unix(l) => axum::serve(l, router).with_graceful_shutdown(signal).await,
    }
}

#[async_trait]
impl Subsystem for HttpService {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) -> Result<(), SubsystemError> {
        let router = self
            .router
            .lock()
            .take()
            .ok_or_else(|| SubsystemError::already_started(self.name))?;

        let listener = self
            .address
            .bind()
            .await
            .map_err(|e| SubsystemError::listen(self.name, e))?;
        self.serving.store(true, Ordering::SeqCst);
        tracing::info!(module = self.name, address = %listener.local_addr(), "Starting server");

        let mut shutdown = self.shutdown.subscribe();
        let result = serve_until(listener, router, async move { shutdown.recv().await }).await;
        self.stopped.trigger();

        match result {
            Ok(()) => {
                tracing::info!(module = self.name, "Server stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(module = self.name, error = %e, "Server failed");
                Err(SubsystemError::io(self.name, e))
            }
        }
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.shutdown.trigger();
        if !self.serving.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut stopped = self.stopped.subscribe();
        tokio::time::timeout(DRAIN_TIMEOUT, stopped.recv())
            .await
            .map_err(|_| SubsystemError::failed(self.name, "connections did not drain in time"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::Arc;

    fn free_addr() -> ListenAddr {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        format!("tcp://127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn serves_until_stopped() {
        let addr = free_addr();
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let service = Arc::new(HttpService::new("test-server", addr.clone(), router));

        let running = service.clone();
        let handle = tokio::spawn(async move { running.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let body = reqwest::get(format!("http://{}/ping", addr.loopback().unwrap()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        service.stop().await.unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn bind_conflict_fails_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let addr: ListenAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let service = HttpService::new("test-server", addr, Router::new());

        assert!(matches!(service.start().await, Err(SubsystemError::Listen { .. })));
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let service = HttpService::new("test-server", free_addr(), Router::new());
        service.stop().await.unwrap();
        // Stopped before starting: serves nothing and returns at once.
        assert!(service.start().await.is_ok());
        assert!(matches!(service.start().await, Err(SubsystemError::AlreadyStarted { .. })));
    }
}
