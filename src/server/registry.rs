//! gRPC method registry shared by the application, the gRPC server and the ABCI listener.
//!
//! Methods are addressed by their full path (`/package.Service/Method`) and
//! exchange JSON messages.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;

/// Status codes used on the wire (`grpc-status` header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GrpcCode {
    Ok = 0,
    InvalidArgument = 3,
    NotFound = 5,
    FailedPrecondition = 9,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
}

impl GrpcCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Map a wire code back, folding unknown values into `Internal`.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            3 => Self::InvalidArgument,
            5 => Self::NotFound,
            9 => Self::FailedPrecondition,
            12 => Self::Unimplemented,
            14 => Self::Unavailable,
            _ => Self::Internal,
        }
    }
}

/// A non-OK call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcStatus {
    pub code: GrpcCode,
    pub message: String,
}

impl GrpcStatus {
    pub fn new(code: GrpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::NotFound, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::FailedPrecondition, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(GrpcCode::Unavailable, message)
    }
}

impl fmt::Display for GrpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grpc status {}: {}", self.code.as_u8(), self.message)
    }
}

impl std::error::Error for GrpcStatus {}

pub type GrpcResult = Result<Value, GrpcStatus>;

/// A registered method handler.
pub type GrpcMethod = Arc<dyn Fn(Value) -> BoxFuture<'static, GrpcResult> + Send + Sync>;

/// Shared map of method path to handler. Clones see the same methods.
#[derive(Clone, Default)]
pub struct GrpcRegistry {
    methods: Arc<RwLock<BTreeMap<String, GrpcMethod>>>,
}

impl GrpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `path`, replacing any previous handler.
    pub fn register<F, Fut>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = GrpcResult> + Send + 'static,
    {
        let path = path.into();
        tracing::debug!(method = %path, "Registered gRPC method");
        let method: GrpcMethod = Arc::new(move |req| handler(req).boxed());
        if self.methods.write().insert(path.clone(), method).is_some() {
            tracing::warn!(method = %path, "Replaced gRPC method");
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.methods.read().contains_key(path)
    }

    /// Registered paths, sorted.
    pub fn methods(&self) -> Vec<String> {
        self.methods.read().keys().cloned().collect()
    }

    /// Invoke `path` with `request`.
    pub async fn call(&self, path: &str, request: Value) -> GrpcResult {
        let method = self.methods.read().get(path).cloned();
        match method {
            Some(method) => method(request).await,
            None => Err(GrpcStatus::unimplemented(format!("unknown method {path}"))),
        }
    }
}

impl fmt::Debug for GrpcRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
