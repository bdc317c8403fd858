//! gRPC network client (JSON messages over HTTP/2).

use std::fmt;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;

use crate::server::grpc::{GRPC_JSON, GRPC_MESSAGE, GRPC_STATUS};
use crate::server::registry::{GrpcCode, GrpcResult, GrpcStatus};

/// Client for a gRPC endpoint served by this crate.
#[derive(Clone)]
pub struct GrpcClient {
    target: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl GrpcClient {
    /// Client for `host:port`. Connections are established lazily.
    pub fn new(target: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build_http();
        Self {
            target: target.into(),
            client,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Call `method` (full path, e.g. `/pkg.Service/Method`).
    pub async fn call(&self, method: &str, request: &Value) -> GrpcResult {
        let body = serde_json::to_vec(request).map_err(|e| GrpcStatus::internal(e.to_string()))?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}{}", self.target, method))
            .header(CONTENT_TYPE, GRPC_JSON)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| GrpcStatus::invalid_argument(e.to_string()))?;

        let res = self
            .client
            .request(req)
            .await
            .map_err(|e| GrpcStatus::unavailable(format!("{}: {e}", self.target)))?;

        let header = |name: &str| {
            res.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        let code = match header(GRPC_STATUS).and_then(|v| v.parse::<u8>().ok()) {
            Some(code) => GrpcCode::from_u8(code),
            None if res.status().is_success() => GrpcCode::Ok,
            None => GrpcCode::Internal,
        };
        let message = header(GRPC_MESSAGE).unwrap_or_default();

        let body = res
            .into_body()
            .collect()
            .await
            .map_err(|e| GrpcStatus::unavailable(e.to_string()))?
            .to_bytes();

        if code != GrpcCode::Ok {
            return Err(GrpcStatus::new(code, message));
        }
        serde_json::from_slice(&body).map_err(|e| GrpcStatus::internal(format!("malformed response: {e}")))
    }
}

impl fmt::Debug for GrpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcClient").field("target", &self.target).finish()
    }
}
