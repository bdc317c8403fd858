//! gRPC server: serves a `GrpcRegistry` over HTTP/2 (or HTTP/1.1) with a JSON codec.
//!
//! Every call is `POST /<package.Service>/<Method>` with a JSON body. The status
//! is carried in `grpc-status` / `grpc-message` response headers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::server::registry::{GrpcCode, GrpcRegistry, GrpcStatus};

pub const GRPC_JSON: &str = "application/grpc+json";
pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Router answering every method in `registry`. Methods registered later are visible too.
pub fn grpc_router(registry: GrpcRegistry) -> Router {
    Router::new()
        .route("/{*method}", post(handle_call))
        .with_state(registry)
        .layer(TraceLayer::new_for_grpc())
}

fn accepts_content_type(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        // Plain clients (curl) often omit the header.
        None => true,
        Some(ct) => ct.starts_with("application/grpc") || ct.starts_with("application/json"),
    }
}

async fn handle_call(
    State(registry): State<GrpcRegistry>,
    Path(method): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !accepts_content_type(&headers) {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let path = format!("/{method}");
    let request = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                return status_response(&GrpcStatus::invalid_argument(format!("malformed request: {e}")))
            }
        }
    };

    tracing::debug!(method = %path, "gRPC call");
    match registry.call(&path, request).await {
        Ok(reply) => {
            let mut response = axum::Json(reply).into_response();
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_JSON));
            headers.insert(GRPC_STATUS, HeaderValue::from_static("0"));
            response
        }
        Err(status) => {
            tracing::debug!(method = %path, code = status.code.as_u8(), message = %status.message, "gRPC call failed");
            status_response(&status)
        }
    }
}

/// Trailers-only response for a failed call.
pub fn status_response(status: &GrpcStatus) -> Response {
    debug_assert_ne!(status.code, GrpcCode::Ok);
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_JSON));
    headers.insert(GRPC_STATUS, HeaderValue::from(status.code.as_u8() as u16));
    if let Ok(message) = HeaderValue::from_str(&status.message) {
        headers.insert(GRPC_MESSAGE, message);
    }
    response
}
