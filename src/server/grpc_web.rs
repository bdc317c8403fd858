//! gRPC-Web proxy: the gRPC server's router, served on its own address for browsers.

use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::config::GrpcWebConfig;
use crate::server::grpc::GRPC_JSON;

pub const GRPC_WEB_JSON: &str = "application/grpc-web+json";

/// Wrap the gRPC router with content-type translation and optional permissive CORS.
pub fn grpc_web_router(grpc: Router, config: &GrpcWebConfig) -> Router {
    let router = grpc.layer(middleware::from_fn(translate_grpc_web));
    if config.enable_unsafe_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn translate_grpc_web(mut req: Request, next: Next) -> Response {
    let is_web = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/grpc-web"));
    if is_web {
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_JSON));
    }

    let mut res = next.run(req).await;
    if is_web {
        res.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(GRPC_WEB_JSON));
    }
    res
}
