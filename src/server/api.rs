//! REST/JSON API server.
//!
//! # Routes
//! - `GET  /node_info`         node status through the local client
//! - `GET  /blocks/latest`     latest produced block
//! - `GET  /blocks/{height}`   block by height, while retained
//! - `POST /txs`               broadcast `{"tx": "..."}`
//! - `POST /grpc/{*method}`    gateway to the gRPC server, when configured
//! - `GET  /metrics`           Prometheus text, when telemetry is enabled
//! - application routes

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::app::Application;
use crate::config::ApiConfig;
use crate::node::ClientError;
use crate::server::context::ClientContext;
use crate::server::registry::{GrpcCode, GrpcStatus};
use crate::server::services::{block_json, node_info_json, BroadcastRequest};

#[derive(Clone)]
struct ApiState {
    ctx: ClientContext,
    metrics: Option<PrometheusHandle>,
}

/// Build the API router, including the application's own routes.
pub fn api_router(
    ctx: ClientContext,
    app: &Arc<dyn Application>,
    config: &ApiConfig,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let telemetry = metrics.is_some();
    let mut router = Router::new()
        .route("/node_info", get(node_info))
        .route("/blocks/latest", get(latest_block))
        .route("/blocks/{height}", get(block_by_height))
        .route("/txs", post(broadcast_tx))
        .route("/grpc/{*method}", post(grpc_gateway));
    if telemetry {
        router = router.route("/metrics", get(render_metrics));
    }
    let router = router.with_state(ApiState { ctx, metrics });
    let mut router = app.register_api_routes(router, config);

    if config.enabled_unsafe_cors {
        router = router.layer(CorsLayer::permissive());
    }
    if config.max_open_connections > 0 {
        router = router.layer(GlobalConcurrencyLimitLayer::new(config.max_open_connections));
    }
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn no_client() -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "no node client configured")
}

fn grpc_http_status(code: GrpcCode) -> StatusCode {
    match code {
        GrpcCode::Ok => StatusCode::OK,
        GrpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
        GrpcCode::NotFound => StatusCode::NOT_FOUND,
        GrpcCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        GrpcCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        GrpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        GrpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn grpc_error(status: GrpcStatus) -> ApiError {
    (
        grpc_http_status(status.code),
        Json(json!({ "code": status.code.as_u8(), "message": status.message })),
    )
}

async fn node_info(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let client = state.ctx.client().ok_or_else(no_client)?;
    Ok(Json(node_info_json(&client.status())))
}

async fn latest_block(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let client = state.ctx.client().ok_or_else(no_client)?;
    let earliest = client.status().earliest_block_height;
    client
        .latest_block()
        .map(|block| Json(block_json(&block, earliest)))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no block produced yet"))
}

async fn block_by_height(
    State(state): State<ApiState>,
    Path(height): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    let client = state.ctx.client().ok_or_else(no_client)?;
    let earliest = client.status().earliest_block_height;
    client
        .block(height)
        .map(|block| Json(block_json(&block, earliest)))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("block {height} not available")))
}

async fn broadcast_tx(
    State(state): State<ApiState>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<Value>, ApiError> {
    let client = state.ctx.client().ok_or_else(no_client)?;
    client
        .broadcast_tx(req.tx.into_bytes())
        .map(|result| Json(json!({ "tx_response": result })))
        .map_err(|e: ClientError| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

async fn grpc_gateway(
    State(state): State<ApiState>,
    Path(method): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let client = state
        .ctx
        .grpc_client()
        .ok_or_else(|| api_error(StatusCode::NOT_IMPLEMENTED, "gRPC gateway is disabled"))?;
    let request = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("malformed request: {e}")))?
    };
    client
        .call(&format!("/{method}"), &request)
        .await
        .map(Json)
        .map_err(grpc_error)
}

async fn render_metrics(State(state): State<ApiState>) -> Response {
    match state.metrics {
        Some(handle) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
