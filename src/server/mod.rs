use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ProxyError;
use crate::leaderboard::FetchCoordinator;
use crate::submission::{RequestMeta, SubmissionService, SubmitRequest};

#[derive(Clone)]
pub struct AppState {
    pub leaderboard: FetchCoordinator,
    pub submissions: Arc<SubmissionService>,
}

/// Build the public API router.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route(
            "/api/list",
            get(list_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/submit",
            axum::routing::post(submit_handler).fallback(method_not_allowed),
        )
        .route("/healthz", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

/// CORS policy for browser clients. `"*"` allows any origin.
pub fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(origin.parse::<HeaderValue>()?)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

/// GET /api/list
async fn list_handler(State(state): State<AppState>) -> Response {
    match state.leaderboard.read().await {
        Ok(outcome) => (
            [("x-cache", outcome.freshness.as_str())],
            Json(&*outcome.snapshot),
        )
            .into_response(),
        // Soft failure: the board renders empty instead of erroring
        Err(e @ ProxyError::Misconfigured(_)) => (
            StatusCode::OK,
            Json(json!({ "error": e.kind(), "entries": [] })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": e.kind(), "detail": e.to_string(), "entries": [] })),
        )
            .into_response(),
    }
}

/// POST /api/submit
async fn submit_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let meta = RequestMeta {
        forwarded_for: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr.ip()),
    };
    let request = SubmitRequest::from_body(&body);

    match state.submissions.submit(&meta, &request).await {
        Ok(name) => Json(json!({ "ok": true, "name": name })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "method_not_allowed" })),
    )
}
