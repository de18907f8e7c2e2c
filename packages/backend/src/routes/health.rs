use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;
use crate::time::{format_timestamp_ms_iso_millis, now_ms};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    llm: &'static str,
    version: &'static str,
    uptime: u64,
    timestamp: Option<String>,
}

#[derive(Serialize)]
struct ProbeResponse {
    status: &'static str,
    timestamp: Option<String>,
}

async fn root(State(state): State<AppState>) -> Response {
    let db_ok = crate::db::ping(state.pool()).await;
    let response = HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        database: if db_ok { "connected" } else { "disconnected" },
        llm: if state.llm().is_available() {
            "available"
        } else {
            "unavailable"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime_seconds(),
        timestamp: format_timestamp_ms_iso_millis(now_ms()),
    };

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response)).into_response()
}

async fn live() -> Response {
    Json(ProbeResponse {
        status: "alive",
        timestamp: format_timestamp_ms_iso_millis(now_ms()),
    })
    .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let ready = crate::db::ping(state.pool()).await;
    let body = ProbeResponse {
        status: if ready { "ready" } else { "not_ready" },
        timestamp: format_timestamp_ms_iso_millis(now_ms()),
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
