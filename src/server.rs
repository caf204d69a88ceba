//! ==============================================================================
//! server.rs - http surface
//! ==============================================================================
//!
//! purpose:
//!     serves the read-only query surface to the dashboard, a push endpoint
//!     for sensor nodes that cannot hold a websocket, and the usual
//!     health / status / prometheus endpoints.
//!
//! routes:
//!     GET  /                      endpoint index
//!     GET  /health                liveness probe
//!     GET  /status                version, uptime, sensor and queue counts
//!     GET  /metrics               prometheus text format
//!     GET  /api/sensors?q=        live sensors with history (q: key filter)
//!     GET  /api/sensors/:key      one sensor, 404 + null when absent
//!     GET  /api/summaries?q=      compact grid cards
//!     GET  /api/alerts            sensors currently out of range
//!     POST /api/readings          raw reading json, queued for ingest
//!
//! ==============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::ingest::{IngestQueue, PushOutcome};
use crate::metrics::encode_metrics;
use crate::parser::{parse_message, Inbound};
use crate::query::{QuerySurface, SensorSummary};
use crate::registry::SensorSnapshot;

/// shared state handed to every handler
pub struct AppState {
    pub query: QuerySurface,
    pub queue: Arc<IngestQueue>,
    pub started: Instant,
}

impl AppState {
    pub fn new(query: QuerySurface, queue: Arc<IngestQueue>) -> Self {
        Self {
            query,
            queue,
            started: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/sensors", get(list_handler))
        .route("/api/sensors/:key", get(sensor_handler))
        .route("/api/summaries", get(summaries_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/readings", post(push_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// serve until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>coldchain-hub</title></head>
<body style="font-family: system-ui; max-width: 800px; margin: 50px auto;">
    <h1>coldchain-hub</h1>
    <p>Live cold-chain telemetry aggregator.</p>
    <ul>
        <li><a href="/api/sensors">/api/sensors</a> - live sensors with history</li>
        <li><a href="/api/summaries">/api/summaries</a> - sensor cards</li>
        <li><a href="/api/alerts">/api/alerts</a> - sensors out of range</li>
        <li><a href="/status">/status</a> - status (JSON)</li>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
    </ul>
</body>
</html>"#,
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    version: &'static str,
    uptime_secs: u64,
    active_sensors: usize,
    queued_payloads: usize,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        active_sensors: state.query.active_count().await,
        queued_payloads: state.queue.len(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

#[derive(Deserialize)]
struct FilterParams {
    q: Option<String>,
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Json<Vec<SensorSnapshot>> {
    let sensors = match params.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => state.query.list_matching(q).await,
        _ => state.query.list().await,
    };
    Json(sensors)
}

async fn sensor_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Option<SensorSnapshot>>) {
    match state.query.get(&key).await {
        Some(sensor) => (StatusCode::OK, Json(Some(sensor))),
        None => (StatusCode::NOT_FOUND, Json(None)),
    }
}

async fn summaries_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Json<Vec<SensorSummary>> {
    Json(state.query.summaries(params.q.as_deref()).await)
}

async fn alerts_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SensorSnapshot>> {
    Json(state.query.alerting().await)
}

/// validate up front so the node gets a 400, then queue the raw body
async fn push_handler(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    match parse_message(&body) {
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"status": "error", "message": e.to_string()})),
        ),
        Ok(Inbound::Control) => (StatusCode::OK, Json(serde_json::json!({"status": "ignored"}))),
        Ok(Inbound::Reading(_)) => match state.queue.push(body) {
            PushOutcome::Enqueued | PushOutcome::DroppedOldest => (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({"status": "queued"})),
            ),
            PushOutcome::DroppedNewest | PushOutcome::Closed => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "error", "message": "ingest queue unavailable"})),
            ),
        },
    }
}
