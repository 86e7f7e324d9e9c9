//! HTTP API for health checks, Prometheus metrics and pulling session data

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    AggregatedRecord, ComponentStatus, HistoryPoint, RecordLogStats, SeriesKey, SessionView,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Records returned by `/records` when no limit is given
const DEFAULT_RECORD_LIMIT: usize = 60;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub view: SessionView,
}

impl AppState {
    pub fn new(view: SessionView) -> Self {
        Self { view }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only points within this many seconds of the newest one
    pub window: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub series: String,
    pub points: Vec<HistoryPoint>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub generated_at: DateTime<Utc>,
    pub stats: RecordLogStats,
    pub records: Vec<AggregatedRecord>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.view.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 while a session is sampling
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.view.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest snapshot, 404 before the first tick
async fn snapshot(State(state): State<Arc<AppState>>) -> Response {
    match state.view.latest().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No snapshot yet"),
    }
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(series): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let key: SeriesKey = match series.parse() {
        Ok(key) => key,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let points = match query.window {
        Some(span) if span.is_finite() && span >= 0.0 => state.view.history_window(key, span).await,
        Some(_) => return error_response(StatusCode::BAD_REQUEST, "window must be non-negative"),
        None => state.view.history(key).await,
    };

    Json(HistoryResponse {
        series: key.to_string(),
        points,
    })
    .into_response()
}

async fn records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_RECORD_LIMIT);

    Json(RecordsResponse {
        generated_at: Utc::now(),
        stats: state.view.record_stats().await,
        records: state.view.recent_records(limit).await,
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/snapshot", get(snapshot))
        .route("/history/:series", get(history))
        .route("/records", get(records))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
