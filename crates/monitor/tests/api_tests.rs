//! Integration tests for the perf-monitor API endpoints

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use monitor_lib::health::components;
use monitor_lib::{
    CoreCounters, DeviceSource, MonitorMetrics, MonitorSession, PowerReading, RawSnapshot,
    SamplerConfig, SessionConfig, SessionView, SourceResult, VsyncTriplet,
};
use perf_monitor::api::{create_router, AppState, HistoryResponse, RecordsResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Single core device at 25% load
#[derive(Default)]
struct StaticDevice {
    calls: AtomicU64,
}

#[async_trait]
impl DeviceSource for StaticDevice {
    async fn cpu_counters(&self) -> SourceResult<Vec<CoreCounters>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            CoreCounters::new(100 * n, 75 * n),
            CoreCounters::new(100 * n, 75 * n),
        ])
    }

    async fn cpu_frequencies(&self) -> SourceResult<Vec<f64>> {
        Ok(vec![1500.0])
    }

    async fn foreground_layer(&self, _package: &str) -> SourceResult<Option<String>> {
        Ok(None)
    }

    async fn vsync_triplets(&self, _layer: &str) -> SourceResult<Vec<VsyncTriplet>> {
        Ok(Vec::new())
    }

    async fn refresh_rate_hz(&self) -> SourceResult<f64> {
        Ok(60.0)
    }

    async fn power_reading(&self) -> SourceResult<Option<PowerReading>> {
        Ok(Some(PowerReading::from_volts_milliamps(4.0, 250.0)))
    }

    async fn temperature(&self) -> SourceResult<f64> {
        Ok(41.0)
    }

    async fn memory_percent(&self) -> SourceResult<f64> {
        Ok(55.0)
    }

    async fn gpu_percent(&self) -> SourceResult<f64> {
        Ok(10.0)
    }

    async fn device_name(&self) -> SourceResult<String> {
        Ok("static".to_string())
    }

    async fn device_ip(&self) -> SourceResult<String> {
        Ok("10.0.0.2".to_string())
    }
}

fn test_state(view: SessionView) -> Arc<AppState> {
    Arc::new(AppState::new(view))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn running_session() -> MonitorSession {
    let config = SessionConfig {
        sampler: SamplerConfig {
            interval: Duration::from_millis(100),
            ..SamplerConfig::default()
        },
        bucket_interval: Duration::from_millis(200),
        ..SessionConfig::default()
    };
    MonitorSession::start(Arc::new(StaticDevice::default()), config)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_healthz_and_readyz_before_start() {
    let view = SessionView::new(10, 10);
    view.health().register(components::API).await;
    let app = create_router(test_state(view));

    let (status, body) = get_json(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_healthz_degraded_is_still_ok() {
    let view = SessionView::new(10, 10);
    view.health()
        .set_degraded(components::SAMPLER, "3 consecutive errors")
        .await;
    let app = create_router(test_state(view.clone()));

    let (status, body) = get_json(app.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    view.health()
        .set_unhealthy(components::SAMPLER, "session stopped")
        .await;
    let (status, _) = get_json(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    MonitorMetrics::new().inc_ticks();
    let app = create_router(test_state(SessionView::new(10, 10)));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("perf_monitor_ticks_total"));
}

#[tokio::test]
async fn test_empty_view() {
    let app = create_router(test_state(SessionView::new(10, 10)));

    let (status, body) = get_json(app.clone(), "/snapshot").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, body) = get_json(app.clone(), "/history/fps").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["series"], "fps");
    assert_eq!(body["points"].as_array().unwrap().len(), 0);

    let (status, body) = get_json(app, "/records").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["entries"], 0);
}

#[tokio::test]
async fn test_history_rejects_unknown_series() {
    let app = create_router(test_state(SessionView::new(10, 10)));

    let (status, body) = get_json(app.clone(), "/history/bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bogus"));

    let (status, _) = get_json(app.clone(), "/history/cpu_usage_8").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(app, "/history/fps?window=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pull_from_running_session() {
    let session = running_session().await;
    let app = create_router(test_state(session.view()));

    tokio::time::sleep(Duration::from_millis(750)).await;

    let (status, body) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = get_json(app.clone(), "/snapshot").await;
    assert_eq!(status, StatusCode::OK);
    let latest: RawSnapshot = serde_json::from_value(body).unwrap();
    assert_eq!(latest.device_name, "static");
    assert_eq!(latest.usages, vec![25.0]);
    assert_eq!(latest.fps, -1.0);
    assert_eq!(latest.power.milliwatts, 1000.0);

    let (status, body) = get_json(app.clone(), "/history/cpu_usage_0").await;
    assert_eq!(status, StatusCode::OK);
    let history: HistoryResponse = serde_json::from_value(body).unwrap();
    assert!(history.points.len() >= 3);
    assert_eq!(history.points.last().unwrap().value, 25.0);

    let (_, body) = get_json(app.clone(), "/history/cpu_usage_0?window=0.25").await;
    let window: HistoryResponse = serde_json::from_value(body).unwrap();
    assert!(window.points.len() < history.points.len());

    let (status, body) = get_json(app.clone(), "/records?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let records: RecordsResponse = serde_json::from_value(body).unwrap();
    assert_eq!(records.records.len(), 1);
    assert!(records.stats.entries >= 2);
    assert_eq!(records.records[0].cpu_usage[0], 25.0);
    assert_eq!(records.records[0].temperature, 41.0);

    session.stop().await.unwrap();
    let (status, _) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
