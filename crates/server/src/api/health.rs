//! Liveness, readiness and dependency health.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{AppState, QueueMetricsSnapshot};

const SINK_PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub backend: String,
    pub status: &'static str,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Services {
    pub sink: ServiceHealth,
    pub queue: QueueMetricsSnapshot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub services: Services,
    pub meta: serde_json::Value,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct LiveResponse {
    pub alive: bool,
    pub timestamp: DateTime<Utc>,
}

async fn check_sink(state: &AppState) -> ServiceHealth {
    let start = Instant::now();
    let result = tokio::time::timeout(SINK_PING_TIMEOUT, state.sink.ping()).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("ping timed out after {}ms", SINK_PING_TIMEOUT.as_millis())),
    };
    if let Some(e) = &error {
        tracing::warn!(backend = state.sink.backend_name(), error = %e, "Sink health check failed");
    }

    ServiceHealth {
        backend: state.sink.backend_name().to_string(),
        status: if error.is_none() { "up" } else { "down" },
        latency_ms,
        error,
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let sink = check_sink(&state).await;
    let healthy = sink.error.is_none();

    let body = HealthResponse {
        healthy,
        status: if healthy { "ok" } else { "degraded" },
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        services: Services {
            sink,
            queue: state.queue_metrics.snapshot(),
        },
        meta: state.config_summary.clone(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    if check_sink(&state).await.error.is_none() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                status: "ready",
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                status: "not_ready",
            }),
        )
    }
}

pub async fn live() -> Json<LiveResponse> {
    Json(LiveResponse {
        alive: true,
        timestamp: Utc::now(),
    })
}
