use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use monitor_limits::NotificationSink;

pub struct AppState {
    pub sink: Arc<dyn NotificationSink>,
    pub queue_metrics: Arc<QueueMetrics>,
    /// Redacted config snapshot reported by `/health`.
    pub config_summary: serde_json::Value,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        queue_metrics: Arc<QueueMetrics>,
        config_summary: serde_json::Value,
    ) -> Self {
        Self {
            sink,
            queue_metrics,
            config_summary,
            started_at: Instant::now(),
        }
    }
}

// ── Queue metrics ─────────────────────────────────────────────

/// Counters updated by the consume loop and read by health endpoints.
#[derive(Default)]
pub struct QueueMetrics {
    pub enabled: AtomicBool,
    pub connected: AtomicBool,
    pub messages_received: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub parse_failures: AtomicU64,
    pub ack_failures: AtomicU64,
    pub batches_processed: AtomicU64,
    pub last_poll_epoch_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetricsSnapshot {
    pub enabled: bool,
    pub connected: bool,
    pub messages_received: u64,
    pub events_dispatched: u64,
    pub parse_failures: u64,
    pub ack_failures: u64,
    pub batches_processed: u64,
    pub last_poll_epoch_ms: Option<u64>,
}

impl QueueMetrics {
    pub fn touch_poll(&self) {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.last_poll_epoch_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        let last_poll = self.last_poll_epoch_ms.load(Ordering::Relaxed);
        QueueMetricsSnapshot {
            enabled: self.enabled.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            last_poll_epoch_ms: (last_poll > 0).then_some(last_poll),
        }
    }
}
