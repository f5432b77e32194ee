//! Replay a JSON-lines file of events through the limit engine.
//!
//! Each non-blank line is one inbound message body. Lines go through the same
//! parse and consume path as queue traffic, via an in-process channel queue.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use monitor_core::config::{LimitsConfig, QueueConfig};
use monitor_limits::{LaneRouter, LimitChecker};
use monitor_queue::ChannelConsumer;

use crate::consume::run_consumer;
use crate::state::QueueMetrics;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub lines: usize,
    pub events: u64,
    pub parse_failures: u64,
}

pub async fn replay_file(
    path: &Path,
    checker: Arc<LimitChecker>,
    limits: &LimitsConfig,
    queue: &QueueConfig,
) -> anyhow::Result<ReplaySummary> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    replay_lines(&contents, checker, limits, queue).await
}

pub async fn replay_lines(
    contents: &str,
    checker: Arc<LimitChecker>,
    limits: &LimitsConfig,
    queue: &QueueConfig,
) -> anyhow::Result<ReplaySummary> {
    let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(10));
    let mut lines = 0;
    for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
        producer.send(line, None)?;
        lines += 1;
    }
    drop(producer);

    let lanes = LaneRouter::from_config(checker, limits);
    let metrics = QueueMetrics::default();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let exit = run_consumer(&consumer, &lanes, queue, &metrics, shutdown_rx).await;
    lanes.shutdown().await;

    let summary = ReplaySummary {
        lines,
        events: metrics.events_dispatched.load(Ordering::Relaxed),
        parse_failures: metrics.parse_failures.load(Ordering::Relaxed),
    };
    info!(?exit, lines, events = summary.events, parse_failures = summary.parse_failures, "Replay finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::LimitType;
    use monitor_limits::{MemorySink, NotificationFilters, NotificationSink};

    fn queue() -> QueueConfig {
        QueueConfig {
            queue_url: None,
            max_batch_size: 10,
            poll_interval_ms: 1,
            visibility_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn replays_update_window_scenario() {
        let sink = Arc::new(MemorySink::new());
        let limits = LimitsConfig::default();
        let checker = Arc::new(LimitChecker::from_config(&limits, sink.clone()));

        let input = r#"
{"userId":99,"scope":"user.update","date":"2024-03-01T10:00:00Z"}
{"userId":99,"scope":"user.update","date":"2024-03-01T10:00:30Z"}
{"userId":7,"scope":"user.update","date":"2024-03-01T10:00:00Z"}
{"userId":7,"scope":"user.update","date":"2024-03-01T10:01:01Z"}
{"userId":"oops","scope":"user.update","date":"2024-03-01T10:00:00Z"}
"#;

        let summary = replay_lines(input, checker, &limits, &queue()).await.unwrap();
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.events, 4);
        assert_eq!(summary.parse_failures, 1);

        let found = sink.find(&NotificationFilters::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id().as_str(), "99");
        assert_eq!(found[0].limit_type(), LimitType::TwoUserUpdatesInOneMinute);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let limits = LimitsConfig::default();
        let checker = Arc::new(LimitChecker::from_config(&limits, Arc::new(MemorySink::new())));
        let err = replay_file(Path::new("/nonexistent/events.jsonl"), checker, &limits, &queue())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
