//! Queue consume loop: poll → parse → dispatch to lanes → ack.
//!
//! Unparseable messages are logged and acked so they never block the queue.
//! Good messages are acked once their event is queued on its lane, which
//! gives at-most-once processing. If the lanes have shut down, messages whose
//! events were not queued are nacked for redelivery.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use monitor_core::config::QueueConfig;
use monitor_limits::{LaneError, LaneRouter};
use monitor_queue::{parse_batch, QueueConsumer, QueueError, QueueMessage};

use crate::state::QueueMetrics;

/// Why the consume loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    Shutdown,
    QueueClosed,
    LanesClosed,
}

/// Run until shutdown is signalled, the queue closes, or the lanes stop.
pub async fn run_consumer(
    consumer: &dyn QueueConsumer,
    lanes: &LaneRouter,
    config: &QueueConfig,
    metrics: &QueueMetrics,
    mut shutdown: watch::Receiver<bool>,
) -> ConsumerExit {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    metrics.enabled.store(true, Ordering::Relaxed);

    info!(
        poll_interval_ms = config.poll_interval_ms,
        max_batch_size = config.max_batch_size,
        "Queue consumer started"
    );

    loop {
        if *shutdown.borrow() {
            return ConsumerExit::Shutdown;
        }

        let polled = tokio::select! {
            res = consumer.poll_batch(config.max_batch_size) => res,
            _ = shutdown.changed() => return ConsumerExit::Shutdown,
        };
        metrics.touch_poll();

        match polled {
            Ok(messages) if messages.is_empty() => {
                metrics.connected.store(true, Ordering::Relaxed);
                tokio::time::sleep(poll_interval).await;
            }
            Ok(messages) => {
                metrics.connected.store(true, Ordering::Relaxed);
                metrics
                    .messages_received
                    .fetch_add(messages.len() as u64, Ordering::Relaxed);
                if let Err(e) = process_batch(&messages, consumer, lanes, metrics).await {
                    warn!(error = %e, "Lanes closed; consumer stopping");
                    return ConsumerExit::LanesClosed;
                }
            }
            Err(QueueError::Closed) => {
                info!("Queue closed; consumer stopping");
                return ConsumerExit::QueueClosed;
            }
            Err(e) => {
                warn!(error = %e, retry_in_ms = config.poll_interval_ms, "Queue poll error");
                metrics.connected.store(false, Ordering::Relaxed);
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn process_batch(
    messages: &[QueueMessage],
    consumer: &dyn QueueConsumer,
    lanes: &LaneRouter,
    metrics: &QueueMetrics,
) -> Result<(), LaneError> {
    let batch_start = Instant::now();
    let (events, errors) = parse_batch(messages);

    let error_ids: HashSet<&str> = errors.iter().map(|(id, _)| id.as_str()).collect();
    metrics
        .parse_failures
        .fetch_add(errors.len() as u64, Ordering::Relaxed);

    // parse_batch keeps message order, so events line up with the parsed messages.
    let parsed: Vec<&QueueMessage> = messages
        .iter()
        .filter(|m| !error_ids.contains(m.id.as_str()))
        .collect();

    let mut dispatched = 0;
    let mut closed = None;
    for event in events {
        if let Err(e) = lanes.dispatch(event).await {
            closed = Some(e);
            break;
        }
        dispatched += 1;
    }
    metrics
        .events_dispatched
        .fetch_add(dispatched as u64, Ordering::Relaxed);

    let undispatched: HashSet<&str> = parsed[dispatched..]
        .iter()
        .map(|m| m.id.as_str())
        .collect();

    for msg in messages {
        if undispatched.contains(msg.id.as_str()) {
            if let Err(e) = consumer.nack(&msg.receipt_handle).await {
                warn!(message_id = %msg.id, error = %e, "Failed to nack message");
                metrics.ack_failures.fetch_add(1, Ordering::Relaxed);
            }
        } else if let Err(e) = consumer.ack(&msg.receipt_handle).await {
            warn!(message_id = %msg.id, error = %e, "Failed to ack message");
            metrics.ack_failures.fetch_add(1, Ordering::Relaxed);
        } else if error_ids.contains(msg.id.as_str()) {
            debug!(message_id = %msg.id, "Dropped unparseable message");
        }
    }

    if let Some(e) = closed {
        warn!(returned = undispatched.len(), "Returned undispatched messages to the queue");
        return Err(e);
    }

    metrics.batches_processed.fetch_add(1, Ordering::Relaxed);
    debug!(
        messages = messages.len(),
        dispatched,
        parse_failures = errors.len(),
        elapsed_ms = batch_start.elapsed().as_millis() as u64,
        "Queue batch processed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use monitor_core::config::LimitsConfig;
    use monitor_core::LimitType;
    use monitor_limits::{LimitChecker, MemorySink};
    use monitor_queue::ChannelConsumer;

    fn queue_config() -> QueueConfig {
        QueueConfig {
            queue_url: None,
            max_batch_size: 4,
            poll_interval_ms: 1,
            visibility_timeout_secs: 30,
        }
    }

    fn body(user: u64, scope: &str, second: u32) -> String {
        format!(r#"{{"userId":{user},"scope":"{scope}","date":"2024-03-01T10:00:{second:02}Z"}}"#)
    }

    #[tokio::test]
    async fn consumes_until_queue_closes_and_acks_everything() {
        let sink = Arc::new(MemorySink::new());
        let checker = Arc::new(LimitChecker::from_config(&LimitsConfig::default(), sink.clone()));
        let lanes = LaneRouter::spawn(checker, 2, 8);
        let metrics = QueueMetrics::default();
        let (_tx, rx) = watch::channel(false);

        let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));
        let mut ids = Vec::new();
        for s in 0..3 {
            ids.push(producer.send(body(83, "user.delete", s), Some("83".into())).unwrap());
        }
        ids.push(producer.send("not json", None).unwrap());
        ids.push(producer.send(body(42, "top-secret.read", 5), Some("42".into())).unwrap());
        drop(producer);

        let exit = run_consumer(&consumer, &lanes, &queue_config(), &metrics, rx).await;
        lanes.shutdown().await;

        assert_eq!(exit, ConsumerExit::QueueClosed);
        assert_eq!(consumer.acked().await, ids);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 5);
        assert_eq!(snapshot.events_dispatched, 4);
        assert_eq!(snapshot.parse_failures, 1);
        assert!(snapshot.connected);

        let mut types: Vec<_> = sink.all().iter().map(|n| n.limit_type()).collect();
        types.sort_by_key(|t| t.as_str());
        assert_eq!(types, vec![LimitType::ThreeUserDeletions, LimitType::TopSecretRead]);
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let sink = Arc::new(MemorySink::new());
        let checker = Arc::new(LimitChecker::from_config(&LimitsConfig::default(), sink));
        let lanes = LaneRouter::spawn(checker, 1, 1);
        let metrics = QueueMetrics::default();
        let (tx, rx) = watch::channel(false);

        let (_producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));
        tx.send(true).unwrap();

        let exit = run_consumer(&consumer, &lanes, &queue_config(), &metrics, rx).await;
        lanes.shutdown().await;

        assert_eq!(exit, ConsumerExit::Shutdown);
        assert!(metrics.snapshot().enabled);
    }

    #[test]
    fn closed_lanes_return_undispatched_messages_to_the_queue() {
        let sink = Arc::new(MemorySink::new());
        let checker = Arc::new(LimitChecker::from_config(&LimitsConfig::default(), sink));

        // Lanes spawned on a runtime that is then dropped have no receivers left.
        let lanes_runtime = tokio::runtime::Runtime::new().unwrap();
        let lanes = {
            let _guard = lanes_runtime.enter();
            LaneRouter::spawn(checker, 1, 4)
        };
        drop(lanes_runtime);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let metrics = QueueMetrics::default();
            let (_tx, rx) = watch::channel(false);
            let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));

            let bad = producer.send("not json", None).unwrap();
            let first = producer.send(body(7, "payment.read", 0), Some("7".into())).unwrap();
            let second = producer.send(body(8, "user.update", 1), Some("8".into())).unwrap();

            let exit = run_consumer(&consumer, &lanes, &queue_config(), &metrics, rx).await;

            assert_eq!(exit, ConsumerExit::LanesClosed);
            assert_eq!(consumer.acked().await, vec![bad]);
            assert_eq!(metrics.snapshot().events_dispatched, 0);

            let redelivered = consumer.poll_batch(10).await.unwrap();
            let ids: Vec<_> = redelivered.iter().map(|m| m.id.clone()).collect();
            assert_eq!(ids, vec![first, second]);
            assert!(redelivered.iter().all(|m| m.attempt_count == 2));
        });
    }
}
