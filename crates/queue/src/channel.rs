//! In-process queue backed by a tokio channel.
//!
//! Used for local runs (`replay`) and tests. Messages come out in the order
//! they were sent, so the per-user ordering contract holds trivially.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;

/// Sending half of an in-process queue.
#[derive(Clone)]
pub struct ChannelProducer {
    tx: mpsc::UnboundedSender<QueueMessage>,
    seq: Arc<AtomicU64>,
}

impl ChannelProducer {
    /// Enqueue a raw body under the given partition key.
    pub fn send(&self, body: impl Into<String>, partition_key: Option<String>) -> Result<String, QueueError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("chan-{n}");
        let msg = QueueMessage {
            id: id.clone(),
            body: body.into(),
            receipt_handle: id.clone(),
            partition_key,
            timestamp: Utc::now(),
            attempt_count: 1,
        };
        self.tx.send(msg).map_err(|_| QueueError::Closed)?;
        Ok(id)
    }
}

/// Receiving half of an in-process queue.
pub struct ChannelConsumer {
    rx: Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
    /// Messages handed out but not yet acked, plus nacked ones awaiting redelivery.
    in_flight: Mutex<Vec<QueueMessage>>,
    redeliver: Mutex<VecDeque<QueueMessage>>,
    acked: Mutex<Vec<String>>,
    poll_wait: Duration,
}

impl ChannelConsumer {
    /// Create a connected producer/consumer pair.
    ///
    /// `poll_wait` bounds how long an empty `poll_batch` waits for the first message.
    pub fn pair(poll_wait: Duration) -> (ChannelProducer, ChannelConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = ChannelProducer {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        };
        let consumer = ChannelConsumer {
            rx: Mutex::new(rx),
            in_flight: Mutex::new(Vec::new()),
            redeliver: Mutex::new(VecDeque::new()),
            acked: Mutex::new(Vec::new()),
            poll_wait,
        };
        (producer, consumer)
    }

    /// Receipt handles acked so far, in ack order.
    pub async fn acked(&self) -> Vec<String> {
        self.acked.lock().await.clone()
    }
}

#[async_trait]
impl QueueConsumer for ChannelConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let max = max_messages.max(1) as usize;
        let mut batch = Vec::with_capacity(max);

        {
            let mut redeliver = self.redeliver.lock().await;
            while batch.len() < max {
                match redeliver.pop_front() {
                    Some(mut msg) => {
                        msg.attempt_count += 1;
                        batch.push(msg);
                    }
                    None => break,
                }
            }
        }

        let mut rx = self.rx.lock().await;
        if batch.is_empty() {
            match tokio::time::timeout(self.poll_wait, rx.recv()).await {
                Ok(Some(msg)) => batch.push(msg),
                Ok(None) => return Err(QueueError::Closed),
                Err(_) => return Ok(batch),
            }
        }
        while batch.len() < max {
            match rx.try_recv() {
                Ok(msg) => batch.push(msg),
                Err(_) => break,
            }
        }
        drop(rx);

        self.in_flight.lock().await.extend(batch.iter().cloned());
        Ok(batch)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().await;
        let pos = in_flight
            .iter()
            .position(|m| m.receipt_handle == receipt_handle)
            .ok_or_else(|| QueueError::Ack(format!("unknown receipt handle {receipt_handle}")))?;
        in_flight.remove(pos);
        self.acked.lock().await.push(receipt_handle.to_string());
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().await;
        let pos = in_flight
            .iter()
            .position(|m| m.receipt_handle == receipt_handle)
            .ok_or_else(|| QueueError::Ack(format!("unknown receipt handle {receipt_handle}")))?;
        let msg = in_flight.remove(pos);
        self.redeliver.lock().await.push_back(msg);
        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let pending = self.redeliver.lock().await.len() as u64;
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: Some(pending),
            provider: "channel".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_returns_messages_in_send_order() {
        let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(10));
        for i in 0..5 {
            producer.send(format!("body-{i}"), Some("u1".into())).unwrap();
        }

        let first = consumer.poll_batch(3).await.unwrap();
        let second = consumer.poll_batch(3).await.unwrap();

        let bodies: Vec<_> = first.iter().chain(second.iter()).map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["body-0", "body-1", "body-2", "body-3", "body-4"]);
        assert_eq!(first[0].partition_key.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn empty_poll_times_out_with_no_messages() {
        let (_producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));
        let batch = consumer.poll_batch(10).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn closed_queue_reports_closed() {
        let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));
        drop(producer);
        assert!(matches!(consumer.poll_batch(1).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn ack_and_nack() {
        let (producer, consumer) = ChannelConsumer::pair(Duration::from_millis(5));
        let a = producer.send("a", None).unwrap();
        let b = producer.send("b", None).unwrap();

        let batch = consumer.poll_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);

        consumer.ack(&a).await.unwrap();
        consumer.nack(&b).await.unwrap();
        assert!(consumer.ack(&a).await.is_err());

        let redelivered = consumer.poll_batch(5).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].body, "b");
        assert_eq!(redelivered[0].attempt_count, 2);
        assert_eq!(consumer.acked().await, vec![a]);
    }
}
