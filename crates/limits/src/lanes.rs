//! Per-user ordered processing lanes.
//!
//! Events are routed to one of N lanes by hashing the user id. Each lane is a
//! bounded channel drained by a single task that records and evaluates one
//! event at a time in dispatch order. Notifications are saved by a follow-up
//! task chained behind the same user's previous save, so saves stay in order
//! per user while a slow save never holds up other users on the lane.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use monitor_core::config::LimitsConfig;
use monitor_core::{Event, UserId};

use crate::orchestrator::{Evaluated, LimitChecker, ProcessReport};

#[derive(Debug, thiserror::Error)]
pub enum LaneError {
    #[error("lane {0} is closed")]
    Closed(usize),

    #[error("lane {0} dropped the event before reporting")]
    Dropped(usize),
}

struct LaneItem {
    event: Event,
    reply: Option<oneshot::Sender<ProcessReport>>,
}

pub struct LaneRouter {
    senders: Vec<mpsc::Sender<LaneItem>>,
    workers: Vec<JoinHandle<()>>,
}

impl LaneRouter {
    /// Spawn `lane_count` lanes, each buffering up to `capacity` events.
    pub fn spawn(checker: Arc<LimitChecker>, lane_count: usize, capacity: usize) -> Self {
        let lane_count = lane_count.max(1);
        let mut senders = Vec::with_capacity(lane_count);
        let mut workers = Vec::with_capacity(lane_count);

        for lane in 0..lane_count {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_lane(lane, checker.clone(), rx)));
        }

        info!(lanes = lane_count, capacity, "Processing lanes started");
        Self { senders, workers }
    }

    pub fn from_config(checker: Arc<LimitChecker>, config: &LimitsConfig) -> Self {
        Self::spawn(checker, config.lane_count, config.lane_capacity)
    }

    pub fn lane_count(&self) -> usize {
        self.senders.len()
    }

    /// The lane every event for `user_id` goes to.
    pub fn lane_for(&self, user_id: &UserId) -> usize {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue an event on its user's lane, waiting while the lane is full.
    pub async fn dispatch(&self, event: Event) -> Result<(), LaneError> {
        let lane = self.lane_for(event.user_id());
        self.senders[lane]
            .send(LaneItem { event, reply: None })
            .await
            .map_err(|_| LaneError::Closed(lane))
    }

    /// Queue an event and wait until its lane has processed it.
    pub async fn dispatch_and_wait(&self, event: Event) -> Result<ProcessReport, LaneError> {
        let lane = self.lane_for(event.user_id());
        let (reply, done) = oneshot::channel();
        self.senders[lane]
            .send(LaneItem {
                event,
                reply: Some(reply),
            })
            .await
            .map_err(|_| LaneError::Closed(lane))?;
        done.await.map_err(|_| LaneError::Dropped(lane))
    }

    /// Stop accepting events, drain what is queued, and wait for every lane
    /// and its pending saves.
    pub async fn shutdown(self) {
        drop(self.senders);
        for (lane, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                warn!(lane, error = %e, "Lane task ended abnormally");
            }
        }
        info!("Processing lanes stopped");
    }
}

async fn run_lane(lane: usize, checker: Arc<LimitChecker>, mut rx: mpsc::Receiver<LaneItem>) {
    let mut pending_saves: HashMap<UserId, JoinHandle<()>> = HashMap::new();

    while let Some(item) = rx.recv().await {
        pending_saves.retain(|_, save| !save.is_finished());

        let evaluated = checker.evaluate(item.event);
        let previous = pending_saves.remove(evaluated.user_id());

        if previous.is_none() && !evaluated.has_notifications() {
            let report = checker.persist(evaluated).await;
            finish(lane, report, item.reply);
            continue;
        }

        let user_id = evaluated.user_id().clone();
        let save = tokio::spawn(persist_after(
            lane,
            checker.clone(),
            previous,
            evaluated,
            item.reply,
        ));
        pending_saves.insert(user_id, save);
    }

    for (user_id, save) in pending_saves {
        if let Err(e) = save.await {
            warn!(lane, user_id = %user_id, error = %e, "Notification save task ended abnormally");
        }
    }
    debug!(lane, "Lane drained");
}

async fn persist_after(
    lane: usize,
    checker: Arc<LimitChecker>,
    previous: Option<JoinHandle<()>>,
    evaluated: Evaluated,
    reply: Option<oneshot::Sender<ProcessReport>>,
) {
    if let Some(previous) = previous {
        if let Err(e) = previous.await {
            warn!(lane, error = %e, "Notification save task ended abnormally");
        }
    }
    let report = checker.persist(evaluated).await;
    finish(lane, report, reply);
}

fn finish(lane: usize, report: ProcessReport, reply: Option<oneshot::Sender<ProcessReport>>) {
    debug!(
        lane,
        event_id = %report.event_id,
        user_id = %report.user_id,
        detected = report.detected().len(),
        failures = report.failures(),
        "Event processed"
    );
    if let Some(reply) = reply {
        let _ = reply.send(report);
    }
}
