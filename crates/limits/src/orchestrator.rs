//! Runs every limit rule against each incoming event.
//!
//! The checker records the event first, then evaluates each rule in
//! registration order and persists whatever fires. A failing rule or a
//! failing sink call is logged and reported; it never stops the remaining
//! rules and never propagates to the caller.
//!
//! Evaluation and persistence are separate steps so a caller can record and
//! check the next event while an earlier notification is still being saved.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use monitor_core::config::LimitsConfig;
use monitor_core::{Event, EventId, Notification, StoredEvent, UserId};

use crate::evaluator::{default_evaluators, EvaluatorError, LimitEvaluator};
use crate::sink::{NotificationSink, SinkError};
use crate::store::EventStore;

const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened for one evaluator on one event.
#[derive(Debug, Clone)]
pub enum Outcome {
    NoMatch,
    Saved(Notification),
    EvaluatorFailed(String),
    SinkFailed {
        notification: Notification,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub evaluator: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// Per-event summary. Used for logs and tests; callers never need to act on it.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub event_id: EventId,
    pub user_id: UserId,
    pub outcomes: Vec<EvaluationOutcome>,
}

impl ProcessReport {
    /// Notifications that were detected, whether or not they were persisted.
    pub fn detected(&self) -> Vec<&Notification> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Saved(n) => Some(n),
                Outcome::SinkFailed { notification, .. } => Some(notification),
                _ => None,
            })
            .collect()
    }

    /// Notifications the sink accepted.
    pub fn saved(&self) -> Vec<&Notification> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Saved(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.outcome,
                    Outcome::EvaluatorFailed(_) | Outcome::SinkFailed { .. }
                )
            })
            .count()
    }
}

enum Checked {
    NoMatch,
    Detected(Notification),
    Failed(String),
}

/// Rule results for one recorded event, before any notification is saved.
pub struct Evaluated {
    stored: StoredEvent,
    results: Vec<(String, Checked, u64)>,
}

impl Evaluated {
    pub fn event(&self) -> &StoredEvent {
        &self.stored
    }

    pub fn user_id(&self) -> &UserId {
        self.stored.user_id()
    }

    /// Whether persisting this will call the sink.
    pub fn has_notifications(&self) -> bool {
        self.results
            .iter()
            .any(|(_, checked, _)| matches!(checked, Checked::Detected(_)))
    }
}

/// Records events and fans them out to the limit rules.
pub struct LimitChecker {
    store: Arc<EventStore>,
    evaluators: Vec<Box<dyn LimitEvaluator>>,
    sink: Arc<dyn NotificationSink>,
    sink_timeout: Duration,
}

impl LimitChecker {
    pub fn new(
        store: Arc<EventStore>,
        evaluators: Vec<Box<dyn LimitEvaluator>>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            evaluators,
            sink,
            sink_timeout: DEFAULT_SINK_TIMEOUT,
        }
    }

    /// Standard wiring: the default rule registry and a store sized from `config`.
    pub fn from_config(config: &LimitsConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self::new(
            Arc::new(EventStore::from_config(config)),
            default_evaluators(config),
            sink,
        )
        .with_sink_timeout(config.sink_timeout())
    }

    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    pub fn evaluator_names(&self) -> Vec<&str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    /// Record `event`, run every rule against it and persist what fires.
    ///
    /// Events for one user must be passed in order and never concurrently.
    pub async fn process_event(&self, event: Event) -> ProcessReport {
        let evaluated = self.evaluate(event);
        self.persist(evaluated).await
    }

    /// Record `event` and run every rule against it without touching the sink.
    ///
    /// Same ordering requirement as [`process_event`](Self::process_event).
    pub fn evaluate(&self, event: Event) -> Evaluated {
        let stored = self.store.append(event);

        debug!(
            event_id = %stored.id,
            user_id = %stored.user_id(),
            scope = %stored.scope(),
            timestamp = %stored.timestamp(),
            "Processing event"
        );

        let results = self
            .evaluators
            .iter()
            .map(|evaluator| {
                let start = Instant::now();
                let result = self.check_one(evaluator.as_ref(), &stored);
                (
                    evaluator.name().to_string(),
                    result,
                    start.elapsed().as_millis() as u64,
                )
            })
            .collect();

        Evaluated { stored, results }
    }

    /// Save every notification in `evaluated`, in rule order.
    pub async fn persist(&self, evaluated: Evaluated) -> ProcessReport {
        let Evaluated { stored, results } = evaluated;

        let mut outcomes = Vec::with_capacity(results.len());
        for (evaluator, result, check_ms) in results {
            let start = Instant::now();
            let outcome = match result {
                Checked::NoMatch => Outcome::NoMatch,
                Checked::Failed(msg) => Outcome::EvaluatorFailed(msg),
                Checked::Detected(notification) => {
                    self.save_one(&evaluator, &stored, notification).await
                }
            };
            outcomes.push(EvaluationOutcome {
                evaluator,
                outcome,
                duration_ms: check_ms + start.elapsed().as_millis() as u64,
            });
        }

        ProcessReport {
            event_id: stored.id.clone(),
            user_id: stored.user_id().clone(),
            outcomes,
        }
    }

    fn check_one(&self, evaluator: &dyn LimitEvaluator, stored: &StoredEvent) -> Checked {
        let name = evaluator.name();

        let checked = catch_unwind(AssertUnwindSafe(|| evaluator.check(stored, &self.store)))
            .unwrap_or_else(|panic| Err(EvaluatorError::Panicked(panic_message(&*panic))));

        match checked {
            Ok(Some(notification)) => {
                warn!(
                    evaluator = name,
                    event_id = %stored.id,
                    user_id = %notification.user_id(),
                    limit_type = %notification.limit_type(),
                    trigger = %notification.event_metadata().description(),
                    message = notification.message(),
                    "Limit exceeded"
                );
                Checked::Detected(notification)
            }
            Ok(None) => Checked::NoMatch,
            Err(e) => {
                error!(
                    evaluator = name,
                    event_id = %stored.id,
                    user_id = %stored.user_id(),
                    scope = %stored.scope(),
                    error = %e,
                    "Limit evaluator failed"
                );
                Checked::Failed(e.to_string())
            }
        }
    }

    async fn save_one(
        &self,
        evaluator: &str,
        stored: &StoredEvent,
        notification: Notification,
    ) -> Outcome {
        match self.save(&notification).await {
            Ok(()) => {
                info!(
                    evaluator,
                    notification_id = %notification.id(),
                    sink = self.sink.backend_name(),
                    "Notification saved"
                );
                Outcome::Saved(notification)
            }
            Err(e) => {
                error!(
                    evaluator,
                    event_id = %stored.id,
                    notification_id = %notification.id(),
                    sink = self.sink.backend_name(),
                    error = %e,
                    "Failed to save notification"
                );
                Outcome::SinkFailed {
                    notification,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn save(&self, notification: &Notification) -> Result<(), SinkError> {
        tokio::time::timeout(self.sink_timeout, self.sink.save(notification))
            .await
            .map_err(|_| SinkError::Timeout(self.sink_timeout.as_millis() as u64))?
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
