//! Append-only, per-user event history.
//!
//! Every rule reads from here. Histories for different users are independent:
//! the outer lock only guards the user → bucket map, and each bucket has its
//! own lock, so appends for two users never wait on each other's records.
//! Uses `std::sync::RwLock` since no guard is ever held across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use monitor_core::config::LimitsConfig;
use monitor_core::{Event, EventId, StoredEvent, UserId};

type Bucket = Arc<RwLock<VecDeque<StoredEvent>>>;

pub struct EventStore {
    users: RwLock<HashMap<UserId, Bucket>>,
    next_seq: AtomicU64,
    max_events_per_user: Option<usize>,
    /// Events this close to a user's newest event are never evicted.
    retain_window: Duration,
}

impl EventStore {
    /// Create a store that keeps every event.
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            max_events_per_user: None,
            retain_window: Duration::zero(),
        }
    }

    /// Create a store that keeps at most `cap` events per user, evicting FIFO.
    pub fn with_history_cap(cap: usize) -> Self {
        Self {
            max_events_per_user: Some(cap.max(1)),
            ..Self::new()
        }
    }

    /// Keep every event within `window` of its user's newest event, even past
    /// the history cap.
    pub fn with_retain_window(mut self, window: Duration) -> Self {
        self.retain_window = window.max(Duration::zero());
        self
    }

    /// Build a store for the given limits. A configured cap is raised to the
    /// consecutive-deletion threshold, and nothing inside the update window
    /// is evicted, so both history-reading rules always see what they need.
    pub fn from_config(config: &LimitsConfig) -> Self {
        match config.history_cap {
            Some(cap) => Self::with_history_cap(cap.max(config.consecutive_deletions))
                .with_retain_window(config.update_window()),
            None => Self::new(),
        }
    }

    pub fn retain_window(&self) -> Duration {
        self.retain_window
    }

    pub fn history_cap(&self) -> Option<usize> {
        self.max_events_per_user
    }

    fn bucket(&self, user_id: &UserId) -> Option<Bucket> {
        self.users
            .read()
            .expect("event store lock poisoned")
            .get(user_id)
            .cloned()
    }

    fn bucket_or_create(&self, user_id: &UserId) -> Bucket {
        if let Some(bucket) = self.bucket(user_id) {
            return bucket;
        }
        let mut users = self.users.write().expect("event store lock poisoned");
        users
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::new())))
            .clone()
    }

    /// Append an event to its user's history and return the stored copy.
    pub fn append(&self, event: Event) -> StoredEvent {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredEvent {
            id: EventId::from_sequence(seq),
            event,
        };

        let bucket = self.bucket_or_create(stored.user_id());
        let mut history = bucket.write().expect("event store bucket poisoned");
        history.push_back(stored.clone());
        if let Some(cap) = self.max_events_per_user {
            let keep_from = cutoff(stored.timestamp(), self.retain_window);
            while history.len() > cap
                && history.front().is_some_and(|oldest| oldest.timestamp() < keep_from)
            {
                history.pop_front();
            }
        }
        stored
    }

    /// The last `n` events for a user in arrival order (fewer if the history is shorter).
    pub fn recent(&self, user_id: &UserId, n: usize) -> Vec<StoredEvent> {
        let Some(bucket) = self.bucket(user_id) else {
            return Vec::new();
        };
        let history = bucket.read().expect("event store bucket poisoned");
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    /// Events for a user with `timestamp >= reference - window`, in arrival order.
    ///
    /// `reference` defaults to now. Rules always pass the triggering event's
    /// timestamp so results do not depend on when they run.
    pub fn in_window(
        &self,
        user_id: &UserId,
        window: Duration,
        reference: Option<DateTime<Utc>>,
    ) -> Vec<StoredEvent> {
        let Some(bucket) = self.bucket(user_id) else {
            return Vec::new();
        };
        let cutoff = cutoff(reference.unwrap_or_else(Utc::now), window);
        let history = bucket.read().expect("event store bucket poisoned");
        history
            .iter()
            .filter(|e| e.timestamp() >= cutoff)
            .cloned()
            .collect()
    }

    /// Full history for a user, in arrival order.
    pub fn user_events(&self, user_id: &UserId) -> Vec<StoredEvent> {
        self.bucket(user_id)
            .map(|bucket| {
                bucket
                    .read()
                    .expect("event store bucket poisoned")
                    .iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of users with at least one stored event.
    pub fn user_count(&self) -> usize {
        self.users.read().expect("event store lock poisoned").len()
    }

    pub fn clear_user(&self, user_id: &UserId) {
        self.users
            .write()
            .expect("event store lock poisoned")
            .remove(user_id);
    }

    /// Drop every history and restart event numbering.
    pub fn clear(&self) {
        self.users.write().expect("event store lock poisoned").clear();
        self.next_seq.store(0, Ordering::Relaxed);
    }
}

/// `reference - window`, saturating at the earliest representable instant.
fn cutoff(reference: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    reference
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}
