//! Notification persistence contract.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use monitor_core::{LimitType, Notification, NotificationId, UserId};

/// Errors from a notification sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink backend error: {0}")]
    Backend(String),

    #[error("stored notification is invalid: {0}")]
    Corrupt(String),

    #[error("sink call timed out after {0}ms")]
    Timeout(u64),
}

/// Query filters for [`NotificationSink::find`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilters {
    pub user_id: Option<UserId>,
    pub limit_type: Option<LimitType>,
}

impl NotificationFilters {
    pub fn matches(&self, notification: &Notification) -> bool {
        self.user_id
            .as_ref()
            .map_or(true, |uid| notification.user_id() == uid)
            && self
                .limit_type
                .map_or(true, |lt| notification.limit_type() == lt)
    }
}

/// Durable home for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Upsert by notification id. Saving the same id twice leaves one record
    /// holding the latest fields.
    async fn save(&self, notification: &Notification) -> Result<(), SinkError>;

    /// Notifications matching `filters`, newest `created_at` first.
    async fn find(&self, filters: &NotificationFilters) -> Result<Vec<Notification>, SinkError>;

    /// Reachability probe used by health checks.
    async fn ping(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Short backend name for logs, e.g. "memory" or "postgres".
    fn backend_name(&self) -> &str;
}

/// In-process sink. Used for local runs and tests.
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<HashMap<NotificationId, Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("memory sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored notification, newest first.
    pub fn all(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self
            .records
            .read()
            .expect("memory sink lock poisoned")
            .values()
            .cloned()
            .collect();
        sort_newest_first(&mut all);
        all
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn save(&self, notification: &Notification) -> Result<(), SinkError> {
        self.records
            .write()
            .expect("memory sink lock poisoned")
            .insert(notification.id(), notification.clone());
        Ok(())
    }

    async fn find(&self, filters: &NotificationFilters) -> Result<Vec<Notification>, SinkError> {
        let mut found: Vec<Notification> = self
            .records
            .read()
            .expect("memory sink lock poisoned")
            .values()
            .filter(|n| filters.matches(n))
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
