//! Limit rules.
//!
//! Each evaluator inspects the triggering event plus the user's stored
//! history and reports at most one notification. Evaluators hold only their
//! thresholds; all history lives in the [`EventStore`].

mod consecutive_deletion;
mod top_secret_read;
mod user_update_window;

pub use consecutive_deletion::ConsecutiveDeletionEvaluator;
pub use top_secret_read::TopSecretReadEvaluator;
pub use user_update_window::UserUpdateWindowEvaluator;

use monitor_core::config::LimitsConfig;
use monitor_core::{Notification, StoredEvent, ValidationError};

use crate::store::EventStore;

/// Errors an evaluator can report instead of a result.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("notification rejected: {0}")]
    InvalidNotification(#[from] ValidationError),

    #[error("evaluator panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// A single limit rule.
pub trait LimitEvaluator: Send + Sync {
    /// Stable name used in logs and reports.
    fn name(&self) -> &str;

    /// Check the rule for `event`, which has already been appended to `store`.
    ///
    /// `Ok(None)` means the rule did not fire.
    fn check(
        &self,
        event: &StoredEvent,
        store: &EventStore,
    ) -> Result<Option<Notification>, EvaluatorError>;
}

/// The fixed rule registry, in evaluation order.
pub fn default_evaluators(config: &LimitsConfig) -> Vec<Box<dyn LimitEvaluator>> {
    vec![
        Box::new(ConsecutiveDeletionEvaluator::new(config.consecutive_deletions)),
        Box::new(TopSecretReadEvaluator),
        Box::new(UserUpdateWindowEvaluator::new(
            config.update_window(),
            config.update_window_count,
        )),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_is_fixed() {
        let names: Vec<String> = default_evaluators(&LimitsConfig::default())
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "ConsecutiveDeletionChecker",
                "TopSecretReadChecker",
                "UserUpdateWindowChecker"
            ]
        );
    }
}
