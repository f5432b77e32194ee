use monitor_core::{Action, Area, EventMetadata, LimitType, Notification, StoredEvent};

use super::{EvaluatorError, LimitEvaluator};
use crate::store::EventStore;

/// Fires when a user's last `required` events are all user deletions.
///
/// Keeps firing on every further deletion while the run is unbroken.
pub struct ConsecutiveDeletionEvaluator {
    required: usize,
}

impl ConsecutiveDeletionEvaluator {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
        }
    }
}

impl LimitEvaluator for ConsecutiveDeletionEvaluator {
    fn name(&self) -> &str {
        "ConsecutiveDeletionChecker"
    }

    fn check(
        &self,
        event: &StoredEvent,
        store: &EventStore,
    ) -> Result<Option<Notification>, EvaluatorError> {
        if !event.is(Area::User, Action::Delete) {
            return Ok(None);
        }

        let tail = store.recent(event.user_id(), self.required);
        if tail.len() < self.required || !tail.iter().all(|e| e.is(Area::User, Action::Delete)) {
            return Ok(None);
        }

        let notification = Notification::create(
            event.user_id().clone(),
            LimitType::ThreeUserDeletions,
            EventMetadata::for_event(event),
            format!(
                "User {} deleted {} resources consecutively",
                event.user_id(),
                self.required
            ),
        )?;
        Ok(Some(notification))
    }
}
