use monitor_core::{Action, Area, EventMetadata, LimitType, Notification, StoredEvent};

use super::{EvaluatorError, LimitEvaluator};
use crate::store::EventStore;

/// Fires on every read of the top-secret area. Needs no history.
pub struct TopSecretReadEvaluator;

impl LimitEvaluator for TopSecretReadEvaluator {
    fn name(&self) -> &str {
        "TopSecretReadChecker"
    }

    fn check(
        &self,
        event: &StoredEvent,
        _store: &EventStore,
    ) -> Result<Option<Notification>, EvaluatorError> {
        if !event.is(Area::TopSecret, Action::Read) {
            return Ok(None);
        }

        let notification = Notification::create(
            event.user_id().clone(),
            LimitType::TopSecretRead,
            EventMetadata::for_event(event),
            format!("User {} accessed top-secret resource", event.user_id()),
        )?;
        Ok(Some(notification))
    }
}
