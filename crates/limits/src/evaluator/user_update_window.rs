use chrono::Duration;

use monitor_core::{Action, Area, EventMetadata, LimitType, Notification, StoredEvent};

use super::{EvaluatorError, LimitEvaluator};
use crate::store::EventStore;

/// Fires when a user performs at least `required` user updates inside a
/// trailing window ending at the triggering event's timestamp.
///
/// The window start is inclusive. Timestamps, not arrival times, decide
/// membership, so replaying history gives the same answers.
pub struct UserUpdateWindowEvaluator {
    window: Duration,
    required: usize,
}

impl UserUpdateWindowEvaluator {
    pub fn new(window: Duration, required: usize) -> Self {
        Self {
            window,
            required: required.max(1),
        }
    }
}

/// Human form of the window for messages: `1 minute`, `5 minutes`, `90 seconds`.
fn describe_window(window: Duration) -> String {
    let secs = window.num_seconds();
    if secs > 0 && secs % 60 == 0 {
        match secs / 60 {
            1 => "1 minute".to_string(),
            n => format!("{n} minutes"),
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{secs} seconds")
    }
}

impl LimitEvaluator for UserUpdateWindowEvaluator {
    fn name(&self) -> &str {
        "UserUpdateWindowChecker"
    }

    fn check(
        &self,
        event: &StoredEvent,
        store: &EventStore,
    ) -> Result<Option<Notification>, EvaluatorError> {
        if !event.is(Area::User, Action::Update) {
            return Ok(None);
        }

        let count = store
            .in_window(event.user_id(), self.window, Some(event.timestamp()))
            .iter()
            .filter(|e| e.is(Area::User, Action::Update))
            .count();

        if count < self.required {
            return Ok(None);
        }

        let notification = Notification::create(
            event.user_id().clone(),
            LimitType::TwoUserUpdatesInOneMinute,
            EventMetadata::for_event(event),
            format!(
                "User {} updated {} users within {}",
                event.user_id(),
                count,
                describe_window(self.window)
            ),
        )?;
        Ok(Some(notification))
    }
}
