//! Parse queue message bodies into normalized [`Event`]s.
//!
//! Inbound shape: `{ "userId": 42, "scope": "user.delete", "date": "<ISO-8601>" }`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use monitor_core::{Action, Area, Event, UserId};

use crate::consumer::QueueMessage;
use crate::error::{ParseError, QueueError};

/// Accepted `date` formats, tried after RFC 3339. Zone-less values are UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn parse_scope(scope: &str) -> Result<(Area, Action), ParseError> {
    let (area, action) = scope
        .split_once('.')
        .filter(|(area, action)| !area.is_empty() && !action.is_empty() && !action.contains('.'))
        .ok_or_else(|| ParseError::InvalidScopeFormat(scope.to_string()))?;

    let area = area
        .parse::<Area>()
        .map_err(|_| ParseError::InvalidArea(area.to_string()))?;
    let action = action
        .parse::<Action>()
        .map_err(|_| ParseError::InvalidAction(action.to_string()))?;
    Ok((area, action))
}

/// Normalize one inbound JSON value into an [`Event`].
pub fn parse_user_event(value: &Value) -> Result<Event, ParseError> {
    let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

    let user_id = obj
        .get("userId")
        .and_then(Value::as_u64)
        .filter(|id| *id > 0)
        .ok_or(ParseError::InvalidUserId)?;

    let scope = obj
        .get("scope")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::InvalidScope)?;

    let date = obj
        .get("date")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::InvalidDate)?;

    let (area, action) = parse_scope(scope)?;
    let timestamp =
        parse_date(date).ok_or_else(|| ParseError::InvalidDateFormat(date.to_string()))?;

    let user_id = UserId::new(&user_id.to_string())?;
    Ok(Event::new(user_id, area, action, timestamp)?)
}

/// Parse a single queue message into an [`Event`].
pub fn parse_message(msg: &QueueMessage) -> Result<Event, QueueError> {
    let wrap = |source: ParseError| QueueError::Parse {
        message_id: msg.id.clone(),
        source,
    };

    if msg.body.trim().is_empty() {
        return Err(wrap(ParseError::Empty));
    }

    let json: Value =
        serde_json::from_str(&msg.body).map_err(|e| wrap(ParseError::InvalidJson(e.to_string())))?;
    let event = parse_user_event(&json).map_err(wrap)?;

    if let Some(key) = msg.partition_key.as_deref() {
        if key != event.user_id().as_str() {
            warn!(
                message_id = %msg.id,
                partition_key = key,
                user_id = %event.user_id(),
                "Message partition key differs from userId; per-user ordering is not guaranteed"
            );
        }
    }

    Ok(event)
}

/// Parse a batch of messages, separating successes from failures.
///
/// Returns `(events, errors)` with events in input order. Bad messages never
/// block good ones.
pub fn parse_batch(messages: &[QueueMessage]) -> (Vec<Event>, Vec<(String, QueueError)>) {
    let mut events = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for msg in messages {
        match parse_message(msg) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Failed to parse queue message");
                errors.push((msg.id.clone(), e));
            }
        }
    }

    (events, errors)
}
