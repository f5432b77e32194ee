//! Limit-violation notifications and their value objects.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::event::{Action, Area, StoredEvent, UserId, FUTURE_SKEW_TOLERANCE_SECS};

/// Upper bound on a notification message, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

// ── LimitType ─────────────────────────────────────────────────

/// The rule a notification was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    #[serde(rename = "3_USER_DELETIONS")]
    ThreeUserDeletions,
    #[serde(rename = "TOP_SECRET_READ")]
    TopSecretRead,
    #[serde(rename = "2_USER_UPDATED_IN_1MINUTE")]
    TwoUserUpdatesInOneMinute,
}

impl LimitType {
    pub const ALL: [LimitType; 3] = [
        LimitType::ThreeUserDeletions,
        LimitType::TopSecretRead,
        LimitType::TwoUserUpdatesInOneMinute,
    ];

    /// Wire name, as stored and as accepted by the query API.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::ThreeUserDeletions => "3_USER_DELETIONS",
            LimitType::TopSecretRead => "TOP_SECRET_READ",
            LimitType::TwoUserUpdatesInOneMinute => "2_USER_UPDATED_IN_1MINUTE",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LimitType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownLimitType(s.to_string()))
    }
}

// ── NotificationId ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the canonical hyphenated form (`8-4-4-4-12` hex, any case).
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let canonical = raw.len() == 36
            && raw.char_indices().all(|(i, c)| match i {
                8 | 13 | 18 | 23 => c == '-',
                _ => c.is_ascii_hexdigit(),
            });
        if !canonical {
            return Err(ValidationError::InvalidNotificationId(raw.to_string()));
        }
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ValidationError::InvalidNotificationId(raw.to_string()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for NotificationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NotificationId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ── EventMetadata ─────────────────────────────────────────────

/// Snapshot of the event that triggered a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEventMetadata")]
pub struct EventMetadata {
    area: Area,
    action: Action,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventMetadata {
    area: Area,
    action: Action,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    event_id: Option<String>,
}

impl TryFrom<RawEventMetadata> for EventMetadata {
    type Error = ValidationError;

    fn try_from(raw: RawEventMetadata) -> Result<Self, Self::Error> {
        EventMetadata::new(raw.area, raw.action, raw.timestamp, raw.event_id)
    }
}

impl EventMetadata {
    pub fn new(
        area: Area,
        action: Action,
        timestamp: DateTime<Utc>,
        event_id: Option<String>,
    ) -> Result<Self, ValidationError> {
        if timestamp > Utc::now() + Duration::seconds(FUTURE_SKEW_TOLERANCE_SECS) {
            return Err(ValidationError::FutureTimestamp(timestamp.to_rfc3339()));
        }
        if event_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ValidationError::EmptyEventId);
        }
        Ok(Self {
            area,
            action,
            timestamp,
            event_id,
        })
    }

    /// Snapshot a stored event. The event was validated on the way in.
    pub fn for_event(stored: &StoredEvent) -> Self {
        Self {
            area: stored.area(),
            action: stored.action(),
            timestamp: stored.timestamp(),
            event_id: Some(stored.id.to_string()),
        }
    }

    pub fn area(&self) -> Area {
        self.area
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// e.g. `"delete on user"`.
    pub fn description(&self) -> String {
        format!("{} on {}", self.action, self.area)
    }
}

// ── Notification ──────────────────────────────────────────────

/// Persisted shape of a notification, used to rebuild one without
/// regenerating its id or creation time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParts {
    pub id: NotificationId,
    pub user_id: UserId,
    pub limit_type: LimitType,
    pub event_metadata: EventMetadata,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A detected limit violation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "NotificationParts")]
pub struct Notification {
    id: NotificationId,
    user_id: UserId,
    limit_type: LimitType,
    event_metadata: EventMetadata,
    message: String,
    created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new notification with a fresh id and `created_at = now`.
    ///
    /// The message must be non-blank and at most [`MAX_MESSAGE_LEN`] characters;
    /// it is never truncated.
    pub fn create(
        user_id: UserId,
        limit_type: LimitType,
        event_metadata: EventMetadata,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let message = message.into();
        validate_message(&message)?;
        Ok(Self {
            id: NotificationId::generate(),
            user_id,
            limit_type,
            event_metadata,
            message,
            created_at: Utc::now(),
        })
    }

    /// Rebuild a persisted notification. Shape is guaranteed by the typed
    /// parts; the message rule is not re-applied.
    pub fn reconstitute(parts: NotificationParts) -> Self {
        Self {
            id: parts.id,
            user_id: parts.user_id,
            limit_type: parts.limit_type,
            event_metadata: parts.event_metadata,
            message: parts.message,
            created_at: parts.created_at,
        }
    }

    pub fn id(&self) -> NotificationId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    pub fn event_metadata(&self) -> &EventMetadata {
        &self.event_metadata
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl From<NotificationParts> for Notification {
    fn from(parts: NotificationParts) -> Self {
        Notification::reconstitute(parts)
    }
}

fn validate_message(message: &str) -> Result<(), ValidationError> {
    if message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ValidationError::MessageTooLong {
            max: MAX_MESSAGE_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventId};

    fn metadata() -> EventMetadata {
        EventMetadata::new(
            Area::User,
            Action::Delete,
            Utc::now() - Duration::minutes(5),
            None,
        )
        .unwrap()
    }

    fn user() -> UserId {
        UserId::new("83").unwrap()
    }

    #[test]
    fn limit_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&LimitType::ThreeUserDeletions).unwrap(),
            r#""3_USER_DELETIONS""#
        );
        assert_eq!(
            "2_USER_UPDATED_IN_1MINUTE".parse::<LimitType>().unwrap(),
            LimitType::TwoUserUpdatesInOneMinute
        );
        assert!("THREE_USER_DELETIONS".parse::<LimitType>().is_err());
    }

    #[test]
    fn notification_id_parse() {
        let id = NotificationId::generate();
        assert_eq!(NotificationId::parse(&id.to_string()).unwrap(), id);
        assert!(NotificationId::parse("550E8400-E29B-41D4-A716-446655440000").is_ok());
    }

    #[test]
    fn notification_id_rejects_non_canonical() {
        for bad in [
            "",
            "not-a-uuid",
            "550e8400e29b41d4a716446655440000",
            "{550e8400-e29b-41d4-a716-446655440000}",
            "550e8400-e29b-41d4-a716-44665544000g",
        ] {
            assert!(NotificationId::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = NotificationId::generate();
        let b = NotificationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn event_metadata_rejects_blank_event_id() {
        let err = EventMetadata::new(Area::User, Action::Read, Utc::now(), Some("  ".into()))
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyEventId);
    }

    #[test]
    fn event_metadata_rejects_future_timestamp() {
        let err = EventMetadata::new(
            Area::User,
            Action::Read,
            Utc::now() + Duration::minutes(3),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::FutureTimestamp(_)));
    }

    #[test]
    fn event_metadata_for_stored_event() {
        let now = Utc::now();
        let stored = StoredEvent {
            id: EventId::from_sequence(9),
            event: Event::new_at(user(), Area::TopSecret, Action::Read, now, now).unwrap(),
        };
        let meta = EventMetadata::for_event(&stored);
        assert_eq!(meta.event_id(), Some("evt_9"));
        assert_eq!(meta.description(), "read on top-secret");
    }

    #[test]
    fn create_sets_id_and_created_at() {
        let before = Utc::now();
        let n = Notification::create(user(), LimitType::ThreeUserDeletions, metadata(), "hello")
            .unwrap();
        assert!(n.created_at() >= before);
        assert_eq!(n.message(), "hello");
        assert_eq!(n.user_id().as_str(), "83");
    }

    #[test]
    fn create_rejects_blank_message() {
        for msg in ["", "   ", "\n\t"] {
            let err = Notification::create(user(), LimitType::TopSecretRead, metadata(), msg)
                .unwrap_err();
            assert_eq!(err, ValidationError::EmptyMessage);
        }
    }

    #[test]
    fn create_enforces_message_length() {
        assert!(Notification::create(
            user(),
            LimitType::TopSecretRead,
            metadata(),
            "x".repeat(1000)
        )
        .is_ok());
        let err = Notification::create(
            user(),
            LimitType::TopSecretRead,
            metadata(),
            "x".repeat(1001),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::MessageTooLong { max: 1000 });
    }

    #[test]
    fn json_shape_is_camel_case() {
        let n = Notification::create(user(), LimitType::TopSecretRead, metadata(), "msg").unwrap();
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["userId"], "83");
        assert_eq!(json["limitType"], "TOP_SECRET_READ");
        assert_eq!(json["eventMetadata"]["area"], "user");
        assert!(json["eventMetadata"].get("eventId").is_none());
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn deserialize_reconstitutes_without_regenerating() {
        let n = Notification::create(user(), LimitType::TopSecretRead, metadata(), "msg").unwrap();
        let json = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn deserialize_rejects_bad_shape() {
        let json = r#"{
            "id": "not-a-uuid",
            "userId": "83",
            "limitType": "TOP_SECRET_READ",
            "eventMetadata": {"area": "user", "action": "read", "timestamp": "2024-01-01T00:00:00Z"},
            "message": "m",
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Notification>(json).is_err());
    }
}
