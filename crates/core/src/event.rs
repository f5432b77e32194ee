//! Normalized user-activity events.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How far ahead of the processing clock an event timestamp may be.
pub const FUTURE_SKEW_TOLERANCE_SECS: i64 = 120;

const USER_ID_MAX_LEN: usize = 255;

// ── UserId ────────────────────────────────────────────────────

/// Opaque user identifier: 1..=255 chars of `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and build a user id. Surrounding whitespace is trimmed first.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if trimmed.chars().count() > USER_ID_MAX_LEN {
            return Err(ValidationError::UserIdTooLong {
                max: USER_ID_MAX_LEN,
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::UserIdCharset);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        UserId::new(&raw).map_err(serde::de::Error::custom)
    }
}

// ── Area / Action ─────────────────────────────────────────────

/// Coarse resource category an event touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Area {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "payment")]
    Payment,
    #[serde(rename = "top-secret")]
    TopSecret,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::User, Area::Payment, Area::TopSecret];

    pub fn as_str(&self) -> &'static str {
        match self {
            Area::User => "user",
            Area::Payment => "payment",
            Area::TopSecret => "top-secret",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Area {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Area::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidArea(s.to_string()))
    }
}

/// Verb performed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidAction(s.to_string()))
    }
}

// ── Event ─────────────────────────────────────────────────────

/// A validated activity event. Any area/action combination is legal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    user_id: UserId,
    area: Area,
    action: Action,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event, checking the timestamp against the current clock.
    pub fn new(
        user_id: UserId,
        area: Area,
        action: Action,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::new_at(user_id, area, action, timestamp, Utc::now())
    }

    /// Build an event, checking the timestamp against an explicit processing time.
    pub fn new_at(
        user_id: UserId,
        area: Area,
        action: Action,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if timestamp > now + Duration::seconds(FUTURE_SKEW_TOLERANCE_SECS) {
            return Err(ValidationError::FutureTimestamp(timestamp.to_rfc3339()));
        }
        Ok(Self {
            user_id,
            area,
            action,
            timestamp,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
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

    /// True when this event is `area.action`.
    pub fn is(&self, area: Area, action: Action) -> bool {
        self.area == area && self.action == action
    }

    /// The `area.action` scope string this event was parsed from.
    pub fn scope(&self) -> String {
        format!("{}.{}", self.area, self.action)
    }
}

// ── Stored events ─────────────────────────────────────────────

/// Locally generated sequence id assigned when an event enters the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn from_sequence(seq: u64) -> Self {
        Self(format!("evt_{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event plus the id the store gave it. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredEvent {
    pub id: EventId,
    pub event: Event,
}

impl std::ops::Deref for StoredEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn user_id_is_trimmed() {
        let id = UserId::new("  user_123-abc ").unwrap();
        assert_eq!(id.as_str(), "user_123-abc");
    }

    #[test]
    fn user_id_rejects_empty_and_blank() {
        assert_eq!(UserId::new(""), Err(ValidationError::EmptyUserId));
        assert_eq!(UserId::new("   "), Err(ValidationError::EmptyUserId));
    }

    #[test]
    fn user_id_length_limit() {
        assert!(UserId::new(&"a".repeat(255)).is_ok());
        assert_eq!(
            UserId::new(&"a".repeat(256)),
            Err(ValidationError::UserIdTooLong { max: 255 })
        );
    }

    #[test]
    fn user_id_rejects_special_characters() {
        for bad in ["user@example", "user.name", "user name", "user#1", "üser"] {
            assert_eq!(UserId::new(bad), Err(ValidationError::UserIdCharset), "{bad}");
        }
    }

    #[test]
    fn user_id_deserialize_validates() {
        let ok: UserId = serde_json::from_str(r#""42""#).unwrap();
        assert_eq!(ok.as_str(), "42");
        assert!(serde_json::from_str::<UserId>(r#""a b""#).is_err());
    }

    #[test]
    fn area_and_action_parse() {
        assert_eq!("top-secret".parse::<Area>().unwrap(), Area::TopSecret);
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert!(matches!(
            "admin".parse::<Area>(),
            Err(ValidationError::InvalidArea(a)) if a == "admin"
        ));
        assert!(matches!(
            "execute".parse::<Action>(),
            Err(ValidationError::InvalidAction(a)) if a == "execute"
        ));
    }

    #[test]
    fn area_serializes_with_hyphen() {
        assert_eq!(serde_json::to_string(&Area::TopSecret).unwrap(), r#""top-secret""#);
        assert_eq!(serde_json::to_string(&Action::Update).unwrap(), r#""update""#);
    }

    #[test]
    fn event_accepts_timestamp_within_skew() {
        let now = ts(0);
        let user = UserId::new("7").unwrap();
        let event = Event::new_at(user, Area::User, Action::Read, ts(120), now).unwrap();
        assert_eq!(event.timestamp(), ts(120));
        assert_eq!(event.scope(), "user.read");
    }

    #[test]
    fn event_rejects_timestamp_beyond_skew() {
        let now = ts(0);
        let user = UserId::new("7").unwrap();
        let err = Event::new_at(user, Area::User, Action::Read, ts(121), now).unwrap_err();
        assert!(matches!(err, ValidationError::FutureTimestamp(_)));
    }

    #[test]
    fn event_allows_any_area_action_pair() {
        let user = UserId::new("7").unwrap();
        for area in Area::ALL {
            for action in Action::ALL {
                let event = Event::new_at(user.clone(), area, action, ts(0), ts(0)).unwrap();
                assert!(event.is(area, action));
            }
        }
    }

    #[test]
    fn stored_event_derefs_to_event() {
        let user = UserId::new("7").unwrap();
        let stored = StoredEvent {
            id: EventId::from_sequence(3),
            event: Event::new_at(user, Area::Payment, Action::Create, ts(0), ts(0)).unwrap(),
        };
        assert_eq!(stored.id.as_str(), "evt_3");
        assert_eq!(stored.area(), Area::Payment);
    }
}
