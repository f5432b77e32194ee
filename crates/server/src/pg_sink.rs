//! PostgreSQL-backed notification sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use monitor_core::{EventMetadata, LimitType, Notification, NotificationParts, UserId};
use monitor_limits::{NotificationFilters, NotificationSink, SinkError};

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    limit_type: String,
    event_metadata: serde_json::Value,
    message: String,
    created_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_notification(self) -> Result<Notification, SinkError> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            SinkError::Corrupt(format!("notification {}: {what}: {e}", self.id))
        };
        let user_id = UserId::new(&self.user_id).map_err(|e| corrupt("user_id", &e))?;
        let limit_type = self
            .limit_type
            .parse::<LimitType>()
            .map_err(|e| corrupt("limit_type", &e))?;
        let event_metadata = serde_json::from_value::<EventMetadata>(self.event_metadata.clone())
            .map_err(|e| corrupt("event_metadata", &e))?;

        Ok(Notification::reconstitute(NotificationParts {
            id: self.id.into(),
            user_id,
            limit_type,
            event_metadata,
            message: self.message,
            created_at: self.created_at,
        }))
    }
}

fn map_sqlx_err(e: sqlx::Error) -> SinkError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SinkError::Unavailable(e.to_string())
        }
        other => SinkError::Backend(other.to_string()),
    }
}

pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn save(&self, notification: &Notification) -> Result<(), SinkError> {
        let metadata = serde_json::to_value(notification.event_metadata())
            .map_err(|e| SinkError::Backend(format!("event_metadata encode failed: {e}")))?;

        sqlx::query(
            "INSERT INTO notifications (id, user_id, limit_type, event_metadata, message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                limit_type = EXCLUDED.limit_type,
                event_metadata = EXCLUDED.event_metadata,
                message = EXCLUDED.message,
                created_at = EXCLUDED.created_at",
        )
        .bind(notification.id().as_uuid())
        .bind(notification.user_id().as_str())
        .bind(notification.limit_type().as_str())
        .bind(&metadata)
        .bind(notification.message())
        .bind(notification.created_at())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn find(&self, filters: &NotificationFilters) -> Result<Vec<Notification>, SinkError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, limit_type, event_metadata, message, created_at
             FROM notifications
             WHERE ($1::text IS NULL OR user_id = $1)
               AND ($2::text IS NULL OR limit_type = $2)
             ORDER BY created_at DESC",
        )
        .bind(filters.user_id.as_ref().map(|u| u.as_str().to_string()))
        .bind(filters.limit_type.map(|lt| lt.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter().map(NotificationRow::into_notification).collect()
    }

    async fn ping(&self) -> Result<(), SinkError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(limit_type: &str, user_id: &str) -> NotificationRow {
        NotificationRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            limit_type: limit_type.to_string(),
            event_metadata: json!({
                "area": "top-secret",
                "action": "read",
                "timestamp": "2024-03-01T10:00:00Z",
                "eventId": "evt_9"
            }),
            message: "User 42 accessed top-secret resource".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 1).unwrap(),
        }
    }

    #[test]
    fn row_converts_to_notification() {
        let r = row("TOP_SECRET_READ", "42");
        let id = r.id;
        let n = r.into_notification().unwrap();

        assert_eq!(n.id().as_uuid(), id);
        assert_eq!(n.user_id().as_str(), "42");
        assert_eq!(n.limit_type(), LimitType::TopSecretRead);
        assert_eq!(n.event_metadata().event_id(), Some("evt_9"));
        assert_eq!(n.message(), "User 42 accessed top-secret resource");
    }

    #[test]
    fn unknown_limit_type_is_corrupt() {
        let err = row("FIVE_LOGINS", "42").into_notification().unwrap_err();
        assert!(matches!(err, SinkError::Corrupt(msg) if msg.contains("limit_type")));
    }

    #[test]
    fn invalid_user_id_is_corrupt() {
        let err = row("TOP_SECRET_READ", "").into_notification().unwrap_err();
        assert!(matches!(err, SinkError::Corrupt(msg) if msg.contains("user_id")));
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(map_sqlx_err(sqlx::Error::PoolTimedOut), SinkError::Unavailable(_)));
        assert!(matches!(map_sqlx_err(sqlx::Error::RowNotFound), SinkError::Backend(_)));
    }
}
