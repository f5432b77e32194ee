//! Read access to persisted notifications.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use monitor_core::{LimitType, Notification, UserId};
use monitor_limits::NotificationFilters;

use crate::state::AppState;

use super::{bad_request, internal_error, ApiResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub user_id: Option<String>,
    pub limit_type: Option<String>,
}

impl NotificationQuery {
    /// Blank parameters are treated as absent.
    fn into_filters(self) -> Result<NotificationFilters, String> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let user_id = non_blank(self.user_id)
            .map(|raw| UserId::new(&raw).map_err(|e| format!("invalid userId: {e}")))
            .transpose()?;
        let limit_type = non_blank(self.limit_type)
            .map(|raw| {
                raw.trim()
                    .parse::<LimitType>()
                    .map_err(|e| format!("invalid limitType: {e}"))
            })
            .transpose()?;

        Ok(NotificationFilters {
            user_id,
            limit_type,
        })
    }
}

/// List notifications, newest first, optionally filtered by user and limit type.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let filters = query.into_filters().map_err(bad_request)?;

    let found = state.sink.find(&filters).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query notifications");
        internal_error(e)
    })?;

    Ok(Json(found))
}
