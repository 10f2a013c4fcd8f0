use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use opsdesk_core::types::{Notification, NotificationKind};

use crate::{to_rfc3339, RecordError};

/// Repository for the per-user `notifications` table.
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, notification: &Notification) -> Result<(), RecordError> {
        let payload = serde_json::to_string(&notification.payload)?;
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload_json, created_at, read_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind.as_str())
        .bind(payload)
        .bind(to_rfc3339(notification.created_at))
        .bind(notification.read_at.map(to_rfc3339))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, RecordError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, user_id, kind, payload_json, created_at, read_at \
             FROM notifications \
             WHERE user_id = ? AND (? = 0 OR read_at IS NULL) \
             ORDER BY created_at DESC, rowid DESC \
             LIMIT ?",
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationRow::into_domain).collect()
    }

    /// Marks one of the user's notifications read. Returns `false` when it does not exist.
    ///
    /// Marking an already read notification keeps the original timestamp.
    pub async fn mark_read(
        &self,
        user_id: &str,
        id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<bool, RecordError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
        )
        .bind(to_rfc3339(read_at))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    payload_json: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification, RecordError> {
        let kind = self
            .kind
            .parse::<NotificationKind>()
            .map_err(|err| RecordError::Corrupt(format!("notification {}: {err}", self.id)))?;
        let payload = serde_json::from_str(&self.payload_json)?;
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            kind,
            payload,
            created_at: self.created_at,
            read_at: self.read_at,
        })
    }
}
