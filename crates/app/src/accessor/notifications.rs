use opsdesk_core::types::Notification;
use opsdesk_core::validate::ValidationError;
use opsdesk_core::{AccessError, UserContext};
use opsdesk_storage::Database;

use super::{backend, observed, stamp, Clock};

const ENTITY: &str = "notification";
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Read side of the notification sink. Callers only ever see their own rows.
#[derive(Clone)]
pub struct NotificationAccessor {
    database: Database,
    clock: Clock,
}

impl NotificationAccessor {
    pub fn new(database: Database, clock: Clock) -> Self {
        Self { database, clock }
    }

    pub async fn list(
        &self,
        ctx: &UserContext,
        unread_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>, AccessError> {
        observed(ENTITY, "list", self.list_own(ctx, unread_only, limit)).await
    }

    pub async fn mark_read(&self, ctx: &UserContext, id: &str) -> Result<(), AccessError> {
        observed(ENTITY, "update", self.mark_own(ctx, id)).await
    }

    async fn list_own(
        &self,
        ctx: &UserContext,
        unread_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>, AccessError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(
                ValidationError::new("limit", format!("must be between 1 and {MAX_LIMIT}")).into(),
            );
        }
        self.database
            .notifications()
            .list_for_user(&ctx.user_id, unread_only, limit)
            .await
            .map_err(backend)
    }

    async fn mark_own(&self, ctx: &UserContext, id: &str) -> Result<(), AccessError> {
        let found = self
            .database
            .notifications()
            .mark_read(&ctx.user_id, id, stamp(&self.clock))
            .await
            .map_err(backend)?;
        if found {
            Ok(())
        } else {
            Err(AccessError::not_found(ENTITY, id))
        }
    }
}
