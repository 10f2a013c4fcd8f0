use opsdesk_core::access::{
    ensure_can_delete_leave, ensure_can_edit_leave, ensure_can_file_leave_for,
    ensure_can_set_leave_status, LeaveScope,
};
use opsdesk_core::filter::LeaveFilter;
use opsdesk_core::notice::Notices;
use opsdesk_core::types::{LeaveRequest, LeaveStatus, ReferenceKind};
use opsdesk_core::validate::{check_leave_range, LeaveForm, LeavePatchForm};
use opsdesk_core::{AccessError, UserContext};
use opsdesk_storage::Database;
use tracing::info;
use uuid::Uuid;

use super::{backend, observed, stamp, Clock, ReferenceAccessor};
use crate::notify::Notifier;

const ENTITY: &str = "leave_request";

/// Accessor for leave requests. Requests outside the caller's scope read as missing.
#[derive(Clone)]
pub struct LeaveAccessor {
    database: Database,
    references: ReferenceAccessor,
    notifier: Notifier,
    clock: Clock,
}

impl LeaveAccessor {
    pub fn new(
        database: Database,
        references: ReferenceAccessor,
        notifier: Notifier,
        clock: Clock,
    ) -> Self {
        Self {
            database,
            references,
            notifier,
            clock,
        }
    }

    pub async fn list(
        &self,
        ctx: &UserContext,
        filter: &LeaveFilter,
    ) -> Result<Vec<LeaveRequest>, AccessError> {
        observed(ENTITY, "list", async {
            self.database
                .leave_requests()
                .list(filter, &LeaveScope::for_user(ctx))
                .await
                .map_err(backend)
        })
        .await
    }

    pub async fn get_by_id(
        &self,
        ctx: &UserContext,
        id: &str,
    ) -> Result<LeaveRequest, AccessError> {
        observed(ENTITY, "get", self.fetch_visible(ctx, id)).await
    }

    pub async fn create(
        &self,
        ctx: &UserContext,
        form: LeaveForm,
    ) -> Result<LeaveRequest, AccessError> {
        observed(ENTITY, "create", self.insert_request(ctx, form)).await
    }

    pub async fn update(
        &self,
        ctx: &UserContext,
        id: &str,
        form: LeavePatchForm,
    ) -> Result<LeaveRequest, AccessError> {
        observed(ENTITY, "update", self.update_request(ctx, id, form)).await
    }

    pub async fn soft_delete(&self, ctx: &UserContext, id: &str) -> Result<(), AccessError> {
        observed(ENTITY, "delete", self.delete_request(ctx, id)).await
    }

    async fn fetch_visible(&self, ctx: &UserContext, id: &str) -> Result<LeaveRequest, AccessError> {
        self.database
            .leave_requests()
            .fetch(id)
            .await
            .map_err(backend)?
            .filter(|request| LeaveScope::for_user(ctx).permits(request))
            .ok_or_else(|| AccessError::not_found(ENTITY, id))
    }

    async fn insert_request(
        &self,
        ctx: &UserContext,
        form: LeaveForm,
    ) -> Result<LeaveRequest, AccessError> {
        let input = form.validate()?;
        self.references.ensure_caller(ctx).await?;

        let employee_id = match input.employee {
            Some(employee) => {
                self.references
                    .resolve(ReferenceKind::Person, "employee", employee)
                    .await?
            }
            None => ctx.user_id.clone(),
        };
        ensure_can_file_leave_for(ctx, &employee_id)?;

        let department_id = match input.department {
            Some(department) => Some(
                self.references
                    .resolve(ReferenceKind::Department, "department", department)
                    .await?,
            ),
            None => match ctx.department_id.as_deref() {
                Some(id) => self.references.existing(ReferenceKind::Department, id).await?,
                None => None,
            },
        };

        let now = stamp(&self.clock);
        let request = LeaveRequest {
            id: Uuid::new_v4().to_string(),
            employee_id,
            department_id,
            leave_type: input.leave_type,
            start_date: input.start_date,
            end_date: input.end_date,
            reason: input.reason,
            status: LeaveStatus::Pending,
            decided_by: None,
            created_at: now,
            updated_at: now,
        };
        self.database
            .leave_requests()
            .insert(&request)
            .await
            .map_err(backend)?;

        info!(
            stage = "accessor",
            entity = ENTITY,
            id = %request.id,
            employee_id = %request.employee_id,
            days = request.day_count(),
            "leave request filed"
        );
        Ok(request)
    }

    async fn update_request(
        &self,
        ctx: &UserContext,
        id: &str,
        form: LeavePatchForm,
    ) -> Result<LeaveRequest, AccessError> {
        let changes = form.validate()?;
        let before = self.fetch_visible(ctx, id).await?;

        if changes.touches_details() {
            ensure_can_edit_leave(ctx, &before)?;
        }
        let mut after = before.clone();
        if let Some(status) = changes.status {
            if status != before.status {
                ensure_can_set_leave_status(ctx, &before, status)?;
                after.status = status;
                after.decided_by = if status.is_decision() {
                    Some(ctx.user_id.clone())
                } else if status == LeaveStatus::Pending {
                    None
                } else {
                    before.decided_by.clone()
                };
            }
        }
        if let Some(leave_type) = changes.leave_type {
            after.leave_type = leave_type;
        }
        if let Some(start_date) = changes.start_date {
            after.start_date = start_date;
        }
        if let Some(end_date) = changes.end_date {
            after.end_date = end_date;
        }
        if let Some(reason) = changes.reason {
            after.reason = reason;
        }
        check_leave_range(after.start_date, after.end_date)?;
        after.updated_at = stamp(&self.clock);

        let written = self
            .database
            .leave_requests()
            .update(&after)
            .await
            .map_err(backend)?;
        if !written {
            return Err(AccessError::not_found(ENTITY, id));
        }

        self.notifier
            .send(Notices::leave_updated(&before, &after).into_iter().collect())
            .await;
        Ok(after)
    }

    async fn delete_request(&self, ctx: &UserContext, id: &str) -> Result<(), AccessError> {
        ensure_can_delete_leave(ctx)?;
        let deleted = self
            .database
            .leave_requests()
            .soft_delete(id, stamp(&self.clock))
            .await
            .map_err(backend)?;
        if deleted {
            Ok(())
        } else {
            Err(AccessError::not_found(ENTITY, id))
        }
    }
}
