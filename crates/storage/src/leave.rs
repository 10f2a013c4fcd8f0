use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use opsdesk_core::access::LeaveScope;
use opsdesk_core::filter::LeaveFilter;
use opsdesk_core::types::{LeaveRequest, LeaveSortField, LeaveStatus, LeaveType, SortDirection};

use crate::{to_rfc3339, RecordError};

const LEAVE_COLUMNS: &str = "id, employee_id, department_id, leave_type, start_date, end_date, \
     reason, status, decided_by, created_at, updated_at";

/// Repository for the `leave_requests` table.
#[derive(Clone)]
pub struct LeaveRepository {
    pool: SqlitePool,
}

impl LeaveRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, request: &LeaveRequest) -> Result<(), RecordError> {
        sqlx::query(
            "INSERT INTO leave_requests \
             (id, employee_id, department_id, leave_type, start_date, end_date, reason, \
              status, decided_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.employee_id)
        .bind(&request.department_id)
        .bind(request.leave_type.as_str())
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(&request.decided_by)
        .bind(to_rfc3339(request.created_at))
        .bind(to_rfc3339(request.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch(&self, id: &str) -> Result<Option<LeaveRequest>, RecordError> {
        let row = sqlx::query_as::<_, LeaveRow>(&format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LeaveRow::into_domain).transpose()
    }

    /// Lists live requests visible under `scope` that match `filter`.
    pub async fn list(
        &self,
        filter: &LeaveFilter,
        scope: &LeaveScope,
    ) -> Result<Vec<LeaveRequest>, RecordError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE deleted_at IS NULL"
        ));

        match scope {
            LeaveScope::All => {}
            LeaveScope::Department(department) => {
                query.push(" AND department_id = ").push_bind(department.clone());
            }
            LeaveScope::Own(user_id) => {
                query.push(" AND employee_id = ").push_bind(user_id.clone());
            }
        }

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if !filter.leave_types.is_empty() {
            query.push(" AND leave_type IN (");
            let mut separated = query.separated(", ");
            for leave_type in &filter.leave_types {
                separated.push_bind(leave_type.as_str());
            }
            separated.push_unseparated(")");
        }
        if !filter.employees.is_empty() {
            query.push(" AND employee_id IN (");
            let mut separated = query.separated(", ");
            for employee in &filter.employees {
                separated.push_bind(employee.clone());
            }
            separated.push_unseparated(")");
        }
        if let Some(from) = filter.from {
            query.push(" AND end_date >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND start_date <= ").push_bind(to);
        }

        match filter.sort {
            Some(sort) => {
                query.push(" ORDER BY ");
                query.push(sort_expression(sort.field));
                query.push(match sort.direction {
                    SortDirection::Asc => " ASC",
                    SortDirection::Desc => " DESC",
                });
                query.push(", seq ASC");
            }
            None => {
                query.push(" ORDER BY seq ASC");
            }
        }

        let rows = query.build_query_as::<LeaveRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(LeaveRow::into_domain).collect()
    }

    /// Writes every mutable field back. Returns `false` when the row is gone.
    pub async fn update(&self, request: &LeaveRequest) -> Result<bool, RecordError> {
        let result = sqlx::query(
            "UPDATE leave_requests \
             SET leave_type = ?, start_date = ?, end_date = ?, reason = ?, status = ?, \
                 decided_by = ?, updated_at = ? \
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(request.leave_type.as_str())
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(&request.decided_by)
        .bind(to_rfc3339(request.updated_at))
        .bind(&request.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, RecordError> {
        let result = sqlx::query(
            "UPDATE leave_requests SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(to_rfc3339(deleted_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn sort_expression(field: LeaveSortField) -> &'static str {
    match field {
        LeaveSortField::StartDate => "start_date",
        LeaveSortField::EndDate => "end_date",
        LeaveSortField::Status => {
            "CASE status WHEN 'pending' THEN 0 WHEN 'approved' THEN 1 \
             WHEN 'rejected' THEN 2 ELSE 3 END"
        }
        LeaveSortField::LeaveType => "leave_type",
        LeaveSortField::CreatedAt => "created_at",
        LeaveSortField::UpdatedAt => "updated_at",
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LeaveRow {
    id: String,
    employee_id: String,
    department_id: Option<String>,
    leave_type: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: Option<String>,
    status: String,
    decided_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LeaveRow {
    fn into_domain(self) -> Result<LeaveRequest, RecordError> {
        let leave_type = self.leave_type.parse::<LeaveType>().map_err(|err| {
            RecordError::Corrupt(format!("leave request {}: {err}", self.id))
        })?;
        let status = self.status.parse::<LeaveStatus>().map_err(|err| {
            RecordError::Corrupt(format!("leave request {}: {err}", self.id))
        })?;

        Ok(LeaveRequest {
            id: self.id,
            employee_id: self.employee_id,
            department_id: self.department_id,
            leave_type,
            start_date: self.start_date,
            end_date: self.end_date,
            reason: self.reason,
            status,
            decided_by: self.decided_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
