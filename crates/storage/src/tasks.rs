use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use opsdesk_core::filter::TaskFilter;
use opsdesk_core::types::{
    Board, Priority, SortDirection, TaskLevel, TaskNode, TaskSortField, TaskStatus,
};

use crate::{like_pattern, to_rfc3339, RecordError};

const TASK_COLUMNS: &str = "id, board, root_id, parent_id, level, name, description, status, \
     priority, project_id, assigned_to, department_id, due_date, created_at, updated_at";

/// Repository for the `tasks` table shared by both boards.
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a task row. `root_id` is the id of the level-0 task owning it.
    pub async fn insert(&self, task: &TaskNode, root_id: &str) -> Result<(), RecordError> {
        sqlx::query(
            "INSERT INTO tasks \
             (id, board, root_id, parent_id, level, name, description, status, priority, \
              project_id, assigned_to, department_id, due_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&task.id)
        .bind(task.board.as_str())
        .bind(root_id)
        .bind(&task.parent_id)
        .bind(i64::from(task.level.as_u8()))
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.project_id)
        .bind(&task.assigned_to)
        .bind(&task.department_id)
        .bind(task.due_date)
        .bind(to_rfc3339(task.created_at))
        .bind(to_rfc3339(task.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads a live task row without its subtasks.
    pub async fn fetch(&self, board: Board, id: &str) -> Result<Option<TaskRow>, RecordError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND board = ? AND deleted_at IS NULL"
        ))
        .bind(id)
        .bind(board.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Loads every live row of one tree in creation order.
    pub async fn fetch_tree(&self, board: Board, root_id: &str) -> Result<Vec<TaskRow>, RecordError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE root_id = ? AND board = ? AND deleted_at IS NULL \
             ORDER BY seq ASC"
        ))
        .bind(root_id)
        .bind(board.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Loads every live row of several trees in creation order.
    pub async fn fetch_trees(
        &self,
        board: Board,
        root_ids: &[String],
    ) -> Result<Vec<TaskRow>, RecordError> {
        if root_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL AND board = "
        ));
        query.push_bind(board.as_str());
        query.push(" AND root_id IN (");
        let mut separated = query.separated(", ");
        for root_id in root_ids {
            separated.push_bind(root_id.clone());
        }
        separated.push_unseparated(")");
        query.push(" ORDER BY seq ASC");

        let rows = query.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Lists live rows matching `filter`, flat.
    pub async fn list(&self, board: Board, filter: &TaskFilter) -> Result<Vec<TaskRow>, RecordError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted_at IS NULL AND board = "
        ));
        query.push_bind(board.as_str());

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        if !filter.priorities.is_empty() {
            query.push(" AND priority IN (");
            let mut separated = query.separated(", ");
            for priority in &filter.priorities {
                separated.push_bind(priority.as_str());
            }
            separated.push_unseparated(")");
        }
        if !filter.assignees.is_empty() {
            query.push(" AND assigned_to IN (");
            let mut separated = query.separated(", ");
            for assignee in &filter.assignees {
                separated.push_bind(assignee.clone());
            }
            separated.push_unseparated(")");
        }
        if !filter.levels.is_empty() {
            query.push(" AND level IN (");
            let mut separated = query.separated(", ");
            for level in &filter.levels {
                separated.push_bind(i64::from(level.as_u8()));
            }
            separated.push_unseparated(")");
        }
        if let Some(parent_id) = &filter.parent_id {
            query.push(" AND parent_id = ").push_bind(parent_id.clone());
        }
        if let Some(project_id) = &filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id.clone());
        }
        if let Some(from) = filter.due_from {
            query.push(" AND due_date >= ").push_bind(from);
        }
        if let Some(to) = filter.due_to {
            query.push(" AND due_date <= ").push_bind(to);
        }
        if let Some(term) = &filter.search {
            let pattern = like_pattern(term);
            query
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR IFNULL(description, '') LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
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

        let rows = query.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Writes the scalar fields of `task` back. Returns `false` when the row is gone.
    pub async fn update(&self, task: &TaskNode) -> Result<bool, RecordError> {
        let result = sqlx::query(
            "UPDATE tasks \
             SET name = ?, description = ?, status = ?, priority = ?, project_id = ?, \
                 assigned_to = ?, department_id = ?, due_date = ?, updated_at = ? \
             WHERE id = ? AND board = ? AND deleted_at IS NULL",
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.project_id)
        .bind(&task.assigned_to)
        .bind(&task.department_id)
        .bind(task.due_date)
        .bind(to_rfc3339(task.updated_at))
        .bind(&task.id)
        .bind(task.board.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks the listed rows deleted in one statement. Returns the number of rows marked.
    pub async fn soft_delete(
        &self,
        board: Board,
        ids: &[String],
        deleted_at: DateTime<Utc>,
    ) -> Result<u64, RecordError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE tasks SET deleted_at = ");
        query.push_bind(to_rfc3339(deleted_at));
        query.push(" WHERE deleted_at IS NULL AND board = ");
        query.push_bind(board.as_str());
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn sort_expression(field: TaskSortField) -> &'static str {
    match field {
        TaskSortField::Name => "name COLLATE NOCASE",
        TaskSortField::Status => {
            "CASE status WHEN 'not-started' THEN 0 WHEN 'in-progress' THEN 1 \
             WHEN 'in-review' THEN 2 WHEN 'completed' THEN 3 ELSE 4 END"
        }
        TaskSortField::Priority => {
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 ELSE 3 END"
        }
        TaskSortField::Level => "level",
        TaskSortField::DueDate => "due_date",
        TaskSortField::CreatedAt => "created_at",
        TaskSortField::UpdatedAt => "updated_at",
    }
}

/// Flat representation of a `tasks` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub board: String,
    pub root_id: String,
    pub parent_id: Option<String>,
    pub level: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub project_id: Option<String>,
    pub assigned_to: Option<String>,
    pub department_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    /// Converts the database row into a domain node with no subtasks attached.
    pub fn into_domain(self) -> Result<TaskNode, RecordError> {
        let corrupt = |field: &str, detail: String| {
            RecordError::Corrupt(format!("task {} has invalid {field}: {detail}", self.id))
        };
        let board = self
            .board
            .parse::<Board>()
            .map_err(|err| corrupt("board", err.to_string()))?;
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(|err| corrupt("status", err.to_string()))?;
        let priority = self
            .priority
            .parse::<Priority>()
            .map_err(|err| corrupt("priority", err.to_string()))?;
        let level = u8::try_from(self.level)
            .map_err(|err| err.to_string())
            .and_then(TaskLevel::try_from)
            .map_err(|detail| corrupt("level", detail))?;

        Ok(TaskNode {
            id: self.id,
            board,
            name: self.name,
            description: self.description,
            status,
            priority,
            level,
            parent_id: self.parent_id,
            project_id: self.project_id,
            assigned_to: self.assigned_to,
            department_id: self.department_id,
            due_date: self.due_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            subtasks: Vec::new(),
        })
    }
}
