use std::collections::HashMap;

use opsdesk_core::access::ensure_can_delete_task;
use opsdesk_core::filter::TaskFilter;
use opsdesk_core::notice::Notices;
use opsdesk_core::tree;
use opsdesk_core::types::{Board, ReferenceKind, TaskLevel, TaskNode, TaskUpdate};
use opsdesk_core::validate::{TaskForm, TaskPatchForm, ValidationError};
use opsdesk_core::{AccessError, UserContext};
use opsdesk_storage::{Database, TaskRow};
use tracing::info;
use uuid::Uuid;

use super::{backend, observed, stamp, Clock, ReferenceAccessor};
use crate::notify::Notifier;

const ENTITY: &str = "task";

/// Accessor for the task boards.
#[derive(Clone)]
pub struct TaskAccessor {
    database: Database,
    references: ReferenceAccessor,
    notifier: Notifier,
    clock: Clock,
}

impl TaskAccessor {
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

    /// Flat listing of every matching live task on `board`.
    pub async fn list(
        &self,
        _ctx: &UserContext,
        board: Board,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskNode>, AccessError> {
        observed(ENTITY, "list", self.list_nodes(board, filter)).await
    }

    /// Matching top-level tasks, each carrying its whole live subtree.
    pub async fn tree(
        &self,
        _ctx: &UserContext,
        board: Board,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskNode>, AccessError> {
        observed(ENTITY, "tree", self.list_trees(board, filter)).await
    }

    pub async fn get_by_id(
        &self,
        _ctx: &UserContext,
        board: Board,
        id: &str,
    ) -> Result<TaskNode, AccessError> {
        observed(ENTITY, "get", self.find_node(board, id)).await
    }

    pub async fn create(
        &self,
        ctx: &UserContext,
        board: Board,
        form: TaskForm,
    ) -> Result<TaskNode, AccessError> {
        observed(ENTITY, "create", self.insert_node(ctx, board, form)).await
    }

    pub async fn update(
        &self,
        ctx: &UserContext,
        board: Board,
        id: &str,
        form: TaskPatchForm,
    ) -> Result<TaskNode, AccessError> {
        observed(ENTITY, "update", self.update_node(ctx, board, id, form)).await
    }

    /// Marks the task and every live descendant deleted.
    pub async fn soft_delete(
        &self,
        ctx: &UserContext,
        board: Board,
        id: &str,
    ) -> Result<(), AccessError> {
        observed(ENTITY, "delete", self.delete_subtree(ctx, board, id)).await
    }

    async fn list_nodes(
        &self,
        board: Board,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskNode>, AccessError> {
        let rows = self
            .database
            .tasks()
            .list(board, filter)
            .await
            .map_err(backend)?;
        into_nodes(rows)
    }

    async fn list_trees(
        &self,
        board: Board,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskNode>, AccessError> {
        let repo = self.database.tasks();
        let roots = repo
            .list(board, &filter.clone().roots_only())
            .await
            .map_err(backend)?;
        let root_ids: Vec<String> = roots.into_iter().map(|row| row.id).collect();

        let rows = repo
            .fetch_trees(board, &root_ids)
            .await
            .map_err(backend)?;
        let mut by_id: HashMap<String, TaskNode> = tree::assemble(into_nodes(rows)?)?
            .into_iter()
            .filter(|node| node.level == TaskLevel::Root)
            .map(|node| (node.id.clone(), node))
            .collect();

        // Keep the order the filtered root listing produced.
        Ok(root_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    async fn find_node(&self, board: Board, id: &str) -> Result<TaskNode, AccessError> {
        let forest = self.load_forest(board, id).await?;
        tree::find(&forest, id)
            .cloned()
            .ok_or_else(|| AccessError::not_found(ENTITY, id))
    }

    async fn insert_node(
        &self,
        ctx: &UserContext,
        board: Board,
        form: TaskForm,
    ) -> Result<TaskNode, AccessError> {
        let input = form.validate()?;
        self.references.ensure_caller(ctx).await?;
        let repo = self.database.tasks();

        let id = Uuid::new_v4().to_string();
        let (level, root_id) = match input.parent_id.as_deref() {
            None => (TaskLevel::Root, id.clone()),
            Some(parent_id) => {
                let row = repo
                    .fetch(board, parent_id)
                    .await
                    .map_err(backend)?
                    .ok_or_else(|| {
                        ValidationError::new(
                            "parent_id",
                            format!("task {parent_id} does not exist on the {board} board"),
                        )
                    })?;
                let root_id = row.root_id.clone();
                let parent = row.into_domain().map_err(backend)?;
                let level = parent.level.child().ok_or_else(|| {
                    ValidationError::new(
                        "parent_id",
                        format!(
                            "level {} tasks cannot have subtasks",
                            TaskLevel::MAX.as_u8()
                        ),
                    )
                })?;
                (level, root_id)
            }
        };

        let project_id = self
            .references
            .resolve_optional(ReferenceKind::Project, "project", input.project)
            .await?;
        let assigned_to = self
            .references
            .resolve_optional(ReferenceKind::Person, "assignee", input.assignee)
            .await?;
        let department_id = self
            .references
            .resolve_optional(ReferenceKind::Department, "department", input.department)
            .await?;

        let now = stamp(&self.clock);
        let node = TaskNode {
            id,
            board,
            name: input.name,
            description: input.description,
            status: input.status,
            priority: input.priority,
            level,
            parent_id: input.parent_id,
            project_id,
            assigned_to,
            department_id,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
            subtasks: Vec::new(),
        };
        repo.insert(&node, &root_id).await.map_err(backend)?;

        info!(
            stage = "accessor",
            entity = ENTITY,
            %board,
            id = %node.id,
            level = node.level.as_u8(),
            user_id = %ctx.user_id,
            "task created"
        );
        self.notifier
            .send(Notices::task_created(&node).into_iter().collect())
            .await;
        Ok(node)
    }

    async fn update_node(
        &self,
        ctx: &UserContext,
        board: Board,
        id: &str,
        form: TaskPatchForm,
    ) -> Result<TaskNode, AccessError> {
        let changes = form.validate()?;
        self.references.ensure_caller(ctx).await?;

        let mut forest = self.load_forest(board, id).await?;
        let before = tree::find(&forest, id)
            .cloned()
            .ok_or_else(|| AccessError::not_found(ENTITY, id))?;

        let update = TaskUpdate {
            name: changes.name,
            description: changes.description,
            status: changes.status,
            priority: changes.priority,
            project_id: self
                .references
                .resolve_change(ReferenceKind::Project, "project", changes.project)
                .await?,
            assigned_to: self
                .references
                .resolve_change(ReferenceKind::Person, "assignee", changes.assignee)
                .await?,
            department_id: self
                .references
                .resolve_change(ReferenceKind::Department, "department", changes.department)
                .await?,
            due_date: changes.due_date,
        };

        let now = stamp(&self.clock);
        tree::update_at(&mut forest, id, |node| update.apply(node, now));
        let after = tree::find(&forest, id)
            .cloned()
            .ok_or_else(|| AccessError::not_found(ENTITY, id))?;

        let written = self
            .database
            .tasks()
            .update(&after)
            .await
            .map_err(backend)?;
        if !written {
            return Err(AccessError::not_found(ENTITY, id));
        }

        self.notifier
            .send(Notices::task_updated(&before, &after))
            .await;
        Ok(after)
    }

    async fn delete_subtree(
        &self,
        ctx: &UserContext,
        board: Board,
        id: &str,
    ) -> Result<(), AccessError> {
        ensure_can_delete_task(ctx)?;

        let mut forest = self.load_forest(board, id).await?;
        let removed = tree::remove_at(&mut forest, id)
            .ok_or_else(|| AccessError::not_found(ENTITY, id))?;
        let ids = tree::subtree_ids(&removed);

        let marked = self
            .database
            .tasks()
            .soft_delete(board, &ids, stamp(&self.clock))
            .await
            .map_err(backend)?;
        if marked == 0 {
            return Err(AccessError::not_found(ENTITY, id));
        }

        info!(
            stage = "accessor",
            entity = ENTITY,
            %board,
            id,
            cascaded = marked.saturating_sub(1),
            user_id = %ctx.user_id,
            "task deleted"
        );
        Ok(())
    }

    /// Loads the live tree that contains `id`.
    async fn load_forest(&self, board: Board, id: &str) -> Result<Vec<TaskNode>, AccessError> {
        let repo = self.database.tasks();
        let row = repo
            .fetch(board, id)
            .await
            .map_err(backend)?
            .ok_or_else(|| AccessError::not_found(ENTITY, id))?;
        let rows = repo
            .fetch_tree(board, &row.root_id)
            .await
            .map_err(backend)?;
        Ok(tree::assemble(into_nodes(rows)?)?)
    }
}

fn into_nodes(rows: Vec<TaskRow>) -> Result<Vec<TaskNode>, AccessError> {
    rows.into_iter()
        .map(|row| row.into_domain().map_err(backend))
        .collect()
}
