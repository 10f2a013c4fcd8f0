use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raised when a string does not name a member of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{value}` is not one of: {allowed}")]
pub struct UnknownVariant {
    pub value: String,
    pub allowed: String,
}

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the canonical wire and database representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            fn allowed() -> String {
                [$($value),+].join(", ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        value: other.to_string(),
                        allowed: Self::allowed(),
                    }),
                }
            }
        }
    };
}

closed_enum! {
    /// Task namespaces. Each board holds independent trees.
    pub enum Board {
        Tasks => "tasks",
        Dev => "dev",
    }
}

closed_enum! {
    /// Advisory task status; any value may move to any other.
    pub enum TaskStatus {
        NotStarted => "not-started",
        InProgress => "in-progress",
        InReview => "in-review",
        Completed => "completed",
        Blocked => "blocked",
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

closed_enum! {
    pub enum Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

closed_enum! {
    pub enum LeaveType {
        Annual => "annual",
        Sick => "sick",
        Unpaid => "unpaid",
        Other => "other",
    }
}

closed_enum! {
    /// Leave request workflow state. Transitions are not enforced.
    pub enum LeaveStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
    }
}

impl LeaveStatus {
    /// Returns `true` for the states that record a decision by an approver.
    pub fn is_decision(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

closed_enum! {
    /// Kinds of named lookup rows that records reference by id.
    pub enum ReferenceKind {
        Person => "person",
        Department => "department",
        Vertical => "vertical",
        Team => "team",
        Project => "project",
    }
}

closed_enum! {
    pub enum NotificationKind {
        TaskAssigned => "task.assigned",
        TaskStatusChanged => "task.status_changed",
        LeaveDecided => "leave.decided",
    }
}

closed_enum! {
    pub enum SortDirection {
        Asc => "asc",
        Desc => "desc",
    }
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Asc
    }
}

closed_enum! {
    /// Scalar task fields that listings may be ordered by.
    pub enum TaskSortField {
        Name => "name",
        Status => "status",
        Priority => "priority",
        Level => "level",
        DueDate => "due_date",
        CreatedAt => "created_at",
        UpdatedAt => "updated_at",
    }
}

closed_enum! {
    /// Scalar leave request fields that listings may be ordered by.
    pub enum LeaveSortField {
        StartDate => "start_date",
        EndDate => "end_date",
        Status => "status",
        LeaveType => "leave_type",
        CreatedAt => "created_at",
        UpdatedAt => "updated_at",
    }
}

/// Depth of a node in the fixed three-tier task hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskLevel {
    Root,
    Subtask,
    SubSubtask,
}

impl TaskLevel {
    pub const MAX: TaskLevel = TaskLevel::SubSubtask;

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Root => 0,
            Self::Subtask => 1,
            Self::SubSubtask => 2,
        }
    }

    /// Level of a direct child, or `None` when this level is a leaf.
    pub fn child(self) -> Option<TaskLevel> {
        match self {
            Self::Root => Some(Self::Subtask),
            Self::Subtask => Some(Self::SubSubtask),
            Self::SubSubtask => None,
        }
    }

    pub fn is_leaf(self) -> bool {
        self.child().is_none()
    }
}

impl From<TaskLevel> for u8 {
    fn from(level: TaskLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for TaskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Root),
            1 => Ok(Self::Subtask),
            2 => Ok(Self::SubSubtask),
            other => Err(format!("task level must be 0, 1 or 2 (got {other})")),
        }
    }
}

/// A task as exposed to callers, with its live subtasks nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub board: Board,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub level: TaskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<TaskNode>,
}

/// Field changes for a task with every reference already resolved to a row id.
///
/// `Some(None)` clears an optional field; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<Option<String>>,
    pub assigned_to: Option<Option<String>>,
    pub department_id: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskUpdate {
    /// Merges the changes into `node` and stamps `updated_at`. Subtasks are not touched.
    pub fn apply(self, node: &mut TaskNode, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(description) = self.description {
            node.description = description;
        }
        if let Some(status) = self.status {
            node.status = status;
        }
        if let Some(priority) = self.priority {
            node.priority = priority;
        }
        if let Some(project_id) = self.project_id {
            node.project_id = project_id;
        }
        if let Some(assigned_to) = self.assigned_to {
            node.assigned_to = assigned_to;
        }
        if let Some(department_id) = self.department_id {
            node.department_id = department_id;
        }
        if let Some(due_date) = self.due_date {
            node.due_date = due_date;
        }
        node.updated_at = now;
    }
}

/// A leave request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: String,
    pub employee_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: LeaveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Number of calendar days covered, both ends inclusive.
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// A named lookup row (person, department, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: String,
    pub kind: ReferenceKind,
    pub name: String,
}

/// A message persisted for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

/// Returns the canonical key used to match reference names.
pub fn reference_name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_kebab_case() {
        let status: TaskStatus = "in-review".parse().expect("known status");
        assert_eq!(status, TaskStatus::InReview);
        assert_eq!(
            serde_json::to_value(TaskStatus::NotStarted).unwrap(),
            json!("not-started")
        );
    }

    #[test]
    fn unknown_variant_lists_allowed_values() {
        let err = "done".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.value, "done");
        assert_eq!(
            err.allowed,
            "not-started, in-progress, in-review, completed, blocked"
        );
    }

    #[test]
    fn task_level_serializes_as_number_and_rejects_depth_three() {
        assert_eq!(serde_json::to_value(TaskLevel::Subtask).unwrap(), json!(1));
        let parsed: TaskLevel = serde_json::from_value(json!(2)).expect("level 2");
        assert_eq!(parsed, TaskLevel::SubSubtask);
        assert!(serde_json::from_value::<TaskLevel>(json!(3)).is_err());
        assert_eq!(TaskLevel::Root.child(), Some(TaskLevel::Subtask));
        assert!(TaskLevel::MAX.is_leaf());
    }

    #[test]
    fn update_apply_clears_and_sets_fields() {
        let created = DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut node = TaskNode {
            id: "t-1".into(),
            board: Board::Tasks,
            name: "Launch".into(),
            description: Some("first cut".into()),
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            level: TaskLevel::Root,
            parent_id: None,
            project_id: None,
            assigned_to: Some("p-1".into()),
            department_id: None,
            due_date: None,
            created_at: created,
            updated_at: created,
            subtasks: Vec::new(),
        };
        let later = created + chrono::Duration::minutes(5);

        TaskUpdate {
            description: Some(None),
            status: Some(TaskStatus::Blocked),
            assigned_to: Some(None),
            ..TaskUpdate::default()
        }
        .apply(&mut node, later);

        assert_eq!(node.description, None);
        assert_eq!(node.status, TaskStatus::Blocked);
        assert_eq!(node.assigned_to, None);
        assert_eq!(node.name, "Launch");
        assert_eq!(node.updated_at, later);
        assert_eq!(node.created_at, created);
    }

    #[test]
    fn reference_key_folds_case_and_whitespace() {
        assert_eq!(reference_name_key("  Human   Resources "), "human resources");
    }

    #[test]
    fn leave_day_count_is_inclusive() {
        let now = Utc::now();
        let request = LeaveRequest {
            id: "l-1".into(),
            employee_id: "u-1".into(),
            department_id: None,
            leave_type: LeaveType::Annual,
            start_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            reason: None,
            status: LeaveStatus::Pending,
            decided_by: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(request.day_count(), 5);
    }
}
