//! Runtime validation of inbound forms.
//!
//! Forms arrive as loosely typed JSON: enum fields are plain strings and every
//! field is optional so that a missing value yields a field-level
//! [`ValidationError`] instead of a deserializer message.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::types::{LeaveStatus, LeaveType, Priority, TaskStatus, UnknownVariant};

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_REASON_LEN: usize = 1000;
pub const MAX_LEAVE_DAYS: i64 = 366;

/// A missing or invalid field value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    fn unknown(field: &'static str, err: UnknownVariant) -> Self {
        Self::new(field, err.to_string())
    }
}

/// A foreign-key input: either an existing row id or a label to look up or create.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReferenceInput {
    Id { id: String },
    Name { name: String },
}

impl ReferenceInput {
    fn validated(self, field: &'static str) -> Result<Self, ValidationError> {
        match self {
            Self::Id { id } => {
                let id = id.trim().to_string();
                if id.is_empty() {
                    return Err(ValidationError::new(field, "reference id must not be empty"));
                }
                Ok(Self::Id { id })
            }
            Self::Name { name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ValidationError::new(field, "reference name must not be empty"));
                }
                if name.chars().count() > MAX_NAME_LEN {
                    return Err(ValidationError::new(
                        field,
                        format!("reference name must be at most {MAX_NAME_LEN} characters"),
                    ));
                }
                Ok(Self::Name { name })
            }
        }
    }
}

/// Deserializes a field so that an explicit `null` is distinguishable from absence.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Raw task creation form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub project: Option<ReferenceInput>,
    #[serde(default)]
    pub assignee: Option<ReferenceInput>,
    #[serde(default)]
    pub department: Option<ReferenceInput>,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Validated task creation input. References are not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub parent_id: Option<String>,
    pub project: Option<ReferenceInput>,
    pub assignee: Option<ReferenceInput>,
    pub department: Option<ReferenceInput>,
    pub due_date: Option<NaiveDate>,
}

impl TaskForm {
    pub fn validate(self) -> Result<NewTask, ValidationError> {
        let name = required_name(self.name)?;
        let description = optional_text(self.description, "description", MAX_DESCRIPTION_LEN)?;
        let status = match self.status {
            Some(raw) => parse_status(&raw)?,
            None => TaskStatus::default(),
        };
        let priority = match self.priority {
            Some(raw) => parse_priority(&raw)?,
            None => Priority::default(),
        };
        let parent_id = self
            .parent_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(NewTask {
            name,
            description,
            status,
            priority,
            parent_id,
            project: self.project.map(|r| r.validated("project")).transpose()?,
            assignee: self.assignee.map(|r| r.validated("assignee")).transpose()?,
            department: self
                .department
                .map(|r| r.validated("department"))
                .transpose()?,
            due_date: self
                .due_date
                .map(|raw| parse_date("due_date", &raw))
                .transpose()?,
        })
    }
}

/// Raw partial task update. `null` clears optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatchForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub parent_id: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub project: Option<Option<ReferenceInput>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee: Option<Option<ReferenceInput>>,
    #[serde(default, deserialize_with = "nullable")]
    pub department: Option<Option<ReferenceInput>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
}

/// Validated partial task update. References are not resolved yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project: Option<Option<ReferenceInput>>,
    pub assignee: Option<Option<ReferenceInput>>,
    pub department: Option<Option<ReferenceInput>>,
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatchForm {
    pub fn validate(self) -> Result<TaskChanges, ValidationError> {
        if self.parent_id.is_some() {
            return Err(ValidationError::new(
                "parent_id",
                "tasks cannot be moved to another parent",
            ));
        }

        Ok(TaskChanges {
            name: self.name.map(|name| required_name(Some(name))).transpose()?,
            description: self
                .description
                .map(|value| optional_text(value, "description", MAX_DESCRIPTION_LEN))
                .transpose()?,
            status: self.status.map(|raw| parse_status(&raw)).transpose()?,
            priority: self.priority.map(|raw| parse_priority(&raw)).transpose()?,
            project: validated_nullable_ref(self.project, "project")?,
            assignee: validated_nullable_ref(self.assignee, "assignee")?,
            department: validated_nullable_ref(self.department, "department")?,
            due_date: self
                .due_date
                .map(|value| value.map(|raw| parse_date("due_date", &raw)).transpose())
                .transpose()?,
        })
    }
}

/// Raw leave request form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveForm {
    #[serde(default)]
    pub employee: Option<ReferenceInput>,
    #[serde(default)]
    pub department: Option<ReferenceInput>,
    #[serde(default)]
    pub leave_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Validated leave request input.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLeave {
    pub employee: Option<ReferenceInput>,
    pub department: Option<ReferenceInput>,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

impl LeaveForm {
    pub fn validate(self) -> Result<NewLeave, ValidationError> {
        let leave_type = self
            .leave_type
            .ok_or_else(|| ValidationError::new("leave_type", "is required"))?;
        let leave_type = leave_type
            .trim()
            .parse::<LeaveType>()
            .map_err(|err| ValidationError::unknown("leave_type", err))?;
        let start_date = self
            .start_date
            .ok_or_else(|| ValidationError::new("start_date", "is required"))
            .and_then(|raw| parse_date("start_date", &raw))?;
        let end_date = self
            .end_date
            .ok_or_else(|| ValidationError::new("end_date", "is required"))
            .and_then(|raw| parse_date("end_date", &raw))?;
        check_leave_range(start_date, end_date)?;

        Ok(NewLeave {
            employee: self.employee.map(|r| r.validated("employee")).transpose()?,
            department: self
                .department
                .map(|r| r.validated("department"))
                .transpose()?,
            leave_type,
            start_date,
            end_date,
            reason: optional_text(self.reason, "reason", MAX_REASON_LEN)?,
        })
    }
}

/// Raw partial leave request update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeavePatchForm {
    #[serde(default)]
    pub leave_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub reason: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Validated partial leave request update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaveChanges {
    pub leave_type: Option<LeaveType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub reason: Option<Option<String>>,
    pub status: Option<LeaveStatus>,
}

impl LeaveChanges {
    /// Returns `true` when any field other than the status changes.
    pub fn touches_details(&self) -> bool {
        self.leave_type.is_some()
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.reason.is_some()
    }
}

impl LeavePatchForm {
    pub fn validate(self) -> Result<LeaveChanges, ValidationError> {
        Ok(LeaveChanges {
            leave_type: self
                .leave_type
                .map(|raw| {
                    raw.trim()
                        .parse::<LeaveType>()
                        .map_err(|err| ValidationError::unknown("leave_type", err))
                })
                .transpose()?,
            start_date: self
                .start_date
                .map(|raw| parse_date("start_date", &raw))
                .transpose()?,
            end_date: self
                .end_date
                .map(|raw| parse_date("end_date", &raw))
                .transpose()?,
            reason: self
                .reason
                .map(|value| optional_text(value, "reason", MAX_REASON_LEN))
                .transpose()?,
            status: self
                .status
                .map(|raw| {
                    raw.trim()
                        .parse::<LeaveStatus>()
                        .map_err(|err| ValidationError::unknown("status", err))
                })
                .transpose()?,
        })
    }
}

/// Checks that a leave span is ordered and of reasonable length.
pub fn check_leave_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::new(
            "end_date",
            "must be on or after start_date",
        ));
    }
    if (end - start).num_days() + 1 > MAX_LEAVE_DAYS {
        return Err(ValidationError::new(
            "end_date",
            format!("leave may span at most {MAX_LEAVE_DAYS} days"),
        ));
    }
    Ok(())
}

pub fn parse_status(raw: &str) -> Result<TaskStatus, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|err| ValidationError::unknown("status", err))
}

pub fn parse_priority(raw: &str) -> Result<Priority, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|err| ValidationError::unknown("priority", err))
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::new(field, format!("`{raw}` is not a YYYY-MM-DD date")))
}

fn required_name(value: Option<String>) -> Result<String, ValidationError> {
    let name = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::new(
            "name",
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name)
}

// Blank text is stored as absent.
fn optional_text(
    value: Option<String>,
    field: &'static str,
    max_len: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(text) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(Some(text))
}

fn validated_nullable_ref(
    value: Option<Option<ReferenceInput>>,
    field: &'static str,
) -> Result<Option<Option<ReferenceInput>>, ValidationError> {
    value
        .map(|inner| inner.map(|r| r.validated(field)).transpose())
        .transpose()
}
