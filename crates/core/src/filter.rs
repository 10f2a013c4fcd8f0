//! Listing filters and their query-string forms.
//!
//! Predicates combine with AND; a set-valued predicate matches any of its
//! members. An empty filter selects every live record in creation order.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::types::{
    LeaveSortField, LeaveStatus, LeaveType, Priority, SortDirection, TaskLevel, TaskSortField,
    TaskStatus, UnknownVariant,
};
use crate::validate::{parse_date, ValidationError};

/// Ordering requested by the caller. Ties fall back to creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<F> {
    pub field: F,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub statuses: Vec<TaskStatus>,
    pub priorities: Vec<Priority>,
    pub assignees: Vec<String>,
    pub levels: Vec<TaskLevel>,
    pub parent_id: Option<String>,
    pub project_id: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub sort: Option<Sort<TaskSortField>>,
}

impl TaskFilter {
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_level(mut self, level: TaskLevel) -> Self {
        self.levels.push(level);
        self
    }

    pub fn sorted_by(mut self, field: TaskSortField, direction: SortDirection) -> Self {
        self.sort = Some(Sort { field, direction });
        self
    }

    /// Restricts the filter to top-level tasks, as used by tree listings.
    pub fn roots_only(mut self) -> Self {
        self.levels = vec![TaskLevel::Root];
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaveFilter {
    pub statuses: Vec<LeaveStatus>,
    pub leave_types: Vec<LeaveType>,
    pub employees: Vec<String>,
    /// Keeps requests whose span overlaps `[from, to]`.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub sort: Option<Sort<LeaveSortField>>,
}

/// Task listing query string: sets are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub due_from: Option<String>,
    #[serde(default)]
    pub due_to: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

impl TaskQuery {
    pub fn into_filter(self) -> Result<TaskFilter, ValidationError> {
        let levels = split_list(self.level.as_deref())
            .into_iter()
            .map(|raw| {
                raw.parse::<u8>()
                    .map_err(|_| format!("`{raw}` is not a level"))
                    .and_then(TaskLevel::try_from)
                    .map_err(|message| ValidationError::new("level", message))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let due_from = parse_optional_date("due_from", self.due_from)?;
        let due_to = parse_optional_date("due_to", self.due_to)?;
        if let (Some(from), Some(to)) = (due_from, due_to) {
            if to < from {
                return Err(ValidationError::new("due_to", "must not precede due_from"));
            }
        }

        Ok(TaskFilter {
            statuses: parse_set("status", self.status.as_deref())?,
            priorities: parse_set("priority", self.priority.as_deref())?,
            assignees: split_list(self.assignee.as_deref()),
            levels,
            parent_id: non_blank(self.parent),
            project_id: non_blank(self.project),
            due_from,
            due_to,
            search: non_blank(self.q),
            sort: parse_sort(self.sort.as_deref(), self.order.as_deref())?,
        })
    }
}

/// Leave listing query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub leave_type: Option<String>,
    #[serde(default)]
    pub employee: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
}

impl LeaveQuery {
    pub fn into_filter(self) -> Result<LeaveFilter, ValidationError> {
        let from = parse_optional_date("from", self.from)?;
        let to = parse_optional_date("to", self.to)?;
        if let (Some(from), Some(to)) = (from, to) {
            if to < from {
                return Err(ValidationError::new("to", "must not precede from"));
            }
        }

        Ok(LeaveFilter {
            statuses: parse_set("status", self.status.as_deref())?,
            leave_types: parse_set("leave_type", self.leave_type.as_deref())?,
            employees: split_list(self.employee.as_deref()),
            from,
            to,
            sort: parse_sort(self.sort.as_deref(), self.order.as_deref())?,
        })
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    let Some(value) = raw else {
        return Vec::new();
    };
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() || items.iter().any(|existing| existing == trimmed) {
            continue;
        }
        items.push(trimmed.to_string());
    }
    items
}

fn parse_set<T>(field: &'static str, raw: Option<&str>) -> Result<Vec<T>, ValidationError>
where
    T: FromStr<Err = UnknownVariant>,
{
    split_list(raw)
        .iter()
        .map(|item| {
            item.parse::<T>()
                .map_err(|err| ValidationError::new(field, err.to_string()))
        })
        .collect()
}

fn parse_sort<F>(field: Option<&str>, order: Option<&str>) -> Result<Option<Sort<F>>, ValidationError>
where
    F: FromStr<Err = UnknownVariant>,
{
    let direction = match order.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<SortDirection>()
            .map_err(|err| ValidationError::new("order", err.to_string()))?,
        None => SortDirection::default(),
    };
    let Some(raw) = field.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let field = raw
        .parse::<F>()
        .map_err(|err| ValidationError::new("sort", err.to_string()))?;
    Ok(Some(Sort { field, direction }))
}

fn parse_optional_date(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<NaiveDate>, ValidationError> {
    non_blank(raw).map(|value| parse_date(field, &value)).transpose()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
