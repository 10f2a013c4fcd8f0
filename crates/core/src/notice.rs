use serde_json::{json, Value};

use crate::types::{LeaveRequest, NotificationKind, TaskNode, TaskStatus};

/// A notification ready to hand to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: Value,
}

/// Pure helpers deciding which notices a write produces.
pub struct Notices;

impl Notices {
    /// Notice for a freshly created task that already has an assignee.
    pub fn task_created(task: &TaskNode) -> Option<Notice> {
        let assignee = task.assigned_to.as_ref()?;
        Some(Notice {
            user_id: assignee.clone(),
            kind: NotificationKind::TaskAssigned,
            payload: task_summary(task),
        })
    }

    /// Notices for an updated task: a new assignee hears about the assignment,
    /// an unchanged assignee hears about a status change.
    pub fn task_updated(before: &TaskNode, after: &TaskNode) -> Vec<Notice> {
        let Some(assignee) = after.assigned_to.as_ref() else {
            return Vec::new();
        };

        if before.assigned_to.as_ref() != Some(assignee) {
            return vec![Notice {
                user_id: assignee.clone(),
                kind: NotificationKind::TaskAssigned,
                payload: task_summary(after),
            }];
        }

        if before.status != after.status {
            let mut payload = task_summary(after);
            if let Some(object) = payload.as_object_mut() {
                object.insert("previous_status".into(), json!(before.status));
            }
            return vec![Notice {
                user_id: assignee.clone(),
                kind: NotificationKind::TaskStatusChanged,
                payload,
            }];
        }

        Vec::new()
    }

    /// Notice to the employee when a request is approved or rejected.
    pub fn leave_updated(before: &LeaveRequest, after: &LeaveRequest) -> Option<Notice> {
        if before.status == after.status || !after.status.is_decision() {
            return None;
        }
        Some(Notice {
            user_id: after.employee_id.clone(),
            kind: NotificationKind::LeaveDecided,
            payload: json!({
                "leave_request_id": after.id,
                "status": after.status,
                "leave_type": after.leave_type,
                "start_date": after.start_date,
                "end_date": after.end_date,
                "days": after.day_count(),
                "decided_by": after.decided_by,
            }),
        })
    }
}

fn task_summary(task: &TaskNode) -> Value {
    json!({
        "task_id": task.id,
        "board": task.board,
        "name": task.name,
        "status": task.status,
        "level": task.level,
        "completed": task.status == TaskStatus::Completed,
    })
}
