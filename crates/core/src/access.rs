use serde::{Deserialize, Serialize};

use crate::error::AccessError;
use crate::types::{LeaveRequest, LeaveStatus};

/// Roles issued by the identity provider, from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }
}

/// The resolved caller of a request, passed explicitly to every accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<String>,
}

impl UserContext {
    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    /// Admin or superadmin.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Superadmin | Role::Admin)
    }

    pub fn is_manager_or_above(&self) -> bool {
        self.role <= Role::Manager
    }

    fn manages_department(&self, department_id: Option<&str>) -> bool {
        self.role == Role::Manager
            && department_id.is_some()
            && self.department_id.as_deref() == department_id
    }
}

/// Which leave requests a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveScope {
    All,
    Department(String),
    Own(String),
}

impl LeaveScope {
    pub fn for_user(ctx: &UserContext) -> Self {
        if ctx.is_admin() {
            return Self::All;
        }
        match (&ctx.role, &ctx.department_id) {
            (Role::Manager, Some(department)) => Self::Department(department.clone()),
            _ => Self::Own(ctx.user_id.clone()),
        }
    }

    pub fn permits(&self, request: &LeaveRequest) -> bool {
        match self {
            Self::All => true,
            Self::Department(department) => {
                request.department_id.as_deref() == Some(department.as_str())
            }
            Self::Own(user_id) => &request.employee_id == user_id,
        }
    }
}

pub fn ensure_can_delete_task(ctx: &UserContext) -> Result<(), AccessError> {
    if ctx.is_manager_or_above() {
        Ok(())
    } else {
        Err(AccessError::Forbidden("deleting tasks requires a manager role"))
    }
}

/// Employees may only file leave for themselves.
pub fn ensure_can_file_leave_for(ctx: &UserContext, employee_id: &str) -> Result<(), AccessError> {
    if employee_id == ctx.user_id || ctx.is_manager_or_above() {
        Ok(())
    } else {
        Err(AccessError::Forbidden(
            "employees may only file leave for themselves",
        ))
    }
}

fn can_decide_leave(ctx: &UserContext, request: &LeaveRequest) -> bool {
    ctx.is_admin() || ctx.manages_department(request.department_id.as_deref())
}

/// Checks a leave status change. Owners may only cancel.
pub fn ensure_can_set_leave_status(
    ctx: &UserContext,
    request: &LeaveRequest,
    status: LeaveStatus,
) -> Result<(), AccessError> {
    if can_decide_leave(ctx, request) {
        return Ok(());
    }
    if status == LeaveStatus::Cancelled
        && request.status == LeaveStatus::Pending
        && request.employee_id == ctx.user_id
    {
        return Ok(());
    }
    Err(AccessError::Forbidden(
        "changing this leave status requires an approver",
    ))
}

/// Dates, type and reason are editable by the owner while pending, or by an approver.
pub fn ensure_can_edit_leave(ctx: &UserContext, request: &LeaveRequest) -> Result<(), AccessError> {
    if can_decide_leave(ctx, request) {
        return Ok(());
    }
    if request.employee_id == ctx.user_id && request.status == LeaveStatus::Pending {
        return Ok(());
    }
    Err(AccessError::Forbidden(
        "only pending requests can be edited by their owner",
    ))
}

pub fn ensure_can_delete_leave(ctx: &UserContext) -> Result<(), AccessError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(AccessError::Forbidden("deleting leave requests requires an admin role"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeaveType;
    use chrono::{NaiveDate, Utc};

    fn ctx(role: Role, department: Option<&str>) -> UserContext {
        UserContext {
            user_id: format!("{}-user", role.as_str()),
            email: format!("{}@example.com", role.as_str()),
            role,
            department_id: department.map(str::to_string),
        }
    }

    fn request(employee: &str, department: Option<&str>) -> LeaveRequest {
        let now = Utc::now();
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        LeaveRequest {
            id: "l-1".into(),
            employee_id: employee.into(),
            department_id: department.map(str::to_string),
            leave_type: LeaveType::Sick,
            start_date: day,
            end_date: day,
            reason: None,
            status: LeaveStatus::Pending,
            decided_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_ordering_follows_privilege() {
        assert!(ctx(Role::Superadmin, None).is_manager_or_above());
        assert!(ctx(Role::Manager, None).is_manager_or_above());
        assert!(!ctx(Role::Employee, None).is_manager_or_above());
        assert!(ctx(Role::Superadmin, None).is_superadmin());
        assert!(!ctx(Role::Admin, None).is_superadmin());
    }

    #[test]
    fn only_managers_delete_tasks() {
        assert!(ensure_can_delete_task(&ctx(Role::Manager, None)).is_ok());
        assert!(matches!(
            ensure_can_delete_task(&ctx(Role::Employee, None)),
            Err(AccessError::Forbidden(_))
        ));
    }

    #[test]
    fn leave_scope_by_role() {
        assert_eq!(LeaveScope::for_user(&ctx(Role::Admin, Some("d-1"))), LeaveScope::All);
        assert_eq!(
            LeaveScope::for_user(&ctx(Role::Manager, Some("d-1"))),
            LeaveScope::Department("d-1".into())
        );
        assert_eq!(
            LeaveScope::for_user(&ctx(Role::Manager, None)),
            LeaveScope::Own("manager-user".into())
        );

        let scope = LeaveScope::for_user(&ctx(Role::Employee, Some("d-1")));
        assert!(scope.permits(&request("employee-user", Some("d-1"))));
        assert!(!scope.permits(&request("someone-else", Some("d-1"))));
    }

    #[test]
    fn managers_decide_only_their_department() {
        let manager = ctx(Role::Manager, Some("d-1"));
        let own_dept = request("e-1", Some("d-1"));
        let other_dept = request("e-2", Some("d-2"));

        assert!(ensure_can_set_leave_status(&manager, &own_dept, LeaveStatus::Approved).is_ok());
        assert!(ensure_can_set_leave_status(&manager, &other_dept, LeaveStatus::Approved).is_err());
    }

    #[test]
    fn owners_may_cancel_but_not_approve() {
        let employee = ctx(Role::Employee, Some("d-1"));
        let own = request("employee-user", Some("d-1"));

        assert!(ensure_can_set_leave_status(&employee, &own, LeaveStatus::Cancelled).is_ok());
        assert!(ensure_can_set_leave_status(&employee, &own, LeaveStatus::Approved).is_err());
        assert!(ensure_can_edit_leave(&employee, &own).is_ok());

        let mut decided = own.clone();
        decided.status = LeaveStatus::Approved;
        assert!(ensure_can_edit_leave(&employee, &decided).is_err());
        assert!(ensure_can_set_leave_status(&employee, &decided, LeaveStatus::Cancelled).is_err());

        decided.status = LeaveStatus::Rejected;
        assert!(ensure_can_set_leave_status(&employee, &decided, LeaveStatus::Cancelled).is_err());

        let other = request("someone-else", Some("d-1"));
        assert!(ensure_can_set_leave_status(&employee, &other, LeaveStatus::Cancelled).is_err());
    }

    #[test]
    fn employees_file_only_for_themselves() {
        let employee = ctx(Role::Employee, None);
        assert!(ensure_can_file_leave_for(&employee, "employee-user").is_ok());
        assert!(ensure_can_file_leave_for(&employee, "other").is_err());
        assert!(ensure_can_file_leave_for(&ctx(Role::Manager, None), "other").is_ok());
        assert!(ensure_can_delete_leave(&ctx(Role::Manager, None)).is_err());
        assert!(ensure_can_delete_leave(&ctx(Role::Admin, None)).is_ok());
    }
}
