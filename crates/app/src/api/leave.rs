use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use opsdesk_core::filter::LeaveQuery;
use opsdesk_core::types::LeaveRequest;
use opsdesk_core::validate::{LeaveForm, LeavePatchForm};
use opsdesk_core::AccessError;

use super::{parse_body, query_problem};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::CurrentUser;

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    query: Result<Query<LeaveQuery>, QueryRejection>,
) -> Result<Json<Vec<LeaveRequest>>, ProblemResponse> {
    let Query(query) = query.map_err(query_problem)?;
    let filter = query.into_filter().map_err(AccessError::from)?;
    let requests = state.leave().list(&ctx, &filter).await?;
    Ok(Json(requests))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<LeaveRequest>, ProblemResponse> {
    let request = state.leave().get_by_id(&ctx, &id).await?;
    Ok(Json(request))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<LeaveRequest>), ProblemResponse> {
    let form: LeaveForm = parse_body(&body)?;
    let request = state.leave().create(&ctx, form).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<LeaveRequest>, ProblemResponse> {
    let form: LeavePatchForm = parse_body(&body)?;
    let request = state.leave().update(&ctx, &id, form).await?;
    Ok(Json(request))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    state.leave().soft_delete(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::router::test_support::{call, setup_state};
    use crate::session::test_support::user;
    use opsdesk_core::Role;

    #[tokio::test]
    async fn approval_notifies_the_employee() {
        let state = setup_state().await;
        let admin = user("u-admin", Role::Admin, None);
        let employee = user("u-emp", Role::Employee, None);

        let (status, created) = call(
            &state,
            "POST",
            "/api/leave-requests",
            Some(&employee),
            Some(json!({
                "leave_type": "annual",
                "start_date": "2024-03-10",
                "end_date": "2024-03-14",
                "reason": "family trip"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending");
        assert_eq!(created["employee_id"], "u-emp");
        let id = created["id"].as_str().expect("id").to_string();

        let uri = format!("/api/leave-requests/{id}");
        let (status, body) = call(
            &state,
            "PATCH",
            &uri,
            Some(&employee),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["type"], "forbidden");

        let (status, decided) = call(
            &state,
            "PATCH",
            &uri,
            Some(&admin),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decided["status"], "approved");
        assert_eq!(decided["decided_by"], "u-admin");

        let (status, inbox) = call(
            &state,
            "GET",
            "/api/notifications?unread=true",
            Some(&employee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let inbox = inbox.as_array().expect("array");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0]["kind"], "leave.decided");
        let notification_id = inbox[0]["id"].as_str().expect("id").to_string();

        let (status, _) = call(
            &state,
            "POST",
            &format!("/api/notifications/{notification_id}/read"),
            Some(&employee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, inbox) = call(
            &state,
            "GET",
            "/api/notifications?unread=true",
            Some(&employee),
            None,
        )
        .await;
        assert!(inbox.as_array().expect("array").is_empty());
    }

    #[tokio::test]
    async fn employees_only_see_their_own_requests() {
        let state = setup_state().await;
        let first = user("u-1", Role::Employee, None);
        let second = user("u-2", Role::Employee, None);

        let (_, created) = call(
            &state,
            "POST",
            "/api/leave-requests",
            Some(&first),
            Some(json!({
                "leave_type": "sick",
                "start_date": "2024-04-02",
                "end_date": "2024-04-02"
            })),
        )
        .await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, _) = call(
            &state,
            "GET",
            &format!("/api/leave-requests/{id}"),
            Some(&second),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, listed) = call(&state, "GET", "/api/leave-requests", Some(&second), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(listed.as_array().expect("array").is_empty());

        let (status, listed) = call(
            &state,
            "GET",
            "/api/leave-requests?status=pending&from=2024-04-01&to=2024-04-30",
            Some(&first),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().expect("array").len(), 1);
    }

    #[tokio::test]
    async fn reversed_dates_and_manager_delete_are_rejected() {
        let state = setup_state().await;
        let employee = user("u-1", Role::Employee, None);
        let manager = user("u-2", Role::Manager, None);
        let admin = user("u-3", Role::Superadmin, None);

        let (status, body) = call(
            &state,
            "POST",
            "/api/leave-requests",
            Some(&employee),
            Some(json!({
                "leave_type": "annual",
                "start_date": "2024-05-10",
                "end_date": "2024-05-01"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "end_date");

        let (_, created) = call(
            &state,
            "POST",
            "/api/leave-requests",
            Some(&employee),
            Some(json!({
                "leave_type": "unpaid",
                "start_date": "2024-05-01",
                "end_date": "2024-05-03"
            })),
        )
        .await;
        let uri = format!("/api/leave-requests/{}", created["id"].as_str().expect("id"));

        let (status, _) = call(&state, "DELETE", &uri, Some(&manager), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&state, "DELETE", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&state, "GET", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
