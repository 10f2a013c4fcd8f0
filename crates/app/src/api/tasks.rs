use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};

use opsdesk_core::filter::TaskQuery;
use opsdesk_core::types::{Board, TaskNode};
use opsdesk_core::validate::{TaskForm, TaskPatchForm};
use opsdesk_core::AccessError;

use super::{parse_body, path_member, query_problem};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::CurrentUser;

fn board(raw: &str) -> Result<Board, ProblemResponse> {
    path_member("board", raw)
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(raw_board): Path<String>,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskNode>>, ProblemResponse> {
    let board = board(&raw_board)?;
    let Query(query) = query.map_err(query_problem)?;
    let filter = query.into_filter().map_err(AccessError::from)?;
    let nodes = state.tasks().list(&ctx, board, &filter).await?;
    Ok(Json(nodes))
}

pub async fn tree(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(raw_board): Path<String>,
    query: Result<Query<TaskQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskNode>>, ProblemResponse> {
    let board = board(&raw_board)?;
    let Query(query) = query.map_err(query_problem)?;
    let filter = query.into_filter().map_err(AccessError::from)?;
    let roots = state.tasks().tree(&ctx, board, &filter).await?;
    Ok(Json(roots))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((raw_board, id)): Path<(String, String)>,
) -> Result<Json<TaskNode>, ProblemResponse> {
    let board = board(&raw_board)?;
    let node = state.tasks().get_by_id(&ctx, board, &id).await?;
    Ok(Json(node))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(raw_board): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<TaskNode>), ProblemResponse> {
    let board = board(&raw_board)?;
    let form: TaskForm = parse_body(&body)?;
    let node = state.tasks().create(&ctx, board, form).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((raw_board, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<TaskNode>, ProblemResponse> {
    let board = board(&raw_board)?;
    let form: TaskPatchForm = parse_body(&body)?;
    let node = state.tasks().update(&ctx, board, &id, form).await?;
    Ok(Json(node))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((raw_board, id)): Path<(String, String)>,
) -> Result<StatusCode, ProblemResponse> {
    let board = board(&raw_board)?;
    state.tasks().soft_delete(&ctx, board, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;

    use crate::router::test_support::{bearer, call, send, setup_state};
    use crate::session::test_support::user;
    use opsdesk_core::Role;

    #[tokio::test]
    async fn requests_without_a_valid_token_are_unauthorized() {
        let state = setup_state().await;

        let (status, body) = call(&state, "GET", "/api/boards/tasks/tasks", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["type"], "unauthorized");

        let request = Request::get("/api/boards/tasks/tasks")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["type"], "unauthorized");
    }

    #[tokio::test]
    async fn subtask_status_change_does_not_roll_up() {
        let state = setup_state().await;
        let ctx = user("u-1", Role::Employee, None);

        let (status, parent) = call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "Launch" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(parent["status"], "not-started");
        let parent_id = parent["id"].as_str().expect("id").to_string();

        let (status, child) = call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "Design", "status": "in-progress", "parent_id": parent_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(child["level"], 1);
        let child_id = child["id"].as_str().expect("id").to_string();

        let (status, _) = call(
            &state,
            "PATCH",
            &format!("/api/boards/tasks/tasks/{child_id}"),
            Some(&ctx),
            Some(json!({ "status": "completed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, fetched) = call(
            &state,
            "GET",
            &format!("/api/boards/tasks/tasks/{parent_id}"),
            Some(&ctx),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["status"], "not-started");
        assert_eq!(fetched["subtasks"][0]["status"], "completed");
    }

    #[tokio::test]
    async fn malformed_input_maps_to_bad_request() {
        let state = setup_state().await;
        let ctx = user("u-1", Role::Employee, None);

        let request = Request::post("/api/boards/tasks/tasks")
            .header(header::AUTHORIZATION, bearer(&ctx))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_json");

        let (status, body) = call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "validation_failed");
        assert_eq!(body["field"], "name");

        let (status, body) = call(
            &state,
            "GET",
            "/api/boards/tasks/tasks?status=done",
            Some(&ctx),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "status");
    }

    #[tokio::test]
    async fn unknown_board_is_not_found() {
        let state = setup_state().await;
        let ctx = user("u-1", Role::Employee, None);
        let (status, body) = call(&state, "GET", "/api/boards/ops/tasks", Some(&ctx), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "not_found");
    }

    #[tokio::test]
    async fn delete_requires_manager_and_hides_the_subtree() {
        let state = setup_state().await;
        let employee = user("u-1", Role::Employee, None);
        let manager = user("u-2", Role::Manager, Some("d-1"));

        let (_, root) = call(
            &state,
            "POST",
            "/api/boards/dev/tasks",
            Some(&employee),
            Some(json!({ "name": "Release" })),
        )
        .await;
        let root_id = root["id"].as_str().expect("id").to_string();
        let (_, child) = call(
            &state,
            "POST",
            "/api/boards/dev/tasks",
            Some(&employee),
            Some(json!({ "name": "Changelog", "parent_id": root_id })),
        )
        .await;
        let child_id = child["id"].as_str().expect("id").to_string();

        let uri = format!("/api/boards/dev/tasks/{root_id}");
        let (status, body) = call(&state, "DELETE", &uri, Some(&employee), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["type"], "forbidden");

        let (status, body) = call(&state, "DELETE", &uri, Some(&manager), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, _) = call(&state, "GET", &uri, Some(&employee), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(
            &state,
            "GET",
            &format!("/api/boards/dev/tasks/{child_id}"),
            Some(&employee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tree_endpoint_nests_subtasks_under_roots() {
        let state = setup_state().await;
        let ctx = user("u-1", Role::Employee, None);

        let (_, root) = call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "Quarterly review" })),
        )
        .await;
        let root_id = root["id"].as_str().expect("id").to_string();
        let (_, sub) = call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "Collect numbers", "parent_id": root_id })),
        )
        .await;
        let sub_id = sub["id"].as_str().expect("id").to_string();
        call(
            &state,
            "POST",
            "/api/boards/tasks/tasks",
            Some(&ctx),
            Some(json!({ "name": "Sales figures", "parent_id": sub_id })),
        )
        .await;

        let (status, roots) = call(
            &state,
            "GET",
            "/api/boards/tasks/tasks/tree",
            Some(&ctx),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let roots = roots.as_array().expect("array");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0]["subtasks"][0]["name"], "Collect numbers");
        assert_eq!(roots[0]["subtasks"][0]["subtasks"][0]["level"], 2);

        let (status, flat) = call(&state, "GET", "/api/boards/tasks/tasks", Some(&ctx), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(flat.as_array().expect("array").len(), 3);
    }
}
