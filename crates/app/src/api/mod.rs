//! JSON handlers for the record accessors. Handlers only translate HTTP into
//! accessor calls; every rule lives behind the accessor.

use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::rejection::QueryRejection,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;

use opsdesk_core::AccessError;

use crate::problem::ProblemResponse;
use crate::router::AppState;

mod leave;
mod notifications;
mod references;
mod tasks;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/boards/:board/tasks",
            get(tasks::list).post(tasks::create),
        )
        .route("/api/boards/:board/tasks/tree", get(tasks::tree))
        .route(
            "/api/boards/:board/tasks/:id",
            get(tasks::get_by_id)
                .patch(tasks::update)
                .delete(tasks::soft_delete),
        )
        .route(
            "/api/leave-requests",
            get(leave::list).post(leave::create),
        )
        .route(
            "/api/leave-requests/:id",
            get(leave::get_by_id)
                .patch(leave::update)
                .delete(leave::soft_delete),
        )
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/:id/read", post(notifications::mark_read))
        .route(
            "/api/references/:kind",
            get(references::list).post(references::lookup_or_create),
        )
}

/// Decodes a JSON request body into a form. Malformed JSON is a 400.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ProblemResponse> {
    serde_json::from_slice(body).map_err(|err| {
        ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_json", err.to_string())
    })
}

/// Resolves a path segment naming a closed set member. Unknown names are 404.
fn path_member<T: FromStr>(entity: &'static str, raw: &str) -> Result<T, ProblemResponse> {
    raw.parse::<T>()
        .map_err(|_| ProblemResponse::from(AccessError::not_found(entity, raw)))
}

fn query_problem(rejection: QueryRejection) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::BAD_REQUEST,
        "invalid_query",
        rejection.body_text(),
    )
}
