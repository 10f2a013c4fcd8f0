use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use opsdesk_core::types::Notification;

use super::query_problem;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::CurrentUser;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    unread: bool,
    #[serde(default)]
    limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    query: Result<Query<NotificationQuery>, QueryRejection>,
) -> Result<Json<Vec<Notification>>, ProblemResponse> {
    let Query(query) = query.map_err(query_problem)?;
    let notifications = state
        .notifications()
        .list(&ctx, query.unread, query.limit)
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ProblemResponse> {
    state.notifications().mark_read(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
