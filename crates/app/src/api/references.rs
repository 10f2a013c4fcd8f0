use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;

use opsdesk_core::types::{Reference, ReferenceKind};

use super::{parse_body, path_member, query_problem};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::session::CurrentUser;

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceForm {
    #[serde(default)]
    name: Option<String>,
}

fn kind(raw: &str) -> Result<ReferenceKind, ProblemResponse> {
    path_member("reference kind", raw)
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(raw_kind): Path<String>,
    query: Result<Query<ReferenceQuery>, QueryRejection>,
) -> Result<Json<Vec<Reference>>, ProblemResponse> {
    let kind = kind(&raw_kind)?;
    let Query(query) = query.map_err(query_problem)?;
    let rows = state
        .references()
        .list(&ctx, kind, query.q.as_deref(), query.limit)
        .await?;
    Ok(Json(rows))
}

/// Returns the existing row for the name, creating it on first use.
pub async fn lookup_or_create(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(raw_kind): Path<String>,
    body: Bytes,
) -> Result<Json<Reference>, ProblemResponse> {
    let kind = kind(&raw_kind)?;
    let form: ReferenceForm = parse_body(&body)?;
    let row = state
        .references()
        .lookup_or_create(&ctx, kind, form.name)
        .await?;
    Ok(Json(row))
}
