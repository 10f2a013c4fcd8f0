use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use opsdesk_core::AccessError;

const RETRY_DETAIL: &str = "the request could not be completed, please try again";

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

#[derive(Debug)]
pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
                field: None,
            },
        }
    }

    fn with_field(mut self, field: &'static str) -> Self {
        self.body.field = Some(field);
        self
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AccessError> for ProblemResponse {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Validation(invalid) => {
                ProblemResponse::new(StatusCode::BAD_REQUEST, "validation_failed", invalid.message)
                    .with_field(invalid.field)
            }
            AccessError::NotFound { entity, id } => ProblemResponse::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{entity} {id} was not found"),
            ),
            AccessError::Forbidden(reason) => {
                ProblemResponse::new(StatusCode::FORBIDDEN, "forbidden", reason)
            }
            // Already logged where it happened.
            AccessError::Backend(_) => ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "backend_unavailable",
                RETRY_DETAIL,
            ),
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use opsdesk_core::validate::ValidationError;

    async fn body_json(problem: ProblemResponse) -> serde_json::Value {
        let response = problem.into_response();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn validation_errors_carry_the_field() {
        let problem = ProblemResponse::from(AccessError::from(ValidationError::new(
            "name",
            "is required",
        )));
        assert_eq!(problem.status(), StatusCode::BAD_REQUEST);

        let body = body_json(problem).await;
        assert_eq!(body["type"], "validation_failed");
        assert_eq!(body["field"], "name");
        assert_eq!(body["detail"], "is required");
    }

    #[tokio::test]
    async fn backend_text_is_never_exposed() {
        let problem = ProblemResponse::from(AccessError::Backend(
            "database error: disk I/O error".into(),
        ));
        assert_eq!(problem.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(problem).await;
        assert_eq!(body["detail"], RETRY_DETAIL);
        assert!(!body.to_string().contains("disk"));
    }
}
