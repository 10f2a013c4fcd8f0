use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use opsdesk_core::{Role, UserContext};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Verifies HS256 session tokens minted by the identity provider.
#[derive(Clone)]
pub struct SessionValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        // Expiry is checked against the injected clock instead.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<UserContext, SessionError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| SessionError::Invalid(err.to_string()))?
            .claims;

        let now_ts = now.timestamp();
        if let Some(nbf) = claims.nbf {
            if now_ts < nbf as i64 {
                return Err(SessionError::NotYetValid);
            }
        }
        if now_ts >= claims.exp as i64 {
            return Err(SessionError::Expired);
        }
        if claims.sub.trim().is_empty() {
            return Err(SessionError::Invalid("subject is empty".to_string()));
        }

        Ok(UserContext {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            department_id: claims.department_id.filter(|id| !id.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<usize>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing bearer token")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The authenticated caller, resolved from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserContext);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let resolved = bearer_token(&parts.headers)
            .ok_or(SessionError::Missing)
            .and_then(|token| state.sessions().validate(token, state.now()));

        match resolved {
            Ok(ctx) => Ok(CurrentUser(ctx)),
            Err(err) => {
                counter!("auth_rejections_total").increment(1);
                debug!(stage = "auth", error = %err, path = %parts.uri.path(), "rejected request");
                Err(ProblemResponse::new(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    err.to_string(),
                ))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{token_for, user, TEST_SECRET};
    use super::*;
    use axum::http::HeaderValue;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn valid_token_yields_user_context() {
        let now = at("2024-05-01T12:00:00Z");
        let ctx = user("u-1", Role::Manager, Some("d-1"));
        let validator = SessionValidator::new(TEST_SECRET);

        let resolved = validator
            .validate(&token_for(&ctx, now), now)
            .expect("valid token");
        assert_eq!(resolved, ctx);
        assert!(resolved.is_manager_or_above());
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let issued = at("2024-05-01T12:00:00Z");
        let ctx = user("u-1", Role::Employee, None);
        let token = token_for(&ctx, issued);

        let validator = SessionValidator::new(TEST_SECRET);
        assert!(matches!(
            validator.validate(&token, at("2024-05-01T13:00:00Z")),
            Err(SessionError::Expired)
        ));

        let other = SessionValidator::new(b"a-completely-different-secret");
        assert!(matches!(
            other.validate(&token, issued),
            Err(SessionError::Invalid(_))
        ));
    }

    #[test]
    fn bearer_scheme_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
