use thiserror::Error;

use crate::tree::TreeError;
use crate::validate::ValidationError;

/// Failures an accessor reports to its caller.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    /// Opaque row store failure. The message is for server logs only.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl AccessError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable label used for metrics and problem types.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Backend(_) => "backend",
        }
    }
}

// A malformed stored tree is a data defect, not a caller mistake.
impl From<TreeError> for AccessError {
    fn from(err: TreeError) -> Self {
        Self::Backend(err.to_string())
    }
}
