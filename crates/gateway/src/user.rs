//! User context extraction
//!
//! Authentication and authorization live in an upstream collaborator; by the
//! time a request reaches these handlers the user id has been resolved and
//! forwarded in the X-User-Id header.

use axum::{extract::FromRequestParts, http::request::Parts};
use studyforge_common::errors::{AppError, Result};
use uuid::Uuid;

/// The resolved identity a request acts as
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let header = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Forbidden {
                message: "Missing X-User-Id header".to_string(),
            })?;

        let user_id = Uuid::parse_str(header).map_err(|_| AppError::Validation {
            message: "X-User-Id header is not a valid UUID".to_string(),
            field: Some("x-user-id".to_string()),
        })?;

        Ok(UserContext { user_id })
    }
}
