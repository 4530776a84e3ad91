//! Caller identification
//!
//! The borrower portal terminates authentication upstream and forwards the
//! caller's identity in trusted headers. This extractor reads `X-User-Id`
//! (required, UUID) and `X-User-Role` (optional, `admin` grants elevated
//! access) and rejects requests without a usable identity.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Identity of the caller as asserted by the upstream portal
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub is_admin: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = parts
            .headers
            .get("x-user-id")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;

        let user_id = Uuid::parse_str(raw_id)
            .map_err(|_| ApiError::Unauthorized("Invalid X-User-Id header".to_string()))?;

        let is_admin = parts
            .headers
            .get("x-user-role")
            .and_then(|h| h.to_str().ok())
            .map(|r| r.eq_ignore_ascii_case("admin"))
            .unwrap_or(false);

        Ok(CallerIdentity { user_id, is_admin })
    }
}

impl CallerIdentity {
    /// Returns an error unless the caller holds the admin role
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }
}
