// rest/extract.rs — Bearer-token auth extractor.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use super::error::ApiError;
use crate::{auth::token, AppContext};

/// The authenticated caller, decoded from the `Authorization: Bearer` header.
///
/// `session_id` is the usage session the token was minted for, if any.
/// Handlers that require an open session must still confirm against storage
/// that the session has not since been closed — tokens are stateless and a
/// stale one can outlive its session.
pub struct AuthUser {
    pub user_id: String,
    pub session_id: Option<String>,
}

impl AuthUser {
    /// The caller's current session id, or `NoActiveSession` if the token
    /// carries none.
    pub fn require_session(&self) -> Result<&str, ApiError> {
        self.session_id.as_deref().ok_or(ApiError::NoActiveSession)
    }
}

impl FromRequestParts<Arc<AppContext>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let raw = header_value
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthenticated)?;

        let token = token::verify(raw, &ctx.token_secret).map_err(|_| ApiError::Unauthenticated)?;

        Ok(AuthUser {
            user_id: token.user_id,
            session_id: token.session_id,
        })
    }
}
