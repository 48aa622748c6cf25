// rest/routes/sessions.rs — Usage-session lifecycle.
//
// Sessions are Open → Closed, one transition, no way back.  Each response
// returns a fresh access token reflecting the caller's current session so
// clients always hold a token that matches server state.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::auth::token;
use crate::rest::{error::ApiError, extract::AuthUser};
use crate::AppContext;

pub async fn start_session(
    State(ctx): State<Arc<AppContext>>,
    user: AuthUser,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = ctx.storage.start_session(&user.user_id).await?;
    let access = token::issue(
        &user.user_id,
        Some(&session.id),
        ctx.config.token_ttl(),
        &ctx.token_secret,
    )?;

    info!(user_id = %user.user_id, session_id = %session.id, "session started");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "session_id": session.id, "token": access })),
    ))
}

pub async fn end_session(
    State(ctx): State<Arc<AppContext>>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let session_id = user.require_session()?;

    // Idempotent: a second close of the same session is a no-op success.
    ctx.storage.end_session(session_id).await?;
    let access = token::issue(&user.user_id, None, ctx.config.token_ttl(), &ctx.token_secret)?;

    info!(user_id = %user.user_id, session_id = %session_id, "session ended");
    Ok(Json(json!({ "message": "Session ended", "token": access })))
}
