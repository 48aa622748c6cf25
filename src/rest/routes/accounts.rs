// rest/routes/accounts.rs — Registration and login.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::auth::{password, token};
use crate::rest::error::ApiError;
use crate::AppContext;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl CredentialsRequest {
    /// Both fields present and non-empty, or 400.
    fn require(&self) -> Result<(&str, &str), ApiError> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Ok((e, p)),
            _ => Err(ApiError::Validation("Email and password are required")),
        }
    }
}

pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (email, pw) = body.require()?;

    let hash = password::hash_password(pw);
    let user = ctx
        .storage
        .create_user(email, &hash)
        .await?
        .ok_or(ApiError::DuplicateEmail)?;

    info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<Value>, ApiError> {
    let (email, pw) = body.require()?;

    // Unknown email and wrong password take the same path to the same error.
    let user = ctx
        .storage
        .get_user_by_email(email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    if !password::verify_password(pw, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let access = token::issue(&user.id, None, ctx.config.token_ttl(), &ctx.token_secret)?;
    info!(user_id = %user.id, "login successful");
    Ok(Json(json!({ "message": "Login successful", "token": access })))
}
