// rest/routes/statistics.rs — Telemetry recording and retrieval.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::rest::{error::ApiError, extract::AuthUser};
use crate::AppContext;

const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Deserialize)]
pub struct RecordRequest {
    pub blink_rate: Option<f64>,
    pub avg_distance: Option<f64>,
    pub staring_incidents: Option<i64>,
}

pub async fn record_statistics(
    State(ctx): State<Arc<AppContext>>,
    user: AuthUser,
    Json(body): Json<RecordRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = user.require_session()?;

    // A stale token can name a session that has since been closed (or
    // auto-closed by a newer start).  Writes only land in open sessions.
    let session = ctx
        .storage
        .get_session(session_id)
        .await?
        .ok_or(ApiError::NoActiveSession)?;
    if !session.is_open() {
        return Err(ApiError::NoActiveSession);
    }

    let entry = ctx
        .storage
        .record_statistics(
            session_id,
            body.blink_rate,
            body.avg_distance,
            body.staring_incidents,
        )
        .await?;

    debug!(session_id = %session_id, entry_id = %entry.id, "statistics recorded");
    Ok(Json(json!({ "message": "Statistics recorded" })))
}

#[derive(Deserialize)]
pub struct StatisticsQuery {
    /// Kept as a raw string: a non-numeric value falls back to the default
    /// window instead of rejecting the request.
    pub days: Option<String>,
}

impl StatisticsQuery {
    fn days(&self) -> i64 {
        self.days
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WINDOW_DAYS)
    }
}

pub async fn get_statistics(
    State(ctx): State<Arc<AppContext>>,
    user: AuthUser,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = query.days();
    let entries = ctx.storage.list_statistics(&user.user_id, days).await?;
    Ok(Json(json!({ "statistics": entries })))
}

pub async fn get_summary(
    State(ctx): State<Arc<AppContext>>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let summary = ctx.storage.summary(&user.user_id).await?;
    Ok(Json(json!(summary)))
}
