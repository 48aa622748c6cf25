// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, JSON bodies, Bearer-token auth.
//
// Endpoints:
//   POST /api/v1/register
//   POST /api/v1/login
//   POST /api/v1/sessions/start
//   POST /api/v1/sessions/end
//   POST /api/v1/statistics
//   GET  /api/v1/statistics?days=N
//   GET  /api/v1/summary
//   GET  /api/v1/health

pub mod error;
pub mod extract;
pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(routes::health::health))
        // Accounts (no auth)
        .route("/api/v1/register", post(routes::accounts::register))
        .route("/api/v1/login", post(routes::accounts::login))
        // Usage sessions
        .route("/api/v1/sessions/start", post(routes::sessions::start_session))
        .route("/api/v1/sessions/end", post(routes::sessions::end_session))
        // Telemetry
        .route(
            "/api/v1/statistics",
            get(routes::statistics::get_statistics).post(routes::statistics::record_statistics),
        )
        .route("/api/v1/summary", get(routes::statistics::get_summary))
        // The original deployment fronted a browser client on another origin
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
