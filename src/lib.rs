pub mod auth;
pub mod config;
pub mod rest;
pub mod storage;

use std::sync::Arc;

use config::ServerConfig;
use storage::Storage;

/// Shared application state passed to every request handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub storage: Arc<Storage>,
    /// Secret key for signing access tokens.  Generated on first boot and
    /// persisted at `{data_dir}/token.secret`.  Rotating it invalidates all
    /// outstanding tokens.
    pub token_secret: Vec<u8>,
    pub started_at: std::time::Instant,
}
