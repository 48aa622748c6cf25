use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_PORT: u16 = 4310;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".blinkd")
    } else {
        PathBuf::from(".blinkd")
    }
}

/// Optional `config.toml` in the data directory.  Every field has a default;
/// the file may be absent or partial.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    port: Option<u16>,
    bind_address: Option<String>,
    /// Access-token lifetime in hours.
    token_ttl_hours: Option<i64>,
    /// Queries slower than this are logged at WARN level. 0 disables.
    slow_query_ms: Option<u64>,
}

/// Resolved server configuration.  Precedence: CLI flags / env vars, then
/// `{data_dir}/config.toml`, then built-in defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub token_ttl_hours: i64,
    pub slow_query_ms: u64,
}

impl ServerConfig {
    pub fn new(
        port: Option<u16>,
        bind_address: Option<String>,
        data_dir: Option<PathBuf>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let file = load_file_config(&data_dir);

        Self {
            port: port.or(file.port).unwrap_or(DEFAULT_PORT),
            bind_address: bind_address
                .or(file.bind_address)
                .unwrap_or_else(default_bind_address),
            data_dir,
            token_ttl_hours: file.token_ttl_hours.unwrap_or(DEFAULT_TOKEN_TTL_HOURS),
            slow_query_ms: file.slow_query_ms.unwrap_or(0),
        }
    }

    /// Access-token lifetime as a chrono duration.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

fn load_file_config(data_dir: &Path) -> FileConfig {
    let path = data_dir.join("config.toml");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return FileConfig::default();
    };
    match toml::from_str(&raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("ignoring malformed {}: {e}", path.display());
            FileConfig::default()
        }
    }
}
