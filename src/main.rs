use anyhow::Result;
use blinkd::{auth, config::ServerConfig, rest, storage::Storage, AppContext};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "blinkd",
    about = "blinkd — eye-health telemetry backend",
    version
)]
struct Args {
    /// REST API port
    #[arg(long, env = "BLINKD_PORT")]
    port: Option<u16>,

    /// Bind address (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "BLINKD_BIND")]
    bind_address: Option<String>,

    /// Data directory for the SQLite database, config, and token secret
    #[arg(long, env = "BLINKD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BLINKD_LOG", default_value = "info")]
    log: String,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "BLINKD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, env = "BLINKD_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args.log, args.log_file.as_deref(), args.log_json);

    let config = Arc::new(ServerConfig::new(
        args.port,
        args.bind_address,
        args.data_dir,
    ));
    std::fs::create_dir_all(&config.data_dir)?;

    let token_secret = auth::get_or_create_secret(&config.data_dir)?;
    let storage = Arc::new(
        Storage::new_with_slow_query(&config.data_dir, config.slow_query_ms).await?,
    );

    info!(
        data_dir = %config.data_dir.display(),
        "blinkd v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let ctx = Arc::new(AppContext {
        config,
        storage,
        token_secret,
        started_at: std::time::Instant::now(),
    });

    rest::start_rest_server(ctx).await
}

/// Initialise tracing.  Returns the appender guard when logging to a file —
/// dropping it flushes buffered log lines on shutdown.
fn init_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    use_json: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("blinkd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
