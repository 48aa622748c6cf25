use anyhow::Result;
use chrono::{Duration, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the server indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Current time as an RFC3339 string with fixed microsecond precision.
/// Fixed width keeps lexicographic ordering equal to chronological ordering,
/// which the statistics window filter relies on.
fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub started_at: String,
    /// NULL while the session is open.  Set exactly once on close.
    pub ended_at: Option<String>,
}

impl SessionRow {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// One telemetry sample.  All three metrics are optional — a reporting
/// client may send any subset.  Values are stored as given; there is no
/// range validation.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct StatEntryRow {
    pub id: String,
    pub session_id: String,
    pub recorded_at: String,
    pub blink_rate: Option<f64>,
    pub avg_distance: Option<f64>,
    pub staring_incidents: Option<i64>,
}

/// Whole-history rollup for one user.  Averages are NULL (not zero) when no
/// populated samples exist; NULL metric fields are excluded from their means.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserSummary {
    pub avg_blink_rate: Option<f64>,
    pub avg_distance: Option<f64>,
    pub total_staring_incidents: i64,
    pub session_count: i64,
    /// Sum of closed-session durations in seconds.  Open sessions are not
    /// counted until they close.
    pub total_session_secs: i64,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("blinkd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        let stmts = [
            "CREATE TABLE IF NOT EXISTS users (
                 id            TEXT PRIMARY KEY,
                 email         TEXT NOT NULL UNIQUE,
                 password_hash TEXT NOT NULL,
                 created_at    TEXT NOT NULL
             )",
            "CREATE TABLE IF NOT EXISTS sessions (
                 id         TEXT PRIMARY KEY,
                 user_id    TEXT NOT NULL REFERENCES users(id),
                 started_at TEXT NOT NULL,
                 ended_at   TEXT
             )",
            "CREATE TABLE IF NOT EXISTS stat_entries (
                 id               TEXT PRIMARY KEY,
                 session_id       TEXT NOT NULL REFERENCES sessions(id),
                 recorded_at      TEXT NOT NULL,
                 blink_rate       REAL,
                 avg_distance     REAL,
                 staring_incidents INTEGER
             )",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_entries_session ON stat_entries(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_entries_recorded ON stat_entries(recorded_at)",
        ];
        for stmt in stmts {
            sqlx::query(stmt).execute(pool).await?;
        }
        Ok(())
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    /// Insert a new user.  Returns `None` when the email is already taken
    /// (UNIQUE violation; email matching is case-sensitive as stored).
    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<Option<UserRow>> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(self.get_user(&id).await?),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    /// Open a new usage session for `user_id`.
    ///
    /// Any prior open session for the same user is closed first, in the same
    /// transaction — at most one session per user is ever open.
    pub async fn start_session(&self, user_id: &str) -> Result<SessionRow> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE user_id = ? AND ended_at IS NULL")
            .bind(&now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO sessions (id, user_id, started_at, ended_at) VALUES (?, ?, ?, NULL)")
            .bind(&id)
            .bind(user_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.get_session(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session not found after insert"))
    }

    /// Close a session.  Idempotent: closing an already-closed or unknown
    /// session is a no-op, so double-submission from a client is harmless.
    pub async fn end_session(&self, id: &str) -> Result<()> {
        let now = now_str();
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ? AND ended_at IS NULL")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        Ok(sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Statistics ─────────────────────────────────────────────────────────

    /// Append one telemetry sample to a session.  Timestamp is assigned
    /// server-side.  Metric values are accepted as-is.
    pub async fn record_statistics(
        &self,
        session_id: &str,
        blink_rate: Option<f64>,
        avg_distance: Option<f64>,
        staring_incidents: Option<i64>,
    ) -> Result<StatEntryRow> {
        let id = Uuid::new_v4().to_string();
        let now = now_str();
        sqlx::query(
            "INSERT INTO stat_entries (id, session_id, recorded_at, blink_rate, avg_distance, staring_incidents)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(&now)
        .bind(blink_rate)
        .bind(avg_distance)
        .bind(staring_incidents)
        .execute(&self.pool)
        .await?;
        let entry = sqlx::query_as("SELECT * FROM stat_entries WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(entry)
    }

    /// All of a user's samples from the last `days` days, across every
    /// session, ordered by recorded_at then id.
    ///
    /// `days` comes straight from the query string with no upper bound.  A
    /// window too wide to represent as a timestamp means "everything", so
    /// overflow degrades to the empty cutoff rather than panicking.
    pub async fn list_statistics(&self, user_id: &str, days: i64) -> Result<Vec<StatEntryRow>> {
        let cutoff = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_default();
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT e.* FROM stat_entries e
                 JOIN sessions s ON e.session_id = s.id
                 WHERE s.user_id = ? AND e.recorded_at >= ?
                 ORDER BY e.recorded_at ASC, e.id ASC",
            )
            .bind(user_id)
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Whole-history rollup for a user.  SQL AVG skips NULLs, which gives the
    /// required treat-missing-as-absent (not as zero) semantics.
    pub async fn summary(&self, user_id: &str) -> Result<UserSummary> {
        let (session_count, total_session_secs): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    CAST(COALESCE(SUM(CASE WHEN ended_at IS NOT NULL
                         THEN strftime('%s', ended_at) - strftime('%s', started_at) END), 0) AS INTEGER)
             FROM sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let (avg_blink_rate, avg_distance, total_staring_incidents): (
            Option<f64>,
            Option<f64>,
            i64,
        ) = sqlx::query_as(
            "SELECT AVG(e.blink_rate), AVG(e.avg_distance),
                    CAST(COALESCE(SUM(e.staring_incidents), 0) AS INTEGER)
             FROM stat_entries e
             JOIN sessions s ON e.session_id = s.id
             WHERE s.user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserSummary {
            avg_blink_rate,
            avg_distance,
            total_staring_incidents,
            session_count,
            total_session_secs,
        })
    }
}
