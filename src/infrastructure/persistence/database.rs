use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Owns the SQLite connection pool and the idempotent schema init, mirroring
/// the teacher's `Database::new`/`init` split: construction never mutates the
/// schema, `init` does and can be called repeatedly.
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).context("creating database directory")?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .context("parsing DATABASE_URL")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to sqlite")?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (pair, timeframe, timestamp)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating candles table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_candles_lookup ON candles (pair, timeframe, timestamp DESC)",
        )
        .execute(&mut *conn)
        .await
        .context("creating candles index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                strength TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                risk_reward_ratio TEXT NOT NULL,
                position_size_hint TEXT NOT NULL,
                source TEXT NOT NULL,
                model_version TEXT,
                generated_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                technical_snapshot TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating signals table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_signals_instrument ON signals (pair, timeframe, generated_at DESC)",
        )
        .execute(&mut *conn)
        .await
        .context("creating signals index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS instrument_state (
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                last_signal_json TEXT,
                last_change_at TEXT,
                PRIMARY KEY (pair, timeframe)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating instrument_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_changes (
                id TEXT PRIMARY KEY,
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                prior_action TEXT,
                new_action TEXT NOT NULL,
                prior_confidence REAL,
                new_confidence REAL NOT NULL,
                strength TEXT NOT NULL,
                reason TEXT NOT NULL,
                generated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating signal_changes table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                platform_identity TEXT NOT NULL UNIQUE,
                preferences_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating subscribers table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                subscriber_id TEXT NOT NULL,
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                filter_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (subscriber_id, pair, timeframe)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating subscriptions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                subscriber_id TEXT NOT NULL,
                pair TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                size TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_price TEXT,
                closed_at TEXT,
                realized_pnl_pips TEXT,
                notes TEXT
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating positions table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_positions_subscriber ON positions (subscriber_id, status)",
        )
        .execute(&mut *conn)
        .await
        .context("creating positions index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS position_monitoring (
                position_id TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                current_price TEXT NOT NULL,
                unrealized_pnl_pips TEXT NOT NULL,
                unrealized_pnl_pct TEXT NOT NULL,
                high_watermark TEXT NOT NULL,
                low_watermark TEXT NOT NULL,
                sl_armed INTEGER NOT NULL,
                tp_armed INTEGER NOT NULL,
                PRIMARY KEY (position_id, observed_at)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating position_monitoring table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_cooldown (
                subscriber_id TEXT NOT NULL,
                action TEXT NOT NULL,
                last_notified_at TEXT NOT NULL,
                PRIMARY KEY (subscriber_id, action)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating delivery_cooldown table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_daily_count (
                subscriber_id TEXT NOT NULL,
                day TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (subscriber_id, day)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("creating delivery_daily_count table")?;

        info!("database schema initialized");
        Ok(())
    }
}
