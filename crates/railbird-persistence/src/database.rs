//! Database connection and schema management

use crate::error::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let connection_string = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await?;

        let db = Self { pool };
        db.initialize_schema().await?;

        info!(db_path = %db_path, "Database initialized");
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize_schema().await?;

        info!("In-memory database initialized");
        Ok(db)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> Result<()> {
        // Historical races table; entries stored as a JSON blob, the
        // queryable dimensions broken out as indexed columns
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS historical_races (
                id TEXT PRIMARY KEY,
                track TEXT NOT NULL,
                race_date TEXT NOT NULL,
                race_number INTEGER NOT NULL,
                surface TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                confidence TEXT NOT NULL,
                field_size INTEGER NOT NULL,
                distance TEXT,
                entries TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Active Platt parameters; single-row table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS platt_parameters (
                key TEXT PRIMARY KEY CHECK (key = 'active'),
                a REAL NOT NULL,
                b REAL NOT NULL,
                fitted_at TEXT NOT NULL,
                race_count INTEGER NOT NULL,
                brier_score REAL NOT NULL,
                log_loss REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Bounded history of fit snapshots
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fit_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                a REAL NOT NULL,
                b REAL NOT NULL,
                fitted_at TEXT NOT NULL,
                race_count INTEGER NOT NULL,
                brier_score REAL NOT NULL,
                log_loss REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Small key-value table for calibration bookkeeping
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calibration_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes for common queries
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_races_track ON historical_races(track);
            CREATE INDEX IF NOT EXISTS idx_races_date ON historical_races(race_date);
            CREATE INDEX IF NOT EXISTS idx_races_status ON historical_races(status);
            CREATE INDEX IF NOT EXISTS idx_races_source ON historical_races(source);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
