//! Calibration state repository
//!
//! Persists the active Platt parameters, the bounded fit history, and the
//! last-fit race count used to decide when recalibration is due.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railbird_core::{CalibrationStore, PlattParameters, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

const LAST_FIT_COUNT_KEY: &str = "last_fit_race_count";

/// Repository for fitted parameters and fit bookkeeping
pub struct CalibrationRepository {
    pool: Pool<Sqlite>,
}

impl CalibrationRepository {
    /// Create a new repository
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_params(row: &SqliteRow) -> PlattParameters {
        let fitted_text: String = row.get("fitted_at");
        PlattParameters {
            a: row.get("a"),
            b: row.get("b"),
            fitted_at: DateTime::parse_from_rfc3339(&fitted_text)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            race_count: row.get::<i64, _>("race_count") as u32,
            brier_score: row.get("brier_score"),
            log_loss: row.get("log_loss"),
        }
    }
}

#[async_trait]
impl CalibrationStore for CalibrationRepository {
    async fn save_parameters(&self, params: &PlattParameters) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO platt_parameters (key, a, b, fitted_at, race_count, brier_score, log_loss)
            VALUES ('active', ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                a = excluded.a,
                b = excluded.b,
                fitted_at = excluded.fitted_at,
                race_count = excluded.race_count,
                brier_score = excluded.brier_score,
                log_loss = excluded.log_loss
            "#,
        )
        .bind(params.a)
        .bind(params.b)
        .bind(params.fitted_at.to_rfc3339())
        .bind(params.race_count as i64)
        .bind(params.brier_score)
        .bind(params.log_loss)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(a = params.a, b = params.b, "Saved active Platt parameters");
        Ok(())
    }

    async fn load_parameters(&self) -> Result<Option<PlattParameters>, StoreError> {
        let row = sqlx::query("SELECT * FROM platt_parameters WHERE key = 'active'")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_params))
    }

    async fn clear_parameters(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM platt_parameters WHERE key = 'active'")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!("Cleared active Platt parameters");
        Ok(())
    }

    async fn append_fit_history(
        &self,
        params: &PlattParameters,
        limit: usize,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fit_history (a, b, fitted_at, race_count, brier_score, log_loss)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(params.a)
        .bind(params.b)
        .bind(params.fitted_at.to_rfc3339())
        .bind(params.race_count as i64)
        .bind(params.brier_score)
        .bind(params.log_loss)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Keep only the most recent `limit` snapshots
        sqlx::query(
            r#"
            DELETE FROM fit_history
            WHERE id NOT IN (SELECT id FROM fit_history ORDER BY id DESC LIMIT ?)
            "#,
        )
        .bind(limit as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn load_fit_history(&self) -> Result<Vec<PlattParameters>, StoreError> {
        let rows = sqlx::query("SELECT * FROM fit_history ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_params).collect())
    }

    async fn clear_fit_history(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM fit_history")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_last_fit_race_count(&self) -> Result<Option<u32>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM calibration_meta WHERE key = ?")
                .bind(LAST_FIT_COUNT_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn set_last_fit_race_count(&self, count: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO calibration_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_FIT_COUNT_KEY)
        .bind(count.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear_last_fit_race_count(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM calibration_meta WHERE key = ?")
            .bind(LAST_FIT_COUNT_KEY)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn setup() -> CalibrationRepository {
        let db = Database::in_memory().await.unwrap();
        CalibrationRepository::new(db.pool().clone())
    }

    fn params(a: f64, b: f64) -> PlattParameters {
        PlattParameters {
            a,
            b,
            fitted_at: Utc::now(),
            race_count: 600,
            brier_score: 0.18,
            log_loss: 0.55,
        }
    }

    #[tokio::test]
    async fn test_parameters_round_trip() {
        let repo = setup().await;
        assert!(repo.load_parameters().await.unwrap().is_none());

        repo.save_parameters(&params(1.2, -0.3)).await.unwrap();
        let loaded = repo.load_parameters().await.unwrap().unwrap();
        assert!((loaded.a - 1.2).abs() < 1e-12);
        assert!((loaded.b + 0.3).abs() < 1e-12);
        assert_eq!(loaded.race_count, 600);

        // Wholesale replacement
        repo.save_parameters(&params(0.9, 0.1)).await.unwrap();
        let loaded = repo.load_parameters().await.unwrap().unwrap();
        assert!((loaded.a - 0.9).abs() < 1e-12);

        repo.clear_parameters().await.unwrap();
        assert!(repo.load_parameters().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fit_history_is_bounded() {
        let repo = setup().await;
        for i in 0..25 {
            repo.append_fit_history(&params(1.0 + i as f64 * 0.01, 0.0), 20)
                .await
                .unwrap();
        }

        let history = repo.load_fit_history().await.unwrap();
        assert_eq!(history.len(), 20);
        // Most recent first
        assert!((history[0].a - 1.24).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_last_fit_race_count() {
        let repo = setup().await;
        assert!(repo.get_last_fit_race_count().await.unwrap().is_none());

        repo.set_last_fit_race_count(512).await.unwrap();
        assert_eq!(repo.get_last_fit_race_count().await.unwrap(), Some(512));

        repo.set_last_fit_race_count(601).await.unwrap();
        assert_eq!(repo.get_last_fit_race_count().await.unwrap(), Some(601));

        repo.clear_last_fit_race_count().await.unwrap();
        assert!(repo.get_last_fit_race_count().await.unwrap().is_none());
    }
}
