//! Historical race repository
//!
//! Upsert-keyed CRUD plus indexed queries over the `historical_races`
//! table. Implements the `RaceStore` seam the rest of the pipeline
//! depends on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use railbird_core::{
    ExtractionConfidence, HistoricalEntry, HistoricalRace, RaceQuery, RaceSource, RaceStatus,
    RaceStore, StoreError, Surface,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// Repository for historical race records
pub struct RaceRepository {
    pool: Pool<Sqlite>,
}

impl RaceRepository {
    /// Create a new repository
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn row_to_race(row: &SqliteRow) -> Result<HistoricalRace, StoreError> {
        let entries_json: String = row.get("entries");
        let entries: Vec<HistoricalEntry> = serde_json::from_str(&entries_json)?;

        let date_text: String = row.get("race_date");
        let date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
            .map_err(|e| StoreError::Serialization(format!("bad race_date {date_text}: {e}")))?;

        let source_text: String = row.get("source");
        let source = RaceSource::parse(&source_text)
            .ok_or_else(|| StoreError::Serialization(format!("bad source {source_text}")))?;

        let status_text: String = row.get("status");
        let status = RaceStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Serialization(format!("bad status {status_text}")))?;

        let confidence_text: String = row.get("confidence");
        let confidence = ExtractionConfidence::parse(&confidence_text)
            .unwrap_or(ExtractionConfidence::Low);

        let surface_text: String = row.get("surface");

        Ok(HistoricalRace {
            id: row.get("id"),
            track: row.get("track"),
            date,
            race_number: row.get::<i64, _>("race_number") as u32,
            distance: row.get("distance"),
            surface: Surface::parse(&surface_text),
            field_size: row.get::<i64, _>("field_size") as u32,
            entries,
            source,
            confidence,
            status,
            created_at: parse_timestamp(row.get("created_at")),
            updated_at: parse_timestamp(row.get("updated_at")),
        })
    }
}

#[async_trait]
impl RaceStore for RaceRepository {
    async fn save_race(&self, race: &HistoricalRace) -> Result<(), StoreError> {
        let entries = serde_json::to_string(&race.entries)?;

        sqlx::query(
            r#"
            INSERT INTO historical_races (
                id, track, race_date, race_number, surface, source, status,
                confidence, field_size, distance, entries, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                track = excluded.track,
                race_date = excluded.race_date,
                race_number = excluded.race_number,
                surface = excluded.surface,
                source = excluded.source,
                status = excluded.status,
                confidence = excluded.confidence,
                field_size = excluded.field_size,
                distance = excluded.distance,
                entries = excluded.entries,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&race.id)
        .bind(&race.track)
        .bind(race.date.format("%Y-%m-%d").to_string())
        .bind(race.race_number as i64)
        .bind(race.surface.to_string())
        .bind(race.source.to_string())
        .bind(race.status.to_string())
        .bind(race.confidence.to_string())
        .bind(race.field_size as i64)
        .bind(&race.distance)
        .bind(entries)
        .bind(race.created_at.to_rfc3339())
        .bind(race.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(race_id = %race.id, status = %race.status, "Saved historical race");
        Ok(())
    }

    async fn get_race(&self, id: &str) -> Result<Option<HistoricalRace>, StoreError> {
        let row = sqlx::query("SELECT * FROM historical_races WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_race(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_race(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM historical_races WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!(race_id = %id, "Deleted historical race");
        Ok(())
    }

    async fn count_races(&self, status: Option<RaceStatus>) -> Result<usize, StoreError> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM historical_races WHERE status = ?")
                    .bind(status.to_string())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM historical_races")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(count as usize)
    }

    async fn get_all_races(&self) -> Result<Vec<HistoricalRace>, StoreError> {
        let rows = sqlx::query("SELECT * FROM historical_races ORDER BY race_date, race_number")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_race).collect()
    }

    async fn query_races(&self, query: &RaceQuery) -> Result<Vec<HistoricalRace>, StoreError> {
        let mut sql = String::from("SELECT * FROM historical_races WHERE 1=1");
        if query.track.is_some() {
            sql.push_str(" AND track = ?");
        }
        if query.date_from.is_some() {
            sql.push_str(" AND race_date >= ?");
        }
        if query.date_to.is_some() {
            sql.push_str(" AND race_date <= ?");
        }
        if query.source.is_some() {
            sql.push_str(" AND source = ?");
        }
        if query.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if query.surface.is_some() {
            sql.push_str(" AND surface = ?");
        }
        sql.push_str(" ORDER BY race_date, race_number");

        let mut q = sqlx::query(&sql);
        if let Some(track) = &query.track {
            q = q.bind(track.trim().to_uppercase());
        }
        if let Some(from) = query.date_from {
            q = q.bind(from.format("%Y-%m-%d").to_string());
        }
        if let Some(to) = query.date_to {
            q = q.bind(to.format("%Y-%m-%d").to_string());
        }
        if let Some(source) = query.source {
            q = q.bind(source.to_string());
        }
        if let Some(status) = query.status {
            q = q.bind(status.to_string());
        }
        if let Some(surface) = query.surface {
            q = q.bind(surface.to_string());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.iter().map(Self::row_to_race).collect()
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
