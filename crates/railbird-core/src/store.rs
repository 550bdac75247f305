//! Storage capability traits
//!
//! The calibration pipeline depends on these seams, never on a concrete
//! database binding. The persistence crate provides the SQLite
//! implementation; tests use in-memory fakes.

use crate::error::StoreError;
use crate::types::{HistoricalRace, PlattParameters, RaceSource, RaceStatus, Surface};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Indexed query over stored races. All fields optional; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct RaceQuery {
    pub track: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub source: Option<RaceSource>,
    pub status: Option<RaceStatus>,
    pub surface: Option<Surface>,
}

/// Durable CRUD and indexed queries over historical races.
///
/// `save_race` has upsert semantics keyed by `race.id`. The store is the
/// sole writer of race records; components read, modify, and write back.
#[async_trait]
pub trait RaceStore: Send + Sync {
    async fn save_race(&self, race: &HistoricalRace) -> Result<(), StoreError>;

    async fn get_race(&self, id: &str) -> Result<Option<HistoricalRace>, StoreError>;

    async fn delete_race(&self, id: &str) -> Result<(), StoreError>;

    async fn count_races(&self, status: Option<RaceStatus>) -> Result<usize, StoreError>;

    async fn get_all_races(&self) -> Result<Vec<HistoricalRace>, StoreError>;

    async fn query_races(&self, query: &RaceQuery) -> Result<Vec<HistoricalRace>, StoreError>;
}

/// Persistence for fitted parameters and fit bookkeeping.
#[async_trait]
pub trait CalibrationStore: Send + Sync {
    /// Replace the active parameters wholesale.
    async fn save_parameters(&self, params: &PlattParameters) -> Result<(), StoreError>;

    async fn load_parameters(&self) -> Result<Option<PlattParameters>, StoreError>;

    async fn clear_parameters(&self) -> Result<(), StoreError>;

    /// Append a fit snapshot, keeping only the most recent `limit`.
    async fn append_fit_history(
        &self,
        params: &PlattParameters,
        limit: usize,
    ) -> Result<(), StoreError>;

    /// Most recent first.
    async fn load_fit_history(&self) -> Result<Vec<PlattParameters>, StoreError>;

    async fn clear_fit_history(&self) -> Result<(), StoreError>;

    /// Completed-race count at the time of the last successful fit.
    async fn get_last_fit_race_count(&self) -> Result<Option<u32>, StoreError>;

    async fn set_last_fit_race_count(&self, count: u32) -> Result<(), StoreError>;

    async fn clear_last_fit_race_count(&self) -> Result<(), StoreError>;
}
