//! Auto-logger
//!
//! The hook the host calls after each card is parsed, scored, or resolved.
//! Runs extraction, prediction logging, and result recording against the
//! shared store, then pokes the calibration manager. Every step absorbs
//! its own failures; calibration never blocks the host's flow.

use crate::extractor::{Extractor, ExtractorConfig};
use crate::logger::PredictionLogger;
use crate::recorder::ResultsRecorder;
use railbird_calibration::CalibrationManager;
use railbird_core::{ParsedRaceCard, RaceResult, RaceStore, ScoredRaceCard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// What one auto-logging hook accomplished
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoLogReport {
    /// Races recovered from form lines
    pub races_extracted: usize,
    /// Recovered races actually written (new, or better than the stored copy)
    pub races_saved: usize,
    /// Whether predictions were logged
    pub predictions_logged: bool,
    /// Whether results were merged
    pub results_recorded: bool,
    /// Calibration readiness after the hook ran
    pub calibration_ready: bool,
    pub notes: Vec<String>,
}

pub struct AutoLogger {
    store: Arc<dyn RaceStore>,
    manager: Arc<CalibrationManager>,
    extractor: Extractor,
    logger: PredictionLogger,
    recorder: ResultsRecorder,
}

impl AutoLogger {
    pub fn new(
        store: Arc<dyn RaceStore>,
        manager: Arc<CalibrationManager>,
        extractor_config: ExtractorConfig,
    ) -> Self {
        Self {
            extractor: Extractor::new(extractor_config),
            logger: PredictionLogger::new(store.clone()),
            recorder: ResultsRecorder::new(store.clone()),
            store,
            manager,
        }
    }

    /// After a card is parsed: harvest its form-line history into the
    /// dataset, keeping the richer copy of any race already stored.
    pub async fn on_card_parsed(&self, card: &ParsedRaceCard) -> AutoLogReport {
        let mut report = AutoLogReport::default();
        let extraction = self.extractor.extract(card);
        report.races_extracted = extraction.races.len();

        for race in &extraction.races {
            let existing = match self.store.get_race(&race.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    warn!(race_id = %race.id, error = %e, "Lookup failed; skipping recovered race");
                    report.notes.push(format!("lookup failed for {}", race.id));
                    continue;
                }
            };
            if let Some(existing) = existing {
                if existing.entries.len() >= race.entries.len() {
                    debug!(race_id = %race.id, "Stored copy is at least as rich; keeping it");
                    continue;
                }
            }
            match self.store.save_race(race).await {
                Ok(()) => report.races_saved += 1,
                Err(e) => {
                    warn!(race_id = %race.id, error = %e, "Failed to save recovered race");
                    report.notes.push(format!("save failed for {}", race.id));
                }
            }
        }

        report.calibration_ready = self.manager.check_readiness().await;
        report
    }

    /// After a card is scored: log predictions for the pending race.
    pub async fn on_card_scored(&self, card: &ScoredRaceCard) -> AutoLogReport {
        let mut report = AutoLogReport::default();
        let outcome = self.logger.log_predictions(card).await;
        report.predictions_logged = outcome.logged;
        if let Some(reason) = outcome.reason {
            report.notes.push(format!("{}: {}", outcome.race_id, reason));
        }
        report.calibration_ready = self.manager.status().await.is_ready;
        report
    }

    /// After official results arrive: merge them and re-check readiness,
    /// since a newly completed race may tip a fit.
    pub async fn on_results(&self, race_id: &str, results: &[RaceResult]) -> AutoLogReport {
        let mut report = AutoLogReport::default();
        match self.recorder.record_results(race_id, results).await {
            Ok(outcome) => {
                report.results_recorded = true;
                if !outcome.scratched.is_empty() {
                    report
                        .notes
                        .push(format!("{race_id}: {} scratched", outcome.scratched.len()));
                }
            }
            Err(e) => {
                warn!(race_id, error = %e, "Failed to record results");
                report.notes.push(format!("{race_id}: {e}"));
            }
        }
        report.calibration_ready = self.manager.check_readiness().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryRaceStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use railbird_calibration::ManagerConfig;
    use railbird_core::{
        CalibrationStore, ParsedHorse, ParsedRace, PastPerformance, PlattParameters, RaceStatus,
        ScoredHorse, StoreError,
    };
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MemoryCalibrationStore {
        parameters: RwLock<Option<PlattParameters>>,
        history: RwLock<Vec<PlattParameters>>,
        last_fit: RwLock<Option<u32>>,
    }

    #[async_trait]
    impl CalibrationStore for MemoryCalibrationStore {
        async fn save_parameters(&self, params: &PlattParameters) -> Result<(), StoreError> {
            *self.parameters.write().await = Some(params.clone());
            Ok(())
        }

        async fn load_parameters(&self) -> Result<Option<PlattParameters>, StoreError> {
            Ok(self.parameters.read().await.clone())
        }

        async fn clear_parameters(&self) -> Result<(), StoreError> {
            *self.parameters.write().await = None;
            Ok(())
        }

        async fn append_fit_history(
            &self,
            params: &PlattParameters,
            limit: usize,
        ) -> Result<(), StoreError> {
            let mut history = self.history.write().await;
            history.insert(0, params.clone());
            history.truncate(limit);
            Ok(())
        }

        async fn load_fit_history(&self) -> Result<Vec<PlattParameters>, StoreError> {
            Ok(self.history.read().await.clone())
        }

        async fn clear_fit_history(&self) -> Result<(), StoreError> {
            self.history.write().await.clear();
            Ok(())
        }

        async fn get_last_fit_race_count(&self) -> Result<Option<u32>, StoreError> {
            Ok(*self.last_fit.read().await)
        }

        async fn set_last_fit_race_count(&self, count: u32) -> Result<(), StoreError> {
            *self.last_fit.write().await = Some(count);
            Ok(())
        }

        async fn clear_last_fit_race_count(&self) -> Result<(), StoreError> {
            *self.last_fit.write().await = None;
            Ok(())
        }
    }

    fn auto_logger() -> (Arc<MemoryRaceStore>, AutoLogger) {
        let store = Arc::new(MemoryRaceStore::new());
        let manager = Arc::new(CalibrationManager::new(
            store.clone(),
            Arc::new(MemoryCalibrationStore::default()),
            ManagerConfig::default(),
        ));
        let logger = AutoLogger::new(store.clone(), manager, ExtractorConfig::default());
        (store, logger)
    }

    fn parsed_card() -> ParsedRaceCard {
        let pp = |finish: u32| PastPerformance {
            date_text: "2025-05-01".to_string(),
            track: "CD".to_string(),
            race_number: 3,
            distance: Some("6f".to_string()),
            surface: Some("dirt".to_string()),
            finish_position: finish,
            field_size: 8,
            final_odds: Some(4.0),
            speed_figure: Some(80),
            track_condition: Some("fast".to_string()),
            classification: None,
            purse: None,
        };
        ParsedRaceCard {
            track: "SA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            races: vec![ParsedRace {
                number: 1,
                horses: vec![
                    ParsedHorse {
                        program_number: 1,
                        name: "Alpha".to_string(),
                        scratched: false,
                        past_performances: vec![pp(1)],
                    },
                    ParsedHorse {
                        program_number: 2,
                        name: "Bravo".to_string(),
                        scratched: false,
                        past_performances: vec![pp(4)],
                    },
                ],
            }],
        }
    }

    fn scored_card() -> ScoredRaceCard {
        let scored = |pn: u32, score: f64, rank: u32| ScoredHorse {
            program_number: pn,
            name: format!("Horse{pn}"),
            scratched: false,
            raw_score: score,
            overlay_score: score,
            rank,
            morning_line_odds: None,
        };
        ScoredRaceCard {
            track: "SA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            race_number: 4,
            surface: Some("dirt".to_string()),
            distance: Some("6f".to_string()),
            horses: vec![scored(1, 230.0, 1), scored(2, 180.0, 2)],
        }
    }

    #[tokio::test]
    async fn test_parsed_card_feeds_the_dataset() {
        let (store, logger) = auto_logger();

        let report = logger.on_card_parsed(&parsed_card()).await;
        assert_eq!(report.races_extracted, 1);
        assert_eq!(report.races_saved, 1);
        assert!(!report.calibration_ready);

        let race = store.get_race("CD-2025-05-01-R3").await.unwrap().unwrap();
        assert_eq!(race.entries.len(), 2);

        // Re-running the same card saves nothing new
        let again = logger.on_card_parsed(&parsed_card()).await;
        assert_eq!(again.races_saved, 0);
        assert_eq!(store.count_races(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scored_then_resolved_round_trip() {
        let (store, logger) = auto_logger();

        let scored = logger.on_card_scored(&scored_card()).await;
        assert!(scored.predictions_logged);

        let pending = store.get_race("SA-2025-06-01-R4").await.unwrap().unwrap();
        assert_eq!(pending.status, RaceStatus::PendingResult);

        let resolved = logger
            .on_results(
                "SA-2025-06-01-R4",
                &[
                    RaceResult {
                        program_number: 1,
                        finish_position: 1,
                        final_odds: 2.0,
                    },
                    RaceResult {
                        program_number: 2,
                        finish_position: 2,
                        final_odds: 6.0,
                    },
                ],
            )
            .await;
        assert!(resolved.results_recorded);

        let complete = store.get_race("SA-2025-06-01-R4").await.unwrap().unwrap();
        assert_eq!(complete.status, RaceStatus::Complete);
        assert_eq!(complete.winner().unwrap().program_number, 1);
    }

    #[tokio::test]
    async fn test_failed_recording_is_absorbed() {
        let (_, logger) = auto_logger();

        let report = logger.on_results("SA-2025-06-01-R9", &[]).await;
        assert!(!report.results_recorded);
        assert_eq!(report.notes.len(), 1);
    }
}
