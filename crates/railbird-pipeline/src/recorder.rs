//! Results recorder
//!
//! Merges official finishing order and odds into a pending race, flipping
//! it to complete. Validation rejects malformed result sets before any
//! mutation; entries the results never mention are treated as scratches.

use chrono::Utc;
use railbird_core::math::implied_probability;
use railbird_core::{RaceResult, RaceStatus, RaceStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Rejection reasons for a result set. No partial mutation is ever applied.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("race {0} not found")]
    RaceNotFound(String),

    #[error("race {0} is already complete")]
    AlreadyComplete(String),

    #[error("results contain no winner (finish position 1)")]
    NoWinner,

    #[error("results contain {0} entries with finish position 1")]
    MultipleWinners(usize),

    #[error("duplicate finish position {0} in results")]
    DuplicateFinishPosition(u32),

    #[error("duplicate program number {0} in results")]
    DuplicateProgramNumber(u32),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Summary of a recorded result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub race_id: String,
    pub winner_program: u32,
    pub winner_name: Option<String>,
    /// Whether the winner carried the best tier the model assigned
    pub top_tier_hit: bool,
    pub scratched: Vec<u32>,
}

pub struct ResultsRecorder {
    store: Arc<dyn RaceStore>,
}

impl ResultsRecorder {
    pub fn new(store: Arc<dyn RaceStore>) -> Self {
        Self { store }
    }

    /// Merge official results into a pending race and mark it complete.
    pub async fn record_results(
        &self,
        race_id: &str,
        results: &[RaceResult],
    ) -> Result<RecordOutcome, RecordError> {
        validate_results(results)?;

        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| RecordError::RaceNotFound(race_id.to_string()))?;
        if race.status == RaceStatus::Complete {
            return Err(RecordError::AlreadyComplete(race_id.to_string()));
        }

        let mut scratched = Vec::new();
        for entry in &mut race.entries {
            match results.iter().find(|r| r.program_number == entry.program_number) {
                Some(result) => {
                    entry.apply_finish(result.finish_position);
                    entry.final_odds = result.final_odds;
                    entry.implied_probability = implied_probability(result.final_odds);
                }
                None => {
                    entry.apply_finish(0);
                    entry.final_odds = 0.0;
                    entry.implied_probability = 0.0;
                    scratched.push(entry.program_number);
                }
            }
        }

        for result in results {
            if !race.entries.iter().any(|e| e.program_number == result.program_number) {
                warn!(
                    race_id,
                    program = result.program_number,
                    "Result for a horse never logged in this race"
                );
            }
        }

        race.status = RaceStatus::Complete;
        race.updated_at = Utc::now();

        let winner = race
            .winner()
            .ok_or(RecordError::NoWinner)?;
        let best_tier = race
            .entries
            .iter()
            .map(|e| e.tier)
            .filter(|t| *t > 0)
            .min();
        let outcome = RecordOutcome {
            race_id: race_id.to_string(),
            winner_program: winner.program_number,
            winner_name: winner.horse_name.clone(),
            top_tier_hit: best_tier.is_some_and(|best| winner.tier == best),
            scratched,
        };

        self.store.save_race(&race).await?;
        info!(
            race_id,
            winner = outcome.winner_program,
            scratched = outcome.scratched.len(),
            "Recorded race results"
        );
        Ok(outcome)
    }

    /// Zero out pre-race scratches on a pending race, renormalizing the
    /// remaining predictions.
    pub async fn mark_scratched(
        &self,
        race_id: &str,
        program_numbers: &[u32],
    ) -> Result<(), RecordError> {
        let mut race = self
            .store
            .get_race(race_id)
            .await?
            .ok_or_else(|| RecordError::RaceNotFound(race_id.to_string()))?;
        if race.status == RaceStatus::Complete {
            return Err(RecordError::AlreadyComplete(race_id.to_string()));
        }

        let scratch: HashSet<u32> = program_numbers.iter().copied().collect();
        for entry in &mut race.entries {
            if scratch.contains(&entry.program_number) {
                entry.predicted_probability = 0.0;
                entry.tier = 0;
            }
        }

        let remaining: f64 = race
            .entries
            .iter()
            .map(|e| e.predicted_probability)
            .sum();
        if remaining > 0.0 {
            for entry in &mut race.entries {
                entry.predicted_probability /= remaining;
            }
        }
        race.field_size = race
            .entries
            .iter()
            .filter(|e| !scratch.contains(&e.program_number))
            .count() as u32;
        race.updated_at = Utc::now();

        self.store.save_race(&race).await?;
        info!(race_id, count = program_numbers.len(), "Marked pre-race scratches");
        Ok(())
    }
}

fn validate_results(results: &[RaceResult]) -> Result<(), RecordError> {
    let winners = results.iter().filter(|r| r.finish_position == 1).count();
    if winners == 0 {
        return Err(RecordError::NoWinner);
    }
    if winners > 1 {
        return Err(RecordError::MultipleWinners(winners));
    }

    let mut positions = HashSet::new();
    let mut programs = HashSet::new();
    for result in results {
        if result.finish_position > 0 && !positions.insert(result.finish_position) {
            return Err(RecordError::DuplicateFinishPosition(result.finish_position));
        }
        if !programs.insert(result.program_number) {
            return Err(RecordError::DuplicateProgramNumber(result.program_number));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryRaceStore;
    use chrono::NaiveDate;
    use railbird_core::{
        ExtractionConfidence, HistoricalEntry, HistoricalRace, RaceSource, Surface,
    };

    fn result(program_number: u32, finish_position: u32, final_odds: f64) -> RaceResult {
        RaceResult {
            program_number,
            finish_position,
            final_odds,
        }
    }

    fn pending_race(programs: &[u32]) -> HistoricalRace {
        let count = programs.len() as f64;
        let entries = programs
            .iter()
            .map(|&pn| {
                let mut entry = HistoricalEntry::empty(pn);
                entry.predicted_probability = 1.0 / count;
                entry.horse_name = Some(format!("Horse{pn}"));
                entry.tier = if pn == 1 { 1 } else { 0 };
                entry
            })
            .collect();
        HistoricalRace {
            id: "SA-2025-06-01-R4".to_string(),
            track: "SA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            race_number: 4,
            distance: Some("6f".to_string()),
            surface: Surface::Dirt,
            field_size: programs.len() as u32,
            entries,
            source: RaceSource::SelfLogged,
            confidence: ExtractionConfidence::High,
            status: RaceStatus::PendingResult,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn setup(programs: &[u32]) -> (Arc<MemoryRaceStore>, ResultsRecorder) {
        let store = Arc::new(MemoryRaceStore::new());
        store.save_race(&pending_race(programs)).await.unwrap();
        (store.clone(), ResultsRecorder::new(store))
    }

    #[tokio::test]
    async fn test_unlisted_entry_becomes_scratch() {
        let (store, recorder) = setup(&[1, 2, 3]).await;

        let outcome = recorder
            .record_results(
                "SA-2025-06-01-R4",
                &[result(1, 1, 3.0), result(2, 2, 5.0)],
            )
            .await
            .unwrap();

        assert_eq!(outcome.winner_program, 1);
        assert_eq!(outcome.scratched, vec![3]);
        assert!(outcome.top_tier_hit);

        let race = store.get_race("SA-2025-06-01-R4").await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::Complete);
        let third = race.entries.iter().find(|e| e.program_number == 3).unwrap();
        assert_eq!(third.finish_position, 0);
        assert!(!third.was_winner && !third.was_placed && !third.was_show);

        let winner = race.winner().unwrap();
        assert_eq!(winner.program_number, 1);
        assert!((winner.implied_probability - 0.25).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_top_tier_miss() {
        let (_, recorder) = setup(&[1, 2]).await;

        // The tier-1 pick (program 1) loses to program 2
        let outcome = recorder
            .record_results(
                "SA-2025-06-01-R4",
                &[result(2, 1, 8.0), result(1, 2, 2.0)],
            )
            .await
            .unwrap();
        assert_eq!(outcome.winner_program, 2);
        assert!(!outcome.top_tier_hit);
    }

    #[tokio::test]
    async fn test_validation_rejects_malformed_results() {
        let (store, recorder) = setup(&[1, 2, 3]).await;
        let id = "SA-2025-06-01-R4";

        let no_winner = recorder
            .record_results(id, &[result(1, 2, 3.0), result(2, 3, 5.0)])
            .await;
        assert!(matches!(no_winner, Err(RecordError::NoWinner)));

        let two_winners = recorder
            .record_results(id, &[result(1, 1, 3.0), result(2, 1, 5.0)])
            .await;
        assert!(matches!(two_winners, Err(RecordError::MultipleWinners(2))));

        let dup_position = recorder
            .record_results(
                id,
                &[result(1, 1, 3.0), result(2, 2, 5.0), result(3, 2, 9.0)],
            )
            .await;
        assert!(matches!(
            dup_position,
            Err(RecordError::DuplicateFinishPosition(2))
        ));

        let dup_program = recorder
            .record_results(id, &[result(1, 1, 3.0), result(1, 2, 5.0)])
            .await;
        assert!(matches!(
            dup_program,
            Err(RecordError::DuplicateProgramNumber(1))
        ));

        // Nothing was mutated along the way
        let race = store.get_race(id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::PendingResult);
        assert!(race.entries.iter().all(|e| e.finish_position == 0));
    }

    #[tokio::test]
    async fn test_unknown_race_and_double_recording_rejected() {
        let (_, recorder) = setup(&[1, 2]).await;

        let missing = recorder
            .record_results("SA-2025-06-01-R9", &[result(1, 1, 3.0)])
            .await;
        assert!(matches!(missing, Err(RecordError::RaceNotFound(_))));

        recorder
            .record_results(
                "SA-2025-06-01-R4",
                &[result(1, 1, 3.0), result(2, 2, 5.0)],
            )
            .await
            .unwrap();
        let again = recorder
            .record_results(
                "SA-2025-06-01-R4",
                &[result(2, 1, 3.0), result(1, 2, 5.0)],
            )
            .await;
        assert!(matches!(again, Err(RecordError::AlreadyComplete(_))));
    }

    #[tokio::test]
    async fn test_mark_scratched_renormalizes_predictions() {
        let (store, recorder) = setup(&[1, 2, 3, 4]).await;

        recorder
            .mark_scratched("SA-2025-06-01-R4", &[4])
            .await
            .unwrap();

        let race = store.get_race("SA-2025-06-01-R4").await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::PendingResult);
        assert_eq!(race.field_size, 3);

        let fourth = race.entries.iter().find(|e| e.program_number == 4).unwrap();
        assert_eq!(fourth.predicted_probability, 0.0);

        let sum: f64 = race.entries.iter().map(|e| e.predicted_probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let first = race.entries.iter().find(|e| e.program_number == 1).unwrap();
        assert!((first.predicted_probability - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mark_scratched_rejected_on_complete_race() {
        let (_, recorder) = setup(&[1, 2]).await;
        recorder
            .record_results(
                "SA-2025-06-01-R4",
                &[result(1, 1, 3.0), result(2, 2, 5.0)],
            )
            .await
            .unwrap();

        let err = recorder.mark_scratched("SA-2025-06-01-R4", &[2]).await;
        assert!(matches!(err, Err(RecordError::AlreadyComplete(_))));
    }
}
