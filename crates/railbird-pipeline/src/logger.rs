//! Prediction logger
//!
//! Turns a scored race card into a pending historical race before the
//! result is known. Raw scores become win probabilities via a logistic
//! squash with a field-size adjustment, normalized so the active field
//! sums to 1.

use chrono::Utc;
use railbird_core::math::{race_id, stable_sigmoid};
use railbird_core::{
    ExtractionConfidence, HistoricalEntry, HistoricalRace, RaceSource, RaceStatus, RaceStore,
    ScoredHorse, ScoredRaceCard, Surface,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Center of the raw score scale; a score here squashes to p = 0.5 before
/// the field-size adjustment.
const SCORE_MIDPOINT: f64 = 165.0;
/// Score units per logit
const SCORE_SPREAD: f64 = 40.0;
/// Field size at which the adjustment is neutral
const REFERENCE_FIELD_SIZE: f64 = 8.0;

/// What happened to one logging attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOutcome {
    pub race_id: String,
    pub logged: bool,
    /// Why nothing was logged, when `logged` is false
    pub reason: Option<String>,
}

impl LogOutcome {
    fn skipped(race_id: String, reason: impl Into<String>) -> Self {
        Self {
            race_id,
            logged: false,
            reason: Some(reason.into()),
        }
    }
}

pub struct PredictionLogger {
    store: Arc<dyn RaceStore>,
}

impl PredictionLogger {
    pub fn new(store: Arc<dyn RaceStore>) -> Self {
        Self { store }
    }

    /// Persist model predictions for a scored card as a pending race.
    ///
    /// Logging the same race again while it is still pending updates the
    /// predictions in place. Logging against a completed race is a no-op;
    /// its outcome is already on the books.
    pub async fn log_predictions(&self, card: &ScoredRaceCard) -> LogOutcome {
        let id = race_id(&card.track, card.date, card.race_number);

        let active: Vec<&ScoredHorse> = card.horses.iter().filter(|h| !h.scratched).collect();
        if active.len() < 2 {
            return LogOutcome::skipped(id, "fewer than two active horses");
        }

        let probabilities = field_probabilities(&active);

        let existing = match self.store.get_race(&id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(race_id = %id, error = %e, "Failed to look up race before logging");
                return LogOutcome::skipped(id, "storage unavailable");
            }
        };

        let mut race = match existing {
            Some(race) if race.status == RaceStatus::Complete => {
                warn!(race_id = %id, "Refusing to overwrite predictions on a completed race");
                return LogOutcome::skipped(id, "race already complete");
            }
            Some(race) => race,
            None => HistoricalRace {
                id: id.clone(),
                track: card.track.trim().to_uppercase(),
                date: card.date,
                race_number: card.race_number,
                distance: card.distance.clone(),
                surface: card.surface.as_deref().map(Surface::parse).unwrap_or_default(),
                field_size: active.len() as u32,
                entries: Vec::new(),
                source: RaceSource::SelfLogged,
                confidence: ExtractionConfidence::High,
                status: RaceStatus::PendingResult,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        };

        race.field_size = active.len() as u32;
        race.entries = active
            .iter()
            .zip(&probabilities)
            .map(|(h, &p)| {
                let mut entry = HistoricalEntry::empty(h.program_number);
                entry.predicted_probability = p;
                entry.raw_score = h.raw_score;
                entry.overlay_score = h.overlay_score;
                entry.tier = determine_tier(h.raw_score, h.rank, h.morning_line_odds, p);
                entry.horse_name = Some(h.name.clone());
                entry.morning_line_odds = h.morning_line_odds;
                entry
            })
            .collect();
        race.updated_at = Utc::now();

        if let Err(e) = self.store.save_race(&race).await {
            warn!(race_id = %id, error = %e, "Failed to persist logged predictions");
            return LogOutcome::skipped(id, "storage unavailable");
        }

        info!(
            race_id = %id,
            horses = race.entries.len(),
            "Logged predictions for pending race"
        );
        LogOutcome {
            race_id: id,
            logged: true,
            reason: None,
        }
    }
}

/// Raw win probabilities for the active field, summing to 1.
fn field_probabilities(active: &[&ScoredHorse]) -> Vec<f64> {
    let field_size = active.len() as f64;
    let scale = (REFERENCE_FIELD_SIZE / field_size).clamp(0.5, 2.0);

    let raw: Vec<f64> = active
        .iter()
        .map(|h| {
            let z = (h.raw_score - SCORE_MIDPOINT) / SCORE_SPREAD;
            stable_sigmoid(z) * scale
        })
        .collect();

    let sum: f64 = raw.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        raw.iter().map(|p| p / sum).collect()
    } else {
        vec![1.0 / field_size; active.len()]
    }
}

/// Betting tier from score, rank, and the morning line.
///
/// Tier 3 flags value: the morning line pays at least 50% over the fair
/// odds implied by the model's own field-adjusted probability.
pub fn determine_tier(
    score: f64,
    rank: u32,
    morning_line_odds: Option<f64>,
    probability: f64,
) -> u8 {
    if score >= 220.0 && rank <= 2 {
        return 1;
    }
    if score >= 190.0 && rank <= 4 {
        return 2;
    }
    if let Some(ml) = morning_line_odds {
        if probability > 0.0 && probability < 1.0 {
            let fair_odds = 1.0 / probability - 1.0;
            if ml >= fair_odds * 1.5 {
                return 3;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryRaceStore;
    use chrono::NaiveDate;

    fn scored(program_number: u32, name: &str, score: f64, rank: u32) -> ScoredHorse {
        ScoredHorse {
            program_number,
            name: name.to_string(),
            scratched: false,
            raw_score: score,
            overlay_score: score,
            rank,
            morning_line_odds: None,
        }
    }

    fn scored_card(horses: Vec<ScoredHorse>) -> ScoredRaceCard {
        ScoredRaceCard {
            track: "SA".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            race_number: 4,
            surface: Some("dirt".to_string()),
            distance: Some("6f".to_string()),
            horses,
        }
    }

    #[tokio::test]
    async fn test_logs_pending_race_with_normalized_probabilities() {
        let store = Arc::new(MemoryRaceStore::new());
        let logger = PredictionLogger::new(store.clone());

        let outcome = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 230.0, 1),
                scored(2, "Bravo", 180.0, 2),
                scored(3, "Chaser", 140.0, 3),
            ]))
            .await;

        assert!(outcome.logged);
        assert_eq!(outcome.race_id, "SA-2025-06-01-R4");

        let race = store.get_race(&outcome.race_id).await.unwrap().unwrap();
        assert_eq!(race.status, RaceStatus::PendingResult);
        assert_eq!(race.source, RaceSource::SelfLogged);
        assert_eq!(race.entries.len(), 3);

        let sum: f64 = race.entries.iter().map(|e| e.predicted_probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        // Higher score, higher probability
        assert!(
            race.entries[0].predicted_probability > race.entries[1].predicted_probability
        );
        assert!(
            race.entries[1].predicted_probability > race.entries[2].predicted_probability
        );
        // No result yet
        assert!(race.entries.iter().all(|e| e.finish_position == 0));
    }

    #[tokio::test]
    async fn test_scratched_horses_excluded() {
        let store = Arc::new(MemoryRaceStore::new());
        let logger = PredictionLogger::new(store.clone());

        let mut late_scratch = scored(3, "Chaser", 200.0, 2);
        late_scratch.scratched = true;

        let outcome = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 230.0, 1),
                scored(2, "Bravo", 180.0, 3),
                late_scratch,
            ]))
            .await;

        let race = store.get_race(&outcome.race_id).await.unwrap().unwrap();
        assert_eq!(race.entries.len(), 2);
        assert_eq!(race.field_size, 2);
        assert!(race.entries.iter().all(|e| e.program_number != 3));
    }

    #[tokio::test]
    async fn test_relogging_pending_race_updates_in_place() {
        let store = Arc::new(MemoryRaceStore::new());
        let logger = PredictionLogger::new(store.clone());

        let first = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 230.0, 1),
                scored(2, "Bravo", 180.0, 2),
            ]))
            .await;
        let before = store.get_race(&first.race_id).await.unwrap().unwrap();

        // Bravo's score improves on the re-run
        let second = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 230.0, 1),
                scored(2, "Bravo", 225.0, 2),
            ]))
            .await;
        assert!(second.logged);

        let after = store.get_race(&first.race_id).await.unwrap().unwrap();
        assert_eq!(store.count_races(None).await.unwrap(), 1);
        assert!(
            after.entries[1].predicted_probability > before.entries[1].predicted_probability
        );
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_logging_completed_race_is_a_no_op() {
        let store = Arc::new(MemoryRaceStore::new());
        let logger = PredictionLogger::new(store.clone());

        let first = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 230.0, 1),
                scored(2, "Bravo", 180.0, 2),
            ]))
            .await;

        let mut race = store.get_race(&first.race_id).await.unwrap().unwrap();
        race.status = RaceStatus::Complete;
        store.save_race(&race).await.unwrap();

        let outcome = logger
            .log_predictions(&scored_card(vec![
                scored(1, "Alpha", 250.0, 1),
                scored(2, "Bravo", 180.0, 2),
            ]))
            .await;
        assert!(!outcome.logged);
        assert_eq!(outcome.reason.as_deref(), Some("race already complete"));
    }

    #[tokio::test]
    async fn test_single_active_horse_skipped() {
        let store = Arc::new(MemoryRaceStore::new());
        let logger = PredictionLogger::new(store.clone());

        let outcome = logger
            .log_predictions(&scored_card(vec![scored(1, "Alpha", 230.0, 1)]))
            .await;
        assert!(!outcome.logged);
        assert_eq!(store.count_races(None).await.unwrap(), 0);
    }

    #[test]
    fn test_smaller_fields_get_higher_average_probability() {
        let small: Vec<ScoredHorse> = (1..=4)
            .map(|i| scored(i, "H", 165.0, i))
            .collect();
        let large: Vec<ScoredHorse> = (1..=12)
            .map(|i| scored(i, "H", 165.0, i))
            .collect();

        let small_refs: Vec<&ScoredHorse> = small.iter().collect();
        let large_refs: Vec<&ScoredHorse> = large.iter().collect();

        let small_avg = field_probabilities(&small_refs).iter().sum::<f64>() / 4.0;
        let large_avg = field_probabilities(&large_refs).iter().sum::<f64>() / 12.0;
        assert!(small_avg > large_avg);
    }

    #[test]
    fn test_determine_tier_thresholds() {
        assert_eq!(determine_tier(225.0, 1, None, 0.3), 1);
        assert_eq!(determine_tier(225.0, 3, None, 0.3), 2);
        assert_eq!(determine_tier(195.0, 4, None, 0.2), 2);
        assert_eq!(determine_tier(150.0, 6, None, 0.1), 0);

        // Fair odds at p = 0.2 are 4.0; a 6.0 morning line is 50% over
        assert_eq!(determine_tier(150.0, 6, Some(6.0), 0.2), 3);
        assert_eq!(determine_tier(150.0, 6, Some(5.0), 0.2), 0);
    }
}
