//! Dataset manager
//!
//! Readiness checks, filtering, bucketed views, ROI breakdowns, and an
//! integrity report over the historical race store. Storage failures
//! degrade to "not ready / empty" defaults; nothing here throws.

use chrono::NaiveDate;
use railbird_core::{
    DatasetSummary, HistoricalRace, RaceQuery, RaceSource, RaceStatus, RaceStore, Surface,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Dataset thresholds and bucket widths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Completed races required before calibration is attempted
    #[serde(default = "default_min_races")]
    pub min_races_for_calibration: usize,

    /// Lower bound that gates partial-analysis features
    #[serde(default = "default_min_partial")]
    pub min_races_for_partial: usize,

    #[serde(default = "default_probability_bucket_width")]
    pub probability_bucket_width: f64,

    /// Raw score bucket width over the 0-380 score domain
    #[serde(default = "default_score_bucket_width")]
    pub score_bucket_width: f64,
}

fn default_min_races() -> usize {
    500
}

fn default_min_partial() -> usize {
    100
}

fn default_probability_bucket_width() -> f64 {
    0.1
}

fn default_score_bucket_width() -> f64 {
    20.0
}

/// Upper end of the raw handicapping score domain.
const SCORE_DOMAIN_MAX: f64 = 380.0;

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            min_races_for_calibration: default_min_races(),
            min_races_for_partial: default_min_partial(),
            probability_bucket_width: default_probability_bucket_width(),
            score_bucket_width: default_score_bucket_width(),
        }
    }
}

/// In-memory filter over completed races
#[derive(Debug, Clone, Default)]
pub struct RaceFilter {
    pub track: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub surface: Option<Surface>,
    pub distance: Option<String>,
    pub source: Option<RaceSource>,
    pub min_field_size: Option<u32>,
    pub max_field_size: Option<u32>,
}

/// Win-rate bucket keyed by predicted probability range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityBucket {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub winners: usize,
    pub win_rate: f64,
    pub avg_predicted: f64,
}

/// Win-rate bucket keyed by raw score range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub winners: usize,
    pub win_rate: f64,
}

/// Per-tier performance with flat-stake ROI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStats {
    pub tier: u8,
    pub count: usize,
    pub winners: usize,
    pub win_rate: f64,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
    /// `(returned - staked) / staked`
    pub roi: Decimal,
}

/// Per-surface aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceStats {
    pub surface: Surface,
    pub races: usize,
    pub entries: usize,
    pub winners: usize,
}

/// Kind of problem found by the integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateProgramNumbers,
    MissingWinner,
    MultipleWinners,
    ProbabilitySumOff,
    NoPredictionsLogged,
}

/// One named integrity finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub race_id: String,
    pub kind: IssueKind,
    pub detail: String,
}

/// Integrity check output; issues are hard problems, warnings are soft
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub races_checked: usize,
    pub issues: Vec<IntegrityIssue>,
    pub warnings: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty()
    }
}

/// Readiness, filtering, and descriptive statistics over the race store
pub struct DatasetManager {
    store: Arc<dyn RaceStore>,
    config: DatasetConfig,
}

impl DatasetManager {
    pub fn new(store: Arc<dyn RaceStore>, config: DatasetConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Completed-race count; 0 on storage failure.
    pub async fn completed_count(&self) -> usize {
        match self.store.count_races(Some(RaceStatus::Complete)).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count completed races; treating dataset as empty");
                0
            }
        }
    }

    /// True once enough completed races exist for calibration.
    pub async fn is_ready(&self) -> bool {
        self.completed_count().await >= self.config.min_races_for_calibration
    }

    /// True once enough completed races exist for partial analysis.
    pub async fn is_partially_ready(&self) -> bool {
        self.completed_count().await >= self.config.min_races_for_partial
    }

    /// Summary statistics recomputed from all stored races.
    pub async fn summary(&self) -> DatasetSummary {
        let races = self.all_races().await;

        let mut summary = DatasetSummary {
            total_races: races.len(),
            ..DatasetSummary::default()
        };

        let mut tracks: Vec<String> = Vec::new();
        for race in &races {
            match race.status {
                RaceStatus::Complete => summary.completed_races += 1,
                RaceStatus::PendingResult => summary.pending_races += 1,
            }
            summary.total_entries += race.entries.len();
            if !tracks.contains(&race.track) {
                tracks.push(race.track.clone());
            }
            summary.earliest_date = Some(match summary.earliest_date {
                Some(d) if d <= race.date => d,
                _ => race.date,
            });
            summary.latest_date = Some(match summary.latest_date {
                Some(d) if d >= race.date => d,
                _ => race.date,
            });
            *summary.by_source.entry(race.source.to_string()).or_insert(0) += 1;
            *summary
                .by_surface
                .entry(race.surface.to_string())
                .or_insert(0) += 1;
        }
        tracks.sort();
        summary.tracks = tracks;
        summary
    }

    /// Completed races matching the filter.
    pub async fn filter(&self, filter: &RaceFilter) -> Vec<HistoricalRace> {
        // Push the indexed dimensions down to the store, refine the rest
        // in memory
        let query = RaceQuery {
            track: filter.track.clone(),
            date_from: filter.date_from,
            date_to: filter.date_to,
            source: filter.source,
            status: Some(RaceStatus::Complete),
            surface: filter.surface,
        };

        let races = match self.store.query_races(&query).await {
            Ok(races) => races,
            Err(e) => {
                warn!(error = %e, "Race query failed; returning empty result");
                return Vec::new();
            }
        };

        races
            .into_iter()
            .filter(|r| {
                filter
                    .distance
                    .as_ref()
                    .map_or(true, |d| r.distance.as_deref() == Some(d.as_str()))
                    && filter.min_field_size.map_or(true, |m| r.field_size >= m)
                    && filter.max_field_size.map_or(true, |m| r.field_size <= m)
            })
            .collect()
    }

    /// Win rate grouped by predicted-probability bucket.
    pub async fn probability_buckets(&self) -> Vec<ProbabilityBucket> {
        let width = self.config.probability_bucket_width;
        let buckets = (1.0 / width).ceil() as usize;
        let mut counts = vec![0usize; buckets];
        let mut winners = vec![0usize; buckets];
        let mut sums = vec![0.0_f64; buckets];

        for (entry, _) in self.predicted_entries().await {
            let idx = ((entry.predicted_probability / width) as usize).min(buckets - 1);
            counts[idx] += 1;
            sums[idx] += entry.predicted_probability;
            if entry.was_winner {
                winners[idx] += 1;
            }
        }

        (0..buckets)
            .filter(|&i| counts[i] > 0)
            .map(|i| {
                let lower = i as f64 * width;
                let upper = (lower + width).min(1.0);
                ProbabilityBucket {
                    label: format!("{:.1}-{:.1}", lower, upper),
                    lower,
                    upper,
                    count: counts[i],
                    winners: winners[i],
                    win_rate: winners[i] as f64 / counts[i] as f64,
                    avg_predicted: sums[i] / counts[i] as f64,
                }
            })
            .collect()
    }

    /// Win rate grouped by raw handicapping score bucket.
    pub async fn score_buckets(&self) -> Vec<ScoreBucket> {
        let width = self.config.score_bucket_width;
        let buckets = (SCORE_DOMAIN_MAX / width).ceil() as usize;
        let mut counts = vec![0usize; buckets];
        let mut winners = vec![0usize; buckets];

        for (entry, _) in self.predicted_entries().await {
            let score = entry.raw_score.clamp(0.0, SCORE_DOMAIN_MAX);
            let idx = ((score / width) as usize).min(buckets - 1);
            counts[idx] += 1;
            if entry.was_winner {
                winners[idx] += 1;
            }
        }

        (0..buckets)
            .filter(|&i| counts[i] > 0)
            .map(|i| {
                let lower = i as f64 * width;
                ScoreBucket {
                    label: format!("{:.0}-{:.0}", lower, lower + width),
                    lower,
                    upper: lower + width,
                    count: counts[i],
                    winners: winners[i],
                    win_rate: winners[i] as f64 / counts[i] as f64,
                }
            })
            .collect()
    }

    /// Performance and flat-stake ROI per betting tier.
    ///
    /// One unit staked per entry; a win returns `final_odds + 1`.
    pub async fn roi_by_tier(&self) -> Vec<TierStats> {
        let mut by_tier: BTreeMap<u8, (usize, usize, Decimal, Decimal)> = BTreeMap::new();

        for (entry, _) in self.predicted_entries().await {
            let slot = by_tier
                .entry(entry.tier)
                .or_insert((0, 0, Decimal::ZERO, Decimal::ZERO));
            slot.0 += 1;
            slot.2 += Decimal::ONE;
            if entry.was_winner {
                slot.1 += 1;
                let payout =
                    Decimal::from_f64(entry.final_odds).unwrap_or(Decimal::ZERO) + Decimal::ONE;
                slot.3 += payout;
            }
        }

        by_tier
            .into_iter()
            .map(|(tier, (count, winners, staked, returned))| TierStats {
                tier,
                count,
                winners,
                win_rate: winners as f64 / count as f64,
                total_staked: staked,
                total_returned: returned,
                roi: if staked > Decimal::ZERO {
                    (returned - staked) / staked
                } else {
                    dec!(0)
                },
            })
            .collect()
    }

    /// Per-surface race and winner aggregates over completed races.
    pub async fn surface_stats(&self) -> Vec<SurfaceStats> {
        let mut by_surface: BTreeMap<String, (Surface, usize, usize, usize)> = BTreeMap::new();

        for race in self.completed_races().await {
            let slot = by_surface
                .entry(race.surface.to_string())
                .or_insert((race.surface, 0, 0, 0));
            slot.1 += 1;
            for entry in race.active_entries() {
                slot.2 += 1;
                if entry.was_winner {
                    slot.3 += 1;
                }
            }
        }

        by_surface
            .into_values()
            .map(|(surface, races, entries, winners)| SurfaceStats {
                surface,
                races,
                entries,
                winners,
            })
            .collect()
    }

    /// Dataset integrity check. Reports named issues and warnings; never
    /// errors.
    pub async fn integrity_report(&self) -> IntegrityReport {
        let races = self.completed_races().await;
        let mut report = IntegrityReport {
            races_checked: races.len(),
            ..IntegrityReport::default()
        };

        for race in &races {
            let mut seen = Vec::new();
            for entry in &race.entries {
                if seen.contains(&entry.program_number) {
                    report.issues.push(IntegrityIssue {
                        race_id: race.id.clone(),
                        kind: IssueKind::DuplicateProgramNumbers,
                        detail: format!("program number {} appears twice", entry.program_number),
                    });
                } else {
                    seen.push(entry.program_number);
                }
            }

            let winner_count = race.entries.iter().filter(|e| e.was_winner).count();
            if winner_count == 0 {
                report.issues.push(IntegrityIssue {
                    race_id: race.id.clone(),
                    kind: IssueKind::MissingWinner,
                    detail: "completed race has no winner".to_string(),
                });
            } else if winner_count > 1 {
                report.issues.push(IntegrityIssue {
                    race_id: race.id.clone(),
                    kind: IssueKind::MultipleWinners,
                    detail: format!("completed race has {winner_count} winners"),
                });
            }

            let predicted: Vec<f64> = race
                .active_entries()
                .map(|e| e.predicted_probability)
                .filter(|&p| p > 0.0)
                .collect();
            if predicted.is_empty() {
                report.warnings.push(IntegrityIssue {
                    race_id: race.id.clone(),
                    kind: IssueKind::NoPredictionsLogged,
                    detail: "no predictions were logged for this race".to_string(),
                });
            } else {
                let sum: f64 = predicted.iter().sum();
                if (sum - 1.0).abs() > 0.05 {
                    report.warnings.push(IntegrityIssue {
                        race_id: race.id.clone(),
                        kind: IssueKind::ProbabilitySumOff,
                        detail: format!("active predicted probabilities sum to {sum:.3}"),
                    });
                }
            }
        }

        report
    }

    async fn all_races(&self) -> Vec<HistoricalRace> {
        match self.store.get_all_races().await {
            Ok(races) => races,
            Err(e) => {
                warn!(error = %e, "Failed to load races; returning empty dataset");
                Vec::new()
            }
        }
    }

    async fn completed_races(&self) -> Vec<HistoricalRace> {
        let query = RaceQuery {
            status: Some(RaceStatus::Complete),
            ..RaceQuery::default()
        };
        match self.store.query_races(&query).await {
            Ok(races) => races,
            Err(e) => {
                warn!(error = %e, "Failed to load completed races; returning empty dataset");
                Vec::new()
            }
        }
    }

    /// Completed, non-scratched entries that carry a prediction, paired
    /// with their race id.
    async fn predicted_entries(&self) -> Vec<(railbird_core::HistoricalEntry, String)> {
        self.completed_races()
            .await
            .into_iter()
            .flat_map(|race| {
                let id = race.id.clone();
                race.entries
                    .into_iter()
                    .filter(|e| e.is_active() && e.predicted_probability > 0.0)
                    .map(move |e| (e, id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
