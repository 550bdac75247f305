//! Historical record schema
//!
//! Persisted entities for the calibration dataset: one race, one horse's
//! record within a race, the fitted Platt transform, and the derived
//! dataset summary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Racing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Dirt,
    Turf,
    Synthetic,
}

impl Default for Surface {
    fn default() -> Self {
        Surface::Dirt
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Dirt => write!(f, "dirt"),
            Surface::Turf => write!(f, "turf"),
            Surface::Synthetic => write!(f, "synthetic"),
        }
    }
}

impl Surface {
    /// Parse a surface code from racing-form text. Unknown codes fall back
    /// to dirt, the most common surface.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "t" | "turf" => Surface::Turf,
            "aw" | "syn" | "synth" | "synthetic" | "tapeta" | "polytrack" => Surface::Synthetic,
            _ => Surface::Dirt,
        }
    }
}

/// How a historical race entered the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RaceSource {
    /// Recovered from past-performance lines in a parsed race card
    ExtractedFromHistory,
    /// Entered by hand
    ManuallyEntered,
    /// Logged by our own prediction pipeline before the race ran
    SelfLogged,
}

impl fmt::Display for RaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceSource::ExtractedFromHistory => write!(f, "extracted-from-history"),
            RaceSource::ManuallyEntered => write!(f, "manually-entered"),
            RaceSource::SelfLogged => write!(f, "self-logged"),
        }
    }
}

impl RaceSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extracted-from-history" => Some(RaceSource::ExtractedFromHistory),
            "manually-entered" => Some(RaceSource::ManuallyEntered),
            "self-logged" => Some(RaceSource::SelfLogged),
            _ => None,
        }
    }
}

/// Completeness tier assigned by the extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionConfidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for ExtractionConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionConfidence::High => write!(f, "high"),
            ExtractionConfidence::Medium => write!(f, "medium"),
            ExtractionConfidence::Low => write!(f, "low"),
        }
    }
}

impl ExtractionConfidence {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(ExtractionConfidence::High),
            "medium" => Some(ExtractionConfidence::Medium),
            "low" => Some(ExtractionConfidence::Low),
            _ => None,
        }
    }
}

/// Race lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    /// Predictions logged, outcome not yet known
    PendingResult,
    /// Finishing order and odds recorded
    Complete,
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceStatus::PendingResult => write!(f, "pending_result"),
            RaceStatus::Complete => write!(f, "complete"),
        }
    }
}

impl RaceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_result" => Some(RaceStatus::PendingResult),
            "complete" => Some(RaceStatus::Complete),
            _ => None,
        }
    }
}

/// One horse's record within one historical race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalEntry {
    /// Program (saddle cloth) number
    pub program_number: u32,
    /// Official finish position; 0 = scratched or unknown
    pub finish_position: u32,
    /// Our model's raw win probability at prediction time (0 when the race
    /// was recovered from history rather than predicted)
    pub predicted_probability: f64,
    /// Probability implied by final odds
    pub implied_probability: f64,
    /// Final decimal odds; 0.0 = unknown
    pub final_odds: f64,
    /// Raw handicapping score (0-~330 scale)
    pub raw_score: f64,
    /// Score after overlay adjustment
    pub overlay_score: f64,
    /// Betting tier classification (0-3)
    pub tier: u8,
    pub was_winner: bool,
    /// Finished in the top 2
    pub was_placed: bool,
    /// Finished in the top 3
    pub was_show: bool,
    pub horse_name: Option<String>,
    pub morning_line_odds: Option<f64>,
}

impl HistoricalEntry {
    /// Entry with nothing known beyond its program number.
    pub fn empty(program_number: u32) -> Self {
        Self {
            program_number,
            finish_position: 0,
            predicted_probability: 0.0,
            implied_probability: 0.0,
            final_odds: 0.0,
            raw_score: 0.0,
            overlay_score: 0.0,
            tier: 0,
            was_winner: false,
            was_placed: false,
            was_show: false,
            horse_name: None,
            morning_line_odds: None,
        }
    }

    /// True when this entry ran (was not scratched).
    pub fn is_active(&self) -> bool {
        self.finish_position > 0
    }

    /// True when the entry carries odds data.
    pub fn has_odds(&self) -> bool {
        self.final_odds > 0.0
    }

    /// Derive the winner/placed/show flags from the finish position.
    pub fn apply_finish(&mut self, finish_position: u32) {
        self.finish_position = finish_position;
        self.was_winner = finish_position == 1;
        self.was_placed = (1..=2).contains(&finish_position);
        self.was_show = (1..=3).contains(&finish_position);
    }
}

/// One historical race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRace {
    /// Stable identifier: `{TRACK}-{YYYY-MM-DD}-R{number}`
    pub id: String,
    /// Uppercased track code
    pub track: String,
    pub date: NaiveDate,
    pub race_number: u32,
    pub distance: Option<String>,
    pub surface: Surface,
    /// Recorded field size (may exceed `entries.len()` for extracted races)
    pub field_size: u32,
    pub entries: Vec<HistoricalEntry>,
    pub source: RaceSource,
    pub confidence: ExtractionConfidence,
    pub status: RaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HistoricalRace {
    pub fn is_complete(&self) -> bool {
        self.status == RaceStatus::Complete
    }

    /// The winning entry, if exactly one is marked.
    pub fn winner(&self) -> Option<&HistoricalEntry> {
        let mut winners = self.entries.iter().filter(|e| e.was_winner);
        let first = winners.next()?;
        if winners.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Entries that actually ran.
    pub fn active_entries(&self) -> impl Iterator<Item = &HistoricalEntry> {
        self.entries.iter().filter(|e| e.is_active())
    }
}

/// The fitted two-parameter logistic recalibration transform
///
/// `calibrated = sigmoid(a * logit(raw) + b)`. Superseded wholesale by each
/// successful fit, never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlattParameters {
    /// Slope applied in logit space
    pub a: f64,
    /// Intercept applied in logit space
    pub b: f64,
    pub fitted_at: DateTime<Utc>,
    /// Completed races in the dataset when fitted
    pub race_count: u32,
    /// Brier score achieved on the fitting data
    pub brier_score: f64,
    /// Log loss achieved on the fitting data
    pub log_loss: f64,
}

impl PlattParameters {
    /// The identity transform: no calibration applied.
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            fitted_at: Utc::now(),
            race_count: 0,
            brier_score: 0.0,
            log_loss: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.a == 1.0 && self.b == 0.0
    }

    /// Sanity-check persisted parameters before trusting them.
    pub fn is_valid(&self) -> bool {
        self.a.is_finite()
            && self.b.is_finite()
            && self.a >= 0.0
            && self.a.abs() <= 10.0
            && self.b.abs() <= 10.0
            && (0.0..=1.0).contains(&self.brier_score)
            && self.log_loss >= 0.0
            && self.log_loss.is_finite()
    }
}

/// Summary statistics over the whole dataset, recomputed on demand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_races: usize,
    pub completed_races: usize,
    pub pending_races: usize,
    pub total_entries: usize,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub tracks: Vec<String>,
    pub by_source: BTreeMap<String, usize>,
    pub by_surface: BTreeMap<String, usize>,
}
