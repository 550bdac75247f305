//! Collaborator input types
//!
//! Entities produced by the race-card parser and the handicapping scorer.
//! The calibration pipeline consumes these; it never constructs them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A fully parsed race card file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRaceCard {
    pub track: String,
    pub date: NaiveDate,
    pub races: Vec<ParsedRace>,
}

/// One race on a parsed card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRace {
    pub number: u32,
    pub horses: Vec<ParsedHorse>,
}

/// One horse on a parsed card, with its past-performance lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedHorse {
    pub program_number: u32,
    pub name: String,
    pub scratched: bool,
    pub past_performances: Vec<PastPerformance>,
}

/// A single past race appearance from a horse's form lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PastPerformance {
    /// Date as printed on the form; normalized by the extractor
    pub date_text: String,
    pub track: String,
    pub race_number: u32,
    pub distance: Option<String>,
    pub surface: Option<String>,
    /// 0 = did not finish / unknown
    pub finish_position: u32,
    pub field_size: u32,
    /// Final decimal odds; None when the form line lacks odds
    pub final_odds: Option<f64>,
    pub speed_figure: Option<u32>,
    pub track_condition: Option<String>,
    pub classification: Option<String>,
    pub purse: Option<u32>,
}

/// A race card after the handicapping scorer has run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRaceCard {
    pub track: String,
    pub date: NaiveDate,
    pub race_number: u32,
    pub surface: Option<String>,
    pub distance: Option<String>,
    pub horses: Vec<ScoredHorse>,
}

/// One scored horse
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHorse {
    pub program_number: u32,
    pub name: String,
    pub scratched: bool,
    /// Raw handicapping score (0-~330 scale)
    pub raw_score: f64,
    /// Score after overlay adjustment
    pub overlay_score: f64,
    /// Rank within the field by score, 1 = best
    pub rank: u32,
    pub morning_line_odds: Option<f64>,
}

/// One horse's official result, supplied by the results collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub program_number: u32,
    pub finish_position: u32,
    pub final_odds: f64,
}
