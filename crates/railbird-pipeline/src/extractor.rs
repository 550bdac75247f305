//! Historical extractor
//!
//! Recovers completed races from the past-performance lines of a parsed
//! race card. Every horse's form lines describe races other horses on the
//! card may also have run in, so appearances are merged on a composite key
//! and the result is one deduplicated record per real-world race.

use chrono::{NaiveDate, Utc};
use railbird_core::math::{implied_probability, normalize_date, race_id};
use railbird_core::{
    ExtractionConfidence, HistoricalEntry, HistoricalRace, ParsedHorse, ParsedRaceCard,
    PastPerformance, RaceSource, RaceStatus, Surface,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Recovered entries must cover this share of the recorded field size for
/// the race to keep High confidence.
const FULL_COVERAGE_RATIO: f64 = 0.6;

/// Extractor options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Form lines examined per horse, newest first
    #[serde(default = "default_max_past_performances")]
    pub max_past_performances_per_horse: usize,

    /// Races with a smaller recorded field are discarded as unreliable
    #[serde(default = "default_min_field_size")]
    pub min_field_size: u32,

    /// Appearances before this date are ignored
    #[serde(default)]
    pub min_date: Option<NaiveDate>,

    /// Admit races where no recovered entry carries odds
    #[serde(default = "default_include_without_odds")]
    pub include_races_without_odds: bool,
}

fn default_max_past_performances() -> usize {
    10
}

fn default_min_field_size() -> u32 {
    4
}

fn default_include_without_odds() -> bool {
    true
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_past_performances_per_horse: default_max_past_performances(),
            min_field_size: default_min_field_size(),
            min_date: None,
            include_races_without_odds: default_include_without_odds(),
        }
    }
}

/// Counters describing one extraction run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Past-performance lines examined across all horses
    pub appearances_examined: usize,
    /// Distinct races recovered
    pub unique_races: usize,
    /// Appearances merged into a race another appearance had already seeded
    pub duplicates_merged: usize,
    /// Candidate races discarded (too few finishers, field too small, no odds)
    pub incomplete_skipped: usize,
    /// Recovered races where at least one entry carries odds
    pub races_with_odds: usize,
}

/// Recovered races plus the counters from the run
#[derive(Debug, Clone)]
pub struct Extraction {
    pub races: Vec<HistoricalRace>,
    pub stats: ExtractionStats,
}

/// Two appearances sharing every field of this key are taken to be the same
/// real-world race seen from different horses' form lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RaceKey {
    track: String,
    date: NaiveDate,
    race_number: u32,
    distance: Option<String>,
    surface: Option<String>,
    field_size: u32,
    track_condition: Option<String>,
    classification: Option<String>,
    purse: Option<u32>,
}

/// One appearance's claim on a finish position within a merged race.
#[derive(Debug, Clone)]
struct Candidate {
    entry: HistoricalEntry,
    aux_score: u32,
    /// Today's program number and name of the horse whose form line
    /// contributed this appearance; also the deterministic tie-break.
    contributor: (u32, String),
}

pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract deduplicated historical races from one parsed card.
    pub fn extract(&self, card: &ParsedRaceCard) -> Extraction {
        let mut stats = ExtractionStats::default();
        let mut groups: HashMap<RaceKey, BTreeMap<u32, Candidate>> = HashMap::new();

        for race in &card.races {
            for horse in &race.horses {
                self.collect_appearances(horse, &mut groups, &mut stats);
            }
        }

        let mut by_id: HashMap<String, HistoricalRace> = HashMap::new();
        for (key, candidates) in groups {
            let Some(race) = self.build_race(key, candidates, &mut stats) else {
                continue;
            };
            match by_id.get(&race.id) {
                Some(existing) if existing.entries.len() >= race.entries.len() => {}
                _ => {
                    by_id.insert(race.id.clone(), race);
                }
            }
        }

        let mut races: Vec<HistoricalRace> = by_id.into_values().collect();
        races.sort_by(|a, b| a.id.cmp(&b.id));

        stats.unique_races = races.len();
        stats.races_with_odds = races
            .iter()
            .filter(|r| r.entries.iter().any(|e| e.has_odds()))
            .count();

        debug!(
            track = %card.track,
            examined = stats.appearances_examined,
            unique = stats.unique_races,
            merged = stats.duplicates_merged,
            skipped = stats.incomplete_skipped,
            "Extracted historical races from card"
        );

        Extraction { races, stats }
    }

    /// Extract from several cards, deduplicating across files by race ID
    /// and preferring the version with more recovered entries.
    pub fn extract_many(&self, cards: &[ParsedRaceCard]) -> Extraction {
        let mut stats = ExtractionStats::default();
        let mut by_id: HashMap<String, HistoricalRace> = HashMap::new();

        for card in cards {
            let extraction = self.extract(card);
            stats.appearances_examined += extraction.stats.appearances_examined;
            stats.duplicates_merged += extraction.stats.duplicates_merged;
            stats.incomplete_skipped += extraction.stats.incomplete_skipped;

            for race in extraction.races {
                match by_id.get(&race.id) {
                    Some(existing) if existing.entries.len() >= race.entries.len() => {}
                    _ => {
                        by_id.insert(race.id.clone(), race);
                    }
                }
            }
        }

        let mut races: Vec<HistoricalRace> = by_id.into_values().collect();
        races.sort_by(|a, b| a.id.cmp(&b.id));
        stats.unique_races = races.len();
        stats.races_with_odds = races
            .iter()
            .filter(|r| r.entries.iter().any(|e| e.has_odds()))
            .count();

        Extraction { races, stats }
    }

    fn collect_appearances(
        &self,
        horse: &ParsedHorse,
        groups: &mut HashMap<RaceKey, BTreeMap<u32, Candidate>>,
        stats: &mut ExtractionStats,
    ) {
        let capped = horse
            .past_performances
            .iter()
            .take(self.config.max_past_performances_per_horse);

        for pp in capped {
            stats.appearances_examined += 1;

            let Some(date) = normalize_date(&pp.date_text) else {
                debug!(date = %pp.date_text, horse = %horse.name, "Unparseable form-line date");
                continue;
            };
            if let Some(min) = self.config.min_date {
                if date < min {
                    continue;
                }
            }
            // A form line without a finish carries no outcome to learn from
            if pp.finish_position == 0 {
                continue;
            }

            let key = RaceKey {
                track: pp.track.trim().to_uppercase(),
                date,
                race_number: pp.race_number,
                distance: pp.distance.clone(),
                surface: pp.surface.clone(),
                field_size: pp.field_size,
                track_condition: pp.track_condition.clone(),
                classification: pp.classification.clone(),
                purse: pp.purse,
            };

            let candidate = Candidate {
                entry: entry_from_appearance(horse, pp),
                aux_score: aux_score(pp),
                contributor: (horse.program_number, horse.name.clone()),
            };

            let race = groups.entry(key).or_default();
            if !race.is_empty() {
                stats.duplicates_merged += 1;
            }
            match race.get(&pp.finish_position) {
                Some(held) if !candidate_beats(&candidate, held) => {}
                _ => {
                    race.insert(pp.finish_position, candidate);
                }
            }
        }
    }

    fn build_race(
        &self,
        key: RaceKey,
        candidates: BTreeMap<u32, Candidate>,
        stats: &mut ExtractionStats,
    ) -> Option<HistoricalRace> {
        if candidates.len() < 2 || key.field_size < self.config.min_field_size {
            stats.incomplete_skipped += 1;
            return None;
        }

        let entries: Vec<HistoricalEntry> =
            candidates.into_values().map(|c| c.entry).collect();
        let any_odds = entries.iter().any(|e| e.has_odds());
        if !any_odds && !self.config.include_races_without_odds {
            stats.incomplete_skipped += 1;
            return None;
        }

        let coverage = entries.len() as f64 / key.field_size as f64;
        let confidence = if !any_odds {
            ExtractionConfidence::Low
        } else if coverage < FULL_COVERAGE_RATIO {
            ExtractionConfidence::Medium
        } else {
            ExtractionConfidence::High
        };

        let now = Utc::now();
        Some(HistoricalRace {
            id: race_id(&key.track, key.date, key.race_number),
            track: key.track,
            date: key.date,
            race_number: key.race_number,
            distance: key.distance,
            surface: key.surface.as_deref().map(Surface::parse).unwrap_or_default(),
            field_size: key.field_size,
            entries,
            source: RaceSource::ExtractedFromHistory,
            confidence,
            status: RaceStatus::Complete,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Appearances carrying more auxiliary data win a contested finish
/// position; ties go to the smaller `(program_number, name)` so the result
/// never depends on input order.
fn candidate_beats(challenger: &Candidate, held: &Candidate) -> bool {
    match challenger.aux_score.cmp(&held.aux_score) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => challenger.contributor < held.contributor,
    }
}

fn aux_score(pp: &PastPerformance) -> u32 {
    let mut score = 0;
    if pp.final_odds.is_some_and(|o| o > 0.0) {
        score += 1;
    }
    if pp.speed_figure.is_some() {
        score += 1;
    }
    score
}

fn entry_from_appearance(horse: &ParsedHorse, pp: &PastPerformance) -> HistoricalEntry {
    let odds = pp.final_odds.filter(|o| *o > 0.0).unwrap_or(0.0);
    let mut entry = HistoricalEntry::empty(horse.program_number);
    entry.horse_name = Some(horse.name.clone());
    entry.final_odds = odds;
    entry.implied_probability = implied_probability(odds);
    entry.apply_finish(pp.finish_position);
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pp(track: &str, date: &str, race_number: u32, finish: u32) -> PastPerformance {
        PastPerformance {
            date_text: date.to_string(),
            track: track.to_string(),
            race_number,
            distance: Some("6f".to_string()),
            surface: Some("dirt".to_string()),
            finish_position: finish,
            field_size: 8,
            final_odds: Some(4.5),
            speed_figure: Some(82),
            track_condition: Some("fast".to_string()),
            classification: Some("clm".to_string()),
            purse: Some(20_000),
        }
    }

    fn horse(program_number: u32, name: &str, pps: Vec<PastPerformance>) -> ParsedHorse {
        ParsedHorse {
            program_number,
            name: name.to_string(),
            scratched: false,
            past_performances: pps,
        }
    }

    fn card(horses: Vec<ParsedHorse>) -> ParsedRaceCard {
        ParsedRaceCard {
            track: "SA".to_string(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            races: vec![railbird_core::ParsedRace { number: 1, horses }],
        }
    }

    #[test]
    fn test_shared_past_race_deduplicates_into_one_record() {
        // Two horses on today's card both ran in CD race 3 on the same day
        let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 4)]),
        ]));

        assert_eq!(extraction.races.len(), 1);
        let race = &extraction.races[0];
        assert_eq!(race.id, "CD-2025-05-01-R3");
        assert_eq!(race.entries.len(), 2);
        assert_eq!(race.status, RaceStatus::Complete);
        assert_eq!(race.source, RaceSource::ExtractedFromHistory);
        assert!(race.winner().is_some());
        assert_eq!(extraction.stats.duplicates_merged, 1);
        assert_eq!(extraction.stats.unique_races, 1);
    }

    #[test]
    fn test_contested_finish_position_prefers_more_auxiliary_data() {
        // Alpha and Bravo both claim position 1 but only Bravo's line has
        // odds and a figure; Chaser's position 2 keeps the race viable
        let mut sparse = pp("CD", "2025-05-01", 3, 1);
        sparse.final_odds = None;
        sparse.speed_figure = None;

        let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![sparse]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(3, "Chaser", vec![pp("CD", "2025-05-01", 3, 2)]),
        ]));

        assert_eq!(extraction.races.len(), 1);
        let race = &extraction.races[0];
        assert_eq!(race.entries.len(), 2);
        let pos1 = race.entries.iter().find(|e| e.finish_position == 1).unwrap();
        assert_eq!(pos1.program_number, 2);
        assert!(pos1.has_odds());
    }

    #[test]
    fn test_contested_finish_tie_breaks_on_smaller_program_number() {
        // Equal auxiliary data on both claims regardless of input order
        for flipped in [false, true] {
            let mut horses = vec![
                horse(
                    7,
                    "Gulf",
                    vec![pp("CD", "2025-05-01", 3, 1), pp("CD", "2025-05-01", 3, 2)],
                ),
                horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 1)]),
            ];
            if flipped {
                horses.reverse();
            }

            let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(horses));
            let race = &extraction.races[0];
            let pos1 = race.entries.iter().find(|e| e.finish_position == 1).unwrap();
            assert_eq!(pos1.program_number, 2);
        }
    }

    #[test]
    fn test_single_finisher_race_discarded() {
        let extraction = Extractor::new(ExtractorConfig::default())
            .extract(&card(vec![horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)])]));

        assert!(extraction.races.is_empty());
        assert_eq!(extraction.stats.incomplete_skipped, 1);
    }

    #[test]
    fn test_small_field_discarded() {
        let mut a = pp("CD", "2025-05-01", 3, 1);
        let mut b = pp("CD", "2025-05-01", 3, 2);
        a.field_size = 3;
        b.field_size = 3;

        let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![a]),
            horse(2, "Bravo", vec![b]),
        ]));

        assert!(extraction.races.is_empty());
        assert_eq!(extraction.stats.incomplete_skipped, 1);
    }

    #[test]
    fn test_confidence_low_without_odds_medium_on_thin_coverage() {
        let strip_odds = |mut p: PastPerformance| {
            p.final_odds = None;
            p
        };
        let no_odds = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![strip_odds(pp("CD", "2025-05-01", 3, 1))]),
            horse(2, "Bravo", vec![strip_odds(pp("CD", "2025-05-01", 3, 2))]),
        ]));
        assert_eq!(no_odds.races[0].confidence, ExtractionConfidence::Low);
        assert_eq!(no_odds.stats.races_with_odds, 0);

        // 2 of 8 recorded runners recovered: 25% coverage
        let thin = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 2)]),
        ]));
        assert_eq!(thin.races[0].confidence, ExtractionConfidence::Medium);

        // 5 of 8 recovered: 62.5% coverage
        let full = Extractor::new(ExtractorConfig::default()).extract(&card(
            (1..=5)
                .map(|i| horse(i, &format!("Horse{i}"), vec![pp("CD", "2025-05-01", 3, i)]))
                .collect(),
        ));
        assert_eq!(full.races[0].confidence, ExtractionConfidence::High);
    }

    #[test]
    fn test_races_without_odds_excluded_when_configured() {
        let strip = |mut p: PastPerformance| {
            p.final_odds = None;
            p
        };
        let config = ExtractorConfig {
            include_races_without_odds: false,
            ..ExtractorConfig::default()
        };
        let extraction = Extractor::new(config).extract(&card(vec![
            horse(1, "Alpha", vec![strip(pp("CD", "2025-05-01", 3, 1))]),
            horse(2, "Bravo", vec![strip(pp("CD", "2025-05-01", 3, 2))]),
        ]));

        assert!(extraction.races.is_empty());
        assert_eq!(extraction.stats.incomplete_skipped, 1);
    }

    #[test]
    fn test_past_performance_cap_and_date_cutoff() {
        let config = ExtractorConfig {
            max_past_performances_per_horse: 2,
            min_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1),
            ..ExtractorConfig::default()
        };

        let lines = vec![
            pp("CD", "2025-05-01", 1, 1),
            pp("CD", "2024-12-01", 2, 1), // before cutoff
            pp("CD", "2025-03-01", 3, 1), // beyond the cap
        ];
        let extraction = Extractor::new(config).extract(&card(vec![
            horse(1, "Alpha", lines.clone()),
            horse(
                2,
                "Bravo",
                lines
                    .iter()
                    .cloned()
                    .map(|mut p| {
                        p.finish_position = 2;
                        p
                    })
                    .collect(),
            ),
        ]));

        assert_eq!(extraction.stats.appearances_examined, 4);
        assert_eq!(extraction.races.len(), 1);
        assert_eq!(extraction.races[0].id, "CD-2025-05-01-R1");
    }

    #[test]
    fn test_unfinished_appearances_ignored() {
        let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 0)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 2)]),
        ]));
        // Only one real finisher remains, so nothing is emitted
        assert!(extraction.races.is_empty());
    }

    #[test]
    fn test_multi_file_dedup_prefers_more_entries() {
        let extractor = Extractor::new(ExtractorConfig::default());
        let card_a = card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 2)]),
        ]);
        let card_b = card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 2)]),
            horse(3, "Chaser", vec![pp("CD", "2025-05-01", 3, 3)]),
        ]);

        let extraction = extractor.extract_many(&[card_a, card_b]);
        assert_eq!(extraction.races.len(), 1);
        assert_eq!(extraction.races[0].entries.len(), 3);
        assert_eq!(extraction.stats.unique_races, 1);
    }

    #[test]
    fn test_entry_carries_implied_probability() {
        let extraction = Extractor::new(ExtractorConfig::default()).extract(&card(vec![
            horse(1, "Alpha", vec![pp("CD", "2025-05-01", 3, 1)]),
            horse(2, "Bravo", vec![pp("CD", "2025-05-01", 3, 2)]),
        ]));
        let winner = extraction.races[0].winner().unwrap();
        assert!((winner.implied_probability - 1.0 / 5.5).abs() < 1e-12);
        assert_eq!(winner.predicted_probability, 0.0);
        assert!(winner.was_winner && winner.was_placed && winner.was_show);
    }
}
