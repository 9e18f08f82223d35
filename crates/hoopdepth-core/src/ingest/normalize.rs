// Player population normalization.
//
// Collapses traded players onto their season-total row, applies the
// minimum-participation filter, then appends the curated supplementary rows
// and rookie stand-ins, which bypass the filter.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::error::DataIntegrityError;
use crate::ingest::tables::{name_key, RookieStandIn, SeasonRow, SupplementaryRow};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where a player's stat line came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordOrigin {
    Season,
    Supplementary,
    RookieStandIn { comparable: String },
}

/// One player in the normalized population. Never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRecord {
    pub id: u32,
    pub name: String,
    /// Team in the source season (`TOT` for a multi-team total).
    pub season_team: Option<String>,
    pub games_played: Option<u32>,
    pub games_started: Option<u32>,
    /// Aligned with the family's feature list.
    pub stats: Vec<f64>,
    pub origin: RecordOrigin,
}

/// Row counts from each normalization step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationSummary {
    pub raw_rows: usize,
    pub partial_rows_dropped: usize,
    pub season_players: usize,
    pub filtered_out: usize,
    /// Season players judged with G or GS still unknown after the join.
    pub participation_incomplete: usize,
    pub supplementary_added: usize,
    pub rookies_added: usize,
    pub survivors: usize,
}

/// Everything the normalizer consumes for one statistic family.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeInputs<'a> {
    pub season: &'a [SeasonRow],
    /// Optional G/GS source, joined by `(id, name)` when a season row lacks them.
    pub participation: Option<&'a [SeasonRow]>,
    pub supplementary: &'a [SupplementaryRow],
    pub rookies: &'a [RookieStandIn],
}

#[derive(Debug, Clone)]
pub struct NormalizedPopulation {
    pub players: Vec<PlayerRecord>,
    pub summary: NormalizationSummary,
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// Keep one row per `(id, name)`: the only row, or the season-total row when
/// a player was traded. Output keeps first-appearance order.
pub fn deduplicate(rows: &[SeasonRow]) -> Result<Vec<&SeasonRow>, DataIntegrityError> {
    let mut order: Vec<(u32, &str)> = Vec::new();
    let mut groups: HashMap<(u32, &str), Vec<&SeasonRow>> = HashMap::new();
    for row in rows {
        let key = (row.id, row.name.as_str());
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    let mut kept = Vec::with_capacity(order.len());
    for key in order {
        let group = &groups[&key];
        if group.len() == 1 {
            kept.push(group[0]);
            continue;
        }
        let totals: Vec<&SeasonRow> = group.iter().copied().filter(|r| r.is_season_total()).collect();
        match totals.as_slice() {
            [total] => kept.push(*total),
            [] => {
                return Err(DataIntegrityError::MissingSeasonTotal {
                    id: key.0,
                    name: key.1.to_string(),
                    rows: group.len(),
                })
            }
            _ => {
                return Err(DataIntegrityError::DuplicatePlayer {
                    id: key.0,
                    name: key.1.to_string(),
                })
            }
        }
    }
    Ok(kept)
}

// ---------------------------------------------------------------------------
// Participation filter
// ---------------------------------------------------------------------------

/// Inclusive-OR participation rule: enough starts, or enough games.
pub fn meets_participation(games_played: Option<u32>, games_started: Option<u32>, filter: &FilterConfig) -> bool {
    let started = games_started.is_some_and(|gs| gs >= filter.min_games_started);
    let played = games_played.is_some_and(|g| g > filter.min_games_played);
    started || played
}

fn participation_index(rows: &[SeasonRow]) -> HashMap<(u32, String), (Option<u32>, Option<u32>)> {
    let mut index = HashMap::new();
    for row in rows {
        let key = (row.id, name_key(&row.name));
        // The season-total row wins over partial-team rows.
        if row.is_season_total() || !index.contains_key(&key) {
            index.insert(key, (row.games_played, row.games_started));
        }
    }
    index
}

// ---------------------------------------------------------------------------
// Top-level entry point
// ---------------------------------------------------------------------------

/// Produce the one-row-per-player population for a family.
pub fn normalize(inputs: &NormalizeInputs<'_>, filter: &FilterConfig) -> Result<NormalizedPopulation, DataIntegrityError> {
    let mut summary = NormalizationSummary {
        raw_rows: inputs.season.len(),
        ..Default::default()
    };

    let deduped = deduplicate(inputs.season)?;
    summary.season_players = deduped.len();
    summary.partial_rows_dropped = inputs.season.len() - deduped.len();

    let joined = inputs.participation.map(participation_index);

    let mut players: Vec<PlayerRecord> = Vec::new();
    for row in &deduped {
        let (mut games_played, mut games_started) = (row.games_played, row.games_started);
        if games_played.is_none() || games_started.is_none() {
            if let Some((g, gs)) = joined.as_ref().and_then(|idx| idx.get(&(row.id, name_key(&row.name)))) {
                games_played = games_played.or(*g);
                games_started = games_started.or(*gs);
            }
        }
        if games_played.is_none() && games_started.is_none() {
            return Err(DataIntegrityError::MissingParticipation {
                id: row.id,
                name: row.name.clone(),
            });
        }
        if games_played.is_none() || games_started.is_none() {
            warn!(
                "'{}' ({}): no participation match, filtering on G={:?} GS={:?}",
                row.name, row.id, games_played, games_started
            );
            summary.participation_incomplete += 1;
        }
        if !meets_participation(games_played, games_started, filter) {
            debug!(
                "filtered '{}': G={:?} GS={:?}",
                row.name, games_played, games_started
            );
            summary.filtered_out += 1;
            continue;
        }
        players.push(PlayerRecord {
            id: row.id,
            name: row.name.clone(),
            season_team: Some(row.team.clone()),
            games_played,
            games_started,
            stats: row.stats.clone(),
            origin: RecordOrigin::Season,
        });
    }

    // Names already in the population; curated rows must not collide with them.
    let mut taken: HashSet<String> = players.iter().map(|p| name_key(&p.name)).collect();
    let mut next_id = inputs.season.iter().map(|r| r.id).max().unwrap_or(0) + 1;

    for row in inputs.supplementary {
        if !taken.insert(name_key(&row.name)) {
            return Err(DataIntegrityError::DuplicatePlayer {
                id: next_id,
                name: row.name.clone(),
            });
        }
        players.push(PlayerRecord {
            id: next_id,
            name: row.name.clone(),
            season_team: row.team.clone(),
            games_played: None,
            games_started: None,
            stats: row.stats.clone(),
            origin: RecordOrigin::Supplementary,
        });
        next_id += 1;
        summary.supplementary_added += 1;
    }

    for stand_in in inputs.rookies {
        let wanted = name_key(&stand_in.comparable);
        let matches: Vec<&&SeasonRow> = deduped.iter().filter(|r| name_key(&r.name) == wanted).collect();
        let comparable = match matches.as_slice() {
            [only] => **only,
            [] => {
                return Err(DataIntegrityError::UnknownComparable {
                    rookie: stand_in.rookie.clone(),
                    comparable: stand_in.comparable.clone(),
                })
            }
            many => {
                return Err(DataIntegrityError::AmbiguousComparable {
                    rookie: stand_in.rookie.clone(),
                    comparable: stand_in.comparable.clone(),
                    matches: many.len(),
                })
            }
        };
        if !taken.insert(name_key(&stand_in.rookie)) {
            return Err(DataIntegrityError::DuplicatePlayer {
                id: next_id,
                name: stand_in.rookie.clone(),
            });
        }
        players.push(PlayerRecord {
            id: next_id,
            name: stand_in.rookie.clone(),
            season_team: None,
            games_played: None,
            games_started: None,
            stats: comparable.stats.clone(),
            origin: RecordOrigin::RookieStandIn {
                comparable: comparable.name.clone(),
            },
        });
        next_id += 1;
        summary.rookies_added += 1;
    }

    let mut seen = HashSet::new();
    for p in &players {
        if !seen.insert((p.id, p.name.as_str())) {
            return Err(DataIntegrityError::DuplicatePlayer {
                id: p.id,
                name: p.name.clone(),
            });
        }
    }

    if players.is_empty() {
        return Err(DataIntegrityError::EmptyPopulation);
    }

    summary.survivors = players.len();
    info!(
        "normalized {} raw rows into {} players ({} partial rows dropped, {} filtered, {} with partial G/GS, {} supplementary, {} rookies)",
        summary.raw_rows,
        summary.survivors,
        summary.partial_rows_dropped,
        summary.filtered_out,
        summary.participation_incomplete,
        summary.supplementary_added,
        summary.rookies_added
    );

    Ok(NormalizedPopulation { players, summary })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> FilterConfig {
        FilterConfig {
            min_games_started: 5,
            min_games_played: 15,
        }
    }

    fn row(id: u32, name: &str, team: &str, g: u32, gs: u32, pts: f64) -> SeasonRow {
        SeasonRow {
            id,
            name: name.into(),
            team: team.into(),
            games_played: Some(g),
            games_started: Some(gs),
            stats: vec![pts],
        }
    }

    fn inputs<'a>(season: &'a [SeasonRow]) -> NormalizeInputs<'a> {
        NormalizeInputs {
            season,
            participation: None,
            supplementary: &[],
            rookies: &[],
        }
    }

    #[test]
    fn traded_player_keeps_only_season_total() {
        let season = vec![
            row(1, "Stayer", "BOS", 70, 70, 20.0),
            row(2, "Traded", "TOT", 60, 40, 15.0),
            row(2, "Traded", "HOU", 30, 20, 14.0),
            row(2, "Traded", "LAC", 30, 20, 16.0),
        ];
        let out = normalize(&inputs(&season), &filter()).unwrap();
        assert_eq!(out.players.len(), 2);
        assert_eq!(out.players[1].name, "Traded");
        assert_eq!(out.players[1].season_team.as_deref(), Some("TOT"));
        assert_eq!(out.players[1].stats, vec![15.0]);
        assert_eq!(out.summary.partial_rows_dropped, 2);
    }

    #[test]
    fn multiple_rows_without_total_is_integrity_error() {
        let season = vec![row(3, "Broken", "HOU", 30, 20, 14.0), row(3, "Broken", "LAC", 30, 20, 16.0)];
        let err = normalize(&inputs(&season), &filter()).unwrap_err();
        match err {
            DataIntegrityError::MissingSeasonTotal { id, rows, .. } => {
                assert_eq!(id, 3);
                assert_eq!(rows, 2);
            }
            other => panic!("expected MissingSeasonTotal, got: {other}"),
        }
    }

    #[test]
    fn two_total_rows_is_duplicate_error() {
        let season = vec![row(4, "Twice", "TOT", 30, 20, 14.0), row(4, "Twice", "TOT", 30, 20, 16.0)];
        let err = normalize(&inputs(&season), &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::DuplicatePlayer { id: 4, .. }));
    }

    #[test]
    fn participation_filter_is_inclusive_or() {
        let season = vec![
            row(1, "Starter Injured Early", "BOS", 8, 8, 20.0), // GS >= 5
            row(2, "Bench Regular", "BOS", 40, 0, 6.0),         // G > 15
            row(3, "Exactly Fifteen", "BOS", 15, 4, 3.0),       // neither
            row(4, "Five Starts", "BOS", 5, 5, 9.0),            // GS == 5
            row(5, "Cup Of Coffee", "BOS", 3, 0, 1.0),          // neither
        ];
        let out = normalize(&inputs(&season), &filter()).unwrap();
        let names: Vec<&str> = out.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Starter Injured Early", "Bench Regular", "Five Starts"]);
        assert_eq!(out.summary.filtered_out, 2);
        for p in &out.players {
            assert!(p.games_started.unwrap() >= 5 || p.games_played.unwrap() > 15);
        }
    }

    #[test]
    fn participation_joined_from_second_table() {
        let mut advanced = row(1, "Adv Only", "BOS", 0, 0, 4.0);
        advanced.games_played = Some(10);
        advanced.games_started = None;
        let per_game = vec![row(1, "Adv Only", "BOS", 10, 9, 11.0)];

        let season = vec![advanced];
        let mut inp = inputs(&season);
        inp.participation = Some(&per_game);
        let out = normalize(&inp, &filter()).unwrap();
        assert_eq!(out.players.len(), 1);
        assert_eq!(out.players[0].games_started, Some(9));
        // Stats still come from the family's own table.
        assert_eq!(out.players[0].stats, vec![4.0]);
    }

    #[test]
    fn missing_games_everywhere_is_integrity_error() {
        let mut bare = row(1, "No Games", "BOS", 0, 0, 4.0);
        bare.games_played = None;
        bare.games_started = None;
        let season = vec![bare];
        let err = normalize(&inputs(&season), &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingParticipation { id: 1, .. }));
    }

    #[test]
    fn supplementary_rows_bypass_filter_and_get_fresh_ids() {
        let season = vec![row(1, "Regular", "BOS", 70, 70, 20.0), row(9, "Barely", "BOS", 2, 0, 1.0)];
        let supplementary = vec![SupplementaryRow {
            name: "Missed Season".into(),
            team: Some("NOP".into()),
            stats: vec![25.0],
        }];
        let mut inp = inputs(&season);
        inp.supplementary = &supplementary;
        let out = normalize(&inp, &filter()).unwrap();

        assert_eq!(out.players.len(), 2);
        let added = &out.players[1];
        assert_eq!(added.name, "Missed Season");
        assert_eq!(added.id, 10);
        assert_eq!(added.origin, RecordOrigin::Supplementary);
        assert_eq!(added.games_played, None);
        assert_eq!(out.summary.supplementary_added, 1);
    }

    #[test]
    fn supplementary_may_replace_a_filtered_player() {
        let season = vec![row(1, "Regular", "BOS", 70, 70, 20.0), row(2, "Hurt Early", "BOS", 3, 3, 22.0)];
        let supplementary = vec![SupplementaryRow {
            name: "Hurt Early".into(),
            team: None,
            stats: vec![22.0],
        }];
        let mut inp = inputs(&season);
        inp.supplementary = &supplementary;
        let out = normalize(&inp, &filter()).unwrap();
        assert_eq!(out.players.len(), 2);
        assert_eq!(out.players[1].origin, RecordOrigin::Supplementary);
    }

    #[test]
    fn supplementary_duplicate_of_survivor_rejected() {
        let season = vec![row(1, "Regular", "BOS", 70, 70, 20.0)];
        let supplementary = vec![SupplementaryRow {
            name: "regular".into(),
            team: None,
            stats: vec![1.0],
        }];
        let mut inp = inputs(&season);
        inp.supplementary = &supplementary;
        let err = normalize(&inp, &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::DuplicatePlayer { .. }));
    }

    #[test]
    fn rookie_copies_comparable_stat_line() {
        let season = vec![
            row(1, "Veteran Wing", "BOS", 70, 70, 18.5),
            row(2, "Veteran Wing Partial", "TOT", 1, 0, 2.0),
        ];
        let rookies = vec![RookieStandIn {
            rookie: "Top Pick".into(),
            comparable: "veteran wing".into(),
        }];
        let mut inp = inputs(&season);
        inp.rookies = &rookies;
        let out = normalize(&inp, &filter()).unwrap();

        let rookie = out.players.iter().find(|p| p.name == "Top Pick").unwrap();
        assert_eq!(rookie.stats, vec![18.5]);
        assert_eq!(
            rookie.origin,
            RecordOrigin::RookieStandIn {
                comparable: "Veteran Wing".into()
            }
        );
        assert_eq!(out.summary.rookies_added, 1);
    }

    #[test]
    fn rookie_comparable_may_be_a_filtered_player() {
        let season = vec![row(1, "Regular", "BOS", 70, 70, 20.0), row(2, "Short Season Vet", "BOS", 4, 2, 9.0)];
        let rookies = vec![RookieStandIn {
            rookie: "Rookie".into(),
            comparable: "Short Season Vet".into(),
        }];
        let mut inp = inputs(&season);
        inp.rookies = &rookies;
        let out = normalize(&inp, &filter()).unwrap();
        assert!(out.players.iter().any(|p| p.name == "Rookie"));
        assert!(!out.players.iter().any(|p| p.name == "Short Season Vet"));
    }

    #[test]
    fn unknown_comparable_rejected() {
        let season = vec![row(1, "Regular", "BOS", 70, 70, 20.0)];
        let rookies = vec![RookieStandIn {
            rookie: "Rookie".into(),
            comparable: "Ghost".into(),
        }];
        let mut inp = inputs(&season);
        inp.rookies = &rookies;
        let err = normalize(&inp, &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::UnknownComparable { .. }));
    }

    #[test]
    fn ambiguous_comparable_rejected() {
        let season = vec![row(1, "Same Name", "BOS", 70, 70, 20.0), row(2, "Same Name", "NYK", 70, 70, 8.0)];
        let rookies = vec![RookieStandIn {
            rookie: "Rookie".into(),
            comparable: "Same Name".into(),
        }];
        let mut inp = inputs(&season);
        inp.rookies = &rookies;
        let err = normalize(&inp, &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::AmbiguousComparable { matches: 2, .. }));
    }

    #[test]
    fn no_duplicate_id_name_pairs_after_normalization() {
        let season = vec![
            row(1, "A", "TOT", 70, 70, 20.0),
            row(1, "A", "BOS", 35, 35, 20.0),
            row(1, "A", "NYK", 35, 35, 20.0),
            row(2, "B", "BOS", 70, 70, 10.0),
            row(3, "C", "NYK", 70, 0, 5.0),
        ];
        let out = normalize(&inputs(&season), &filter()).unwrap();
        let mut seen = HashSet::new();
        for p in &out.players {
            assert!(seen.insert((p.id, p.name.clone())));
        }
        assert_eq!(out.players.len(), 3);
    }

    #[test]
    fn everyone_filtered_is_empty_population() {
        let season = vec![row(1, "Cameo", "BOS", 1, 0, 2.0)];
        let err = normalize(&inputs(&season), &filter()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::EmptyPopulation));
    }

    #[test]
    fn missing_starts_without_participation_match_are_counted() {
        let mut starter = row(1, "Spot Starter", "BOS", 12, 0, 8.0);
        starter.games_started = None;
        let mut joined = row(2, "Joined Starter", "BOS", 12, 0, 9.0);
        joined.games_started = None;
        let season = vec![starter, joined, row(3, "Regular", "BOS", 70, 70, 20.0)];
        let participation = vec![row(2, "Joined Starter", "BOS", 12, 10, 9.0)];

        let mut inp = inputs(&season);
        inp.participation = Some(&participation);
        let out = normalize(&inp, &filter()).unwrap();

        // Only the unmatched row is judged on G alone, and it is counted.
        assert_eq!(out.summary.participation_incomplete, 1);
        assert_eq!(out.summary.filtered_out, 1);
        let names: Vec<&str> = out.players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Joined Starter", "Regular"]);
    }
}
