// Source table loading.
//
// Reads basketball-reference style CSV exports (per-game and advanced), the
// hand-curated supplementary and rookie stand-in tables, the upcoming-season
// roster table and the reference ranking. Extra columns are absorbed via
// `#[serde(flatten)]`, so exports with more columns than we use load as-is.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::DataIntegrityError;

/// Column holding the per-season unique player id.
pub const ID_COLUMN: &str = "Rk";
pub const PLAYER_COLUMN: &str = "Player";
pub const TEAM_COLUMNS: &[&str] = &["Tm", "Team"];
pub const GAMES_COLUMN: &str = "G";
pub const STARTS_COLUMN: &str = "GS";

/// Team code basketball-reference uses for a multi-team season total.
pub const SEASON_TOTAL_TEAM: &str = "TOT";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One row of a season statistics export.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonRow {
    pub id: u32,
    pub name: String,
    pub team: String,
    pub games_played: Option<u32>,
    pub games_started: Option<u32>,
    /// Values for the requested feature columns, in request order.
    pub stats: Vec<f64>,
}

impl SeasonRow {
    pub fn is_season_total(&self) -> bool {
        self.team == SEASON_TOTAL_TEAM
    }
}

/// A hand-curated stat line for a player missing from the season table.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementaryRow {
    pub name: String,
    pub team: Option<String>,
    pub stats: Vec<f64>,
}

/// A rookie who borrows a comparable veteran's stat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RookieStandIn {
    pub rookie: String,
    pub comparable: String,
}

/// A player's team for the upcoming season.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub team: String,
}

/// External expert ranking, team -> rank (1 = best).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceRanking {
    pub ranks: BTreeMap<String, usize>,
}

impl ReferenceRanking {
    pub fn rank_of(&self, team: &str) -> Option<usize> {
        self.ranks.get(team).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

/// Any table keyed by a `Player` column. Everything else lands in `columns`.
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawPlayerRow {
    Player: String,
    #[serde(flatten)]
    columns: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawRookie {
    Rookie: String,
    Comparable: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawRosterEntry {
    Player: String,
    Team: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawReference {
    Team: String,
    Rank: u32,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Normalize a player name as exported by basketball-reference.
///
/// Drops the `\slug` suffix some exports append, the Hall-of-Fame `*`
/// marker, and collapses runs of whitespace.
pub fn clean_name(raw: &str) -> String {
    let base = raw.split('\\').next().unwrap_or(raw);
    let base = base.trim().trim_end_matches('*');
    base.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key used to match player names across tables.
pub fn name_key(name: &str) -> String {
    clean_name(name).to_lowercase()
}

fn numeric(columns: &HashMap<String, Value>, key: &str) -> Option<f64> {
    match columns.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn text(columns: &HashMap<String, Value>, key: &str) -> Option<String> {
    match columns.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn team_of(columns: &HashMap<String, Value>) -> Option<String> {
    TEAM_COLUMNS.iter().find_map(|col| text(columns, col))
}

fn games(columns: &HashMap<String, Value>, key: &str) -> Option<u32> {
    numeric(columns, key)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
}

/// Extract the requested stat columns. Empty cells read as 0.0; a
/// non-finite or non-numeric value rejects the row.
fn stat_line(columns: &HashMap<String, Value>, features: &[String], name: &str) -> Option<Vec<f64>> {
    let mut stats = Vec::with_capacity(features.len());
    for feature in features {
        let value = match columns.get(feature) {
            Some(Value::String(s)) if s.trim().is_empty() => {
                debug!("'{}': empty {} read as 0.0", name, feature);
                0.0
            }
            _ => match numeric(columns, feature) {
                Some(v) if v.is_finite() => v,
                _ => {
                    warn!("skipping '{}': non-numeric {} value", name, feature);
                    return None;
                }
            },
        };
        stats.push(value);
    }
    Some(stats)
}

fn require_columns(
    headers: &csv::StringRecord,
    required: &[&str],
    origin: &str,
) -> Result<(), DataIntegrityError> {
    let present: HashSet<&str> = headers.iter().map(str::trim).collect();
    for column in required {
        if !present.contains(column) {
            return Err(DataIntegrityError::MissingColumn {
                path: origin.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn require_team_column(headers: &csv::StringRecord, origin: &str) -> Result<(), DataIntegrityError> {
    if headers.iter().any(|h| TEAM_COLUMNS.contains(&h.trim())) {
        Ok(())
    } else {
        Err(DataIntegrityError::MissingColumn {
            path: origin.to_string(),
            column: TEAM_COLUMNS.join("|"),
        })
    }
}

fn csv_err(origin: &str) -> impl Fn(csv::Error) -> LoadError + '_ {
    move |source| LoadError::Csv {
        path: origin.to_string(),
        source,
    }
}

fn open(path: &Path) -> Result<std::fs::File, LoadError> {
    std::fs::File::open(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Reader-based loaders (enable testing without temp files)
// ---------------------------------------------------------------------------

pub(crate) fn season_rows_from_reader<R: Read>(
    rdr: R,
    origin: &str,
    features: &[String],
    require_games: bool,
) -> Result<Vec<SeasonRow>, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err(origin))?.clone();

    let mut required: Vec<&str> = vec![ID_COLUMN, PLAYER_COLUMN];
    if require_games {
        required.extend([GAMES_COLUMN, STARTS_COLUMN]);
    }
    required.extend(features.iter().map(String::as_str));
    require_columns(&headers, &required, origin)?;
    require_team_column(&headers, origin)?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<RawPlayerRow>() {
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}: skipping malformed row: {}", origin, e);
                continue;
            }
        };
        let name = clean_name(&raw.Player);
        let Some(id) = numeric(&raw.columns, ID_COLUMN)
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u32)
        else {
            // Repeated header lines in pasted exports land here.
            warn!("{}: skipping '{}': no numeric {}", origin, name, ID_COLUMN);
            continue;
        };
        let Some(team) = team_of(&raw.columns) else {
            warn!("{}: skipping '{}': no team", origin, name);
            continue;
        };
        let Some(stats) = stat_line(&raw.columns, features, &name) else {
            continue;
        };
        rows.push(SeasonRow {
            id,
            name,
            team,
            games_played: games(&raw.columns, GAMES_COLUMN),
            games_started: games(&raw.columns, STARTS_COLUMN),
            stats,
        });
    }
    Ok(rows)
}

pub(crate) fn supplementary_from_reader<R: Read>(
    rdr: R,
    origin: &str,
    features: &[String],
) -> Result<Vec<SupplementaryRow>, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err(origin))?.clone();
    let mut required: Vec<&str> = vec![PLAYER_COLUMN];
    required.extend(features.iter().map(String::as_str));
    require_columns(&headers, &required, origin)?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<RawPlayerRow>() {
        match result {
            Ok(raw) => {
                let name = clean_name(&raw.Player);
                let Some(stats) = stat_line(&raw.columns, features, &name) else {
                    continue;
                };
                rows.push(SupplementaryRow {
                    team: team_of(&raw.columns),
                    name,
                    stats,
                });
            }
            Err(e) => warn!("{}: skipping malformed row: {}", origin, e),
        }
    }
    Ok(rows)
}

pub(crate) fn rookies_from_reader<R: Read>(rdr: R, origin: &str) -> Result<Vec<RookieStandIn>, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err(origin))?.clone();
    require_columns(&headers, &["Rookie", "Comparable"], origin)?;

    let mut rookies = Vec::new();
    for result in reader.deserialize::<RawRookie>() {
        match result {
            Ok(raw) => rookies.push(RookieStandIn {
                rookie: clean_name(&raw.Rookie),
                comparable: clean_name(&raw.Comparable),
            }),
            Err(e) => warn!("{}: skipping malformed row: {}", origin, e),
        }
    }
    Ok(rookies)
}

pub(crate) fn roster_from_reader<R: Read>(rdr: R, origin: &str) -> Result<Vec<RosterEntry>, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err(origin))?.clone();
    require_columns(&headers, &[PLAYER_COLUMN, "Team"], origin)?;

    let mut entries = Vec::new();
    for result in reader.deserialize::<RawRosterEntry>() {
        match result {
            Ok(raw) => {
                let team = raw.Team.trim().to_string();
                if team.is_empty() {
                    warn!("{}: skipping '{}': empty team", origin, raw.Player.trim());
                    continue;
                }
                entries.push(RosterEntry {
                    name: clean_name(&raw.Player),
                    team,
                });
            }
            Err(e) => warn!("{}: skipping malformed row: {}", origin, e),
        }
    }
    Ok(entries)
}

pub(crate) fn reference_from_reader<R: Read>(rdr: R, origin: &str) -> Result<ReferenceRanking, LoadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err(origin))?.clone();
    require_columns(&headers, &["Team", "Rank"], origin)?;

    let mut ranks = BTreeMap::new();
    let mut used = HashSet::new();
    for result in reader.deserialize::<RawReference>() {
        let raw = result.map_err(csv_err(origin))?;
        let team = raw.Team.trim().to_string();
        let rank = raw.Rank as usize;
        if rank == 0 {
            return Err(DataIntegrityError::InvalidReference(format!("`{team}` has rank 0; ranks start at 1")).into());
        }
        if !used.insert(rank) {
            return Err(DataIntegrityError::InvalidReference(format!("rank {rank} is assigned twice")).into());
        }
        if ranks.insert(team.clone(), rank).is_some() {
            return Err(DataIntegrityError::InvalidReference(format!("team `{team}` is listed twice")).into());
        }
    }
    Ok(ReferenceRanking { ranks })
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load a season statistics export, keeping the given feature columns.
pub fn load_season_table(path: &Path, features: &[String]) -> Result<Vec<SeasonRow>, LoadError> {
    season_rows_from_reader(open(path)?, &path.display().to_string(), features, false)
}

/// Load games played/started from a table that must carry both columns.
pub fn load_participation_table(path: &Path) -> Result<Vec<SeasonRow>, LoadError> {
    season_rows_from_reader(open(path)?, &path.display().to_string(), &[], true)
}

pub fn load_supplementary_table(path: &Path, features: &[String]) -> Result<Vec<SupplementaryRow>, LoadError> {
    supplementary_from_reader(open(path)?, &path.display().to_string(), features)
}

pub fn load_rookie_table(path: &Path) -> Result<Vec<RookieStandIn>, LoadError> {
    rookies_from_reader(open(path)?, &path.display().to_string())
}

pub fn load_roster_table(path: &Path) -> Result<Vec<RosterEntry>, LoadError> {
    roster_from_reader(open(path)?, &path.display().to_string())
}

pub fn load_reference_ranking(path: &Path) -> Result<ReferenceRanking, LoadError> {
    reference_from_reader(open(path)?, &path.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
