// Team depth: join players to their upcoming-season team, keep each team's
// best N value scores, sum them.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::analysis::Algorithm;
use crate::config::{AggregationConfig, RosterPolicy};
use crate::error::{InsufficientRosterError, PipelineWarning};
use crate::ingest::normalize::PlayerRecord;
use crate::ingest::tables::{name_key, RosterEntry};

// ---------------------------------------------------------------------------
// Roster join
// ---------------------------------------------------------------------------

/// Upcoming-season rosters keyed by normalized player name.
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    by_name: BTreeMap<String, String>,
    teams: BTreeSet<String>,
}

impl RosterIndex {
    /// Later entries for the same player replace earlier ones.
    pub fn new(entries: &[RosterEntry]) -> Self {
        let mut index = RosterIndex::default();
        for entry in entries {
            index.teams.insert(entry.team.clone());
            if let Some(previous) = index.by_name.insert(name_key(&entry.name), entry.team.clone()) {
                if previous != entry.team {
                    warn!(
                        "roster lists '{}' twice ({} then {}); keeping {}",
                        entry.name, previous, entry.team, entry.team
                    );
                }
            }
        }
        info!(
            "roster index: {} players across {} teams",
            index.by_name.len(),
            index.teams.len()
        );
        index
    }

    pub fn team_of(&self, name: &str) -> Option<&str> {
        self.by_name.get(&name_key(name)).map(String::as_str)
    }

    /// Every team named in the roster table, alphabetical.
    pub fn teams(&self) -> impl Iterator<Item = &str> {
        self.teams.iter().map(String::as_str)
    }
}

/// A roster name claimed by more than one player in the population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousRosterName {
    pub name: String,
    pub team: String,
    /// Ids of every player carrying the name, in population order.
    pub ids: Vec<u32>,
}

/// Upcoming-season team of every normalized player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterJoin {
    /// `teams[i]` belongs to `players[i]`; `None` when unrostered or ambiguous.
    pub teams: Vec<Option<String>>,
    /// Unrostered player names, once each, in population order.
    pub unmatched: Vec<String>,
    /// Rostered names shared by several players. None of them join.
    pub ambiguous: Vec<AmbiguousRosterName>,
}

impl RosterJoin {
    pub fn warnings(&self) -> Vec<PipelineWarning> {
        let unmatched = self
            .unmatched
            .iter()
            .map(|name| PipelineWarning::UnmatchedPlayer { name: name.clone() });
        let ambiguous = self.ambiguous.iter().map(|a| PipelineWarning::AmbiguousRosterName {
            name: a.name.clone(),
            team: a.team.clone(),
            ids: a.ids.clone(),
        });
        unmatched.chain(ambiguous).collect()
    }
}

/// Match each player to a team. The join is shared by both algorithms so
/// unmatched players are reported once.
///
/// One roster entry stands for one player: when several players share a
/// rostered name none of them is joined, and the name is reported.
pub fn join_rosters(players: &[PlayerRecord], index: &RosterIndex) -> RosterJoin {
    let mut ids_by_name: HashMap<String, Vec<u32>> = HashMap::new();
    for player in players {
        ids_by_name.entry(name_key(&player.name)).or_default().push(player.id);
    }

    let mut teams = Vec::with_capacity(players.len());
    let mut unmatched = Vec::new();
    let mut ambiguous = Vec::new();
    let mut seen = HashSet::new();
    for player in players {
        let key = name_key(&player.name);
        let team = match index.team_of(&player.name) {
            None => {
                if seen.insert(key) {
                    warn!("'{}' has no upcoming-season team; excluded from depth", player.name);
                    unmatched.push(player.name.clone());
                }
                None
            }
            Some(team) => match ids_by_name.get(&key) {
                Some(ids) if ids.len() > 1 => {
                    if seen.insert(key) {
                        warn!(
                            "'{}' on {} matches {} players (ids {:?}); none counted",
                            player.name,
                            team,
                            ids.len(),
                            ids
                        );
                        ambiguous.push(AmbiguousRosterName {
                            name: player.name.clone(),
                            team: team.to_string(),
                            ids: ids.clone(),
                        });
                    }
                    None
                }
                _ => Some(team.to_string()),
            },
        };
        teams.push(team);
    }
    let matched = teams.iter().filter(|t| t.is_some()).count();
    info!(
        "roster join: {} of {} players matched, {} unmatched, {} ambiguous names",
        matched,
        players.len(),
        unmatched.len(),
        ambiguous.len()
    );
    RosterJoin {
        teams,
        unmatched,
        ambiguous,
    }
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contributor {
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamDepth {
    pub team: String,
    pub depth: i64,
    /// Selected players, best first.
    pub players: Vec<Contributor>,
    pub eligible: usize,
    /// Fewer than `roster_size` players were eligible.
    pub shortfall: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepthTable {
    pub algorithm: Algorithm,
    pub roster_size: usize,
    /// Alphabetical by team.
    pub teams: Vec<TeamDepth>,
}

impl DepthTable {
    pub fn get(&self, team: &str) -> Option<&TeamDepth> {
        self.teams.iter().find(|t| t.team == team)
    }
}

/// The `n` highest-scoring candidates. Equal scores keep arrival order.
pub fn select_top(candidates: &[(usize, i64)], n: usize) -> Vec<(usize, i64)> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

/// Depth per roster team for one algorithm's player scores.
///
/// Under `RosterPolicy::Fatal` the first short team (alphabetically) aborts
/// the aggregation. Under `Warn` its depth is the sum of every eligible
/// player and the shortfall comes back as a warning.
pub fn aggregate(
    players: &[PlayerRecord],
    scores: &[i64],
    join: &RosterJoin,
    index: &RosterIndex,
    algorithm: Algorithm,
    config: &AggregationConfig,
) -> Result<(DepthTable, Vec<PipelineWarning>), InsufficientRosterError> {
    let mut candidates: BTreeMap<&str, Vec<(usize, i64)>> =
        index.teams().map(|team| (team, Vec::new())).collect();
    for (i, team) in join.teams.iter().enumerate() {
        if let Some(team) = team {
            if let Some(list) = candidates.get_mut(team.as_str()) {
                list.push((i, scores[i]));
            }
        }
    }

    let n = config.roster_size;
    let mut teams = Vec::with_capacity(candidates.len());
    let mut warnings = Vec::new();
    for (team, eligible) in candidates {
        let shortfall = eligible.len() < n;
        if shortfall {
            let err = InsufficientRosterError {
                team: team.to_string(),
                eligible: eligible.len(),
                required: n,
            };
            match config.insufficient_roster {
                RosterPolicy::Fatal => return Err(err),
                RosterPolicy::Warn => {
                    warn!("{}: {}", algorithm, err);
                    warnings.push(PipelineWarning::InsufficientRoster {
                        algorithm: algorithm.label().to_string(),
                        team: err.team,
                        eligible: err.eligible,
                        required: err.required,
                    });
                }
            }
        }

        let selected = select_top(&eligible, n);
        let depth: i64 = selected.iter().map(|(_, s)| s).sum();
        debug!("{} {}: depth {} from {} players", algorithm, team, depth, selected.len());
        teams.push(TeamDepth {
            team: team.to_string(),
            depth,
            players: selected
                .into_iter()
                .map(|(i, score)| Contributor {
                    name: players[i].name.clone(),
                    score,
                })
                .collect(),
            eligible: eligible.len(),
            shortfall,
        });
    }

    info!(
        "{} depth: {} teams, {} short of {} players",
        algorithm,
        teams.len(),
        warnings.len(),
        n
    );
    Ok((
        DepthTable {
            algorithm,
            roster_size: n,
            teams,
        },
        warnings,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
