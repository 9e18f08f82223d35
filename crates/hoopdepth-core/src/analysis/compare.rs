// Depth ranks against the external reference ranking.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::analysis::depth::DepthTable;
use crate::error::PipelineWarning;
use crate::ingest::tables::ReferenceRanking;

/// Where a team landed under one ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Standing {
    pub depth: i64,
    pub rank: usize,
    /// `reference_rank - rank`; positive means the depth ranking rates the
    /// team higher than the reference does.
    pub diff: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CombinedStanding {
    /// Mean of the two algorithm ranks.
    pub mean_rank: f64,
    pub rank: usize,
    pub diff: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamComparison {
    pub team: String,
    pub hierarchical: Standing,
    pub partition: Standing,
    pub combined: CombinedStanding,
    pub reference_rank: Option<usize>,
}

/// Mean absolute rank difference against the reference, over teams present
/// in both tables. `None` when no team overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitMetrics {
    pub hierarchical_mad: Option<f64>,
    pub partition_mad: Option<f64>,
    pub combined_mad: Option<f64>,
    pub compared_teams: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankComparison {
    /// Ordered by combined rank.
    pub teams: Vec<TeamComparison>,
    pub metrics: FitMetrics,
    /// Reference teams with no roster entry.
    pub reference_only: Vec<String>,
}

/// Rank `values` best first, ties by team name, so ranks are a permutation
/// of `1..=len`.
fn rank_order<T, F>(values: &BTreeMap<String, T>, mut better: F) -> BTreeMap<String, usize>
where
    F: FnMut(&T, &T) -> std::cmp::Ordering,
{
    let mut order: Vec<(&String, &T)> = values.iter().collect();
    // BTreeMap iteration is already name-ascending and the sort is stable.
    order.sort_by(|a, b| better(a.1, b.1));
    order
        .into_iter()
        .enumerate()
        .map(|(idx, (team, _))| (team.clone(), idx + 1))
        .collect()
}

/// Depth rank per team: highest depth first, ties by team name.
pub fn depth_ranks(depths: &BTreeMap<String, i64>) -> BTreeMap<String, usize> {
    rank_order(depths, |a, b| b.cmp(a))
}

fn mean_abs(diffs: impl Iterator<Item = i64>) -> Option<f64> {
    let (sum, count) = diffs.fold((0i64, 0usize), |(s, c), d| (s + d.abs(), c + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

/// Compare both depth tables with the reference ranking.
///
/// A team missing from one depth table counts as depth 0 there. Teams with
/// no reference rank stay in the table without differences and produce a
/// `MissingReferenceRank` warning.
pub fn compare(
    hierarchical: &DepthTable,
    partition: &DepthTable,
    reference: &ReferenceRanking,
) -> (RankComparison, Vec<PipelineWarning>) {
    let teams: BTreeSet<String> = hierarchical
        .teams
        .iter()
        .chain(&partition.teams)
        .map(|t| t.team.clone())
        .collect();
    let depth_of = |table: &DepthTable, team: &str| table.get(team).map_or(0, |t| t.depth);

    let hier_depths: BTreeMap<String, i64> = teams.iter().map(|t| (t.clone(), depth_of(hierarchical, t))).collect();
    let part_depths: BTreeMap<String, i64> = teams.iter().map(|t| (t.clone(), depth_of(partition, t))).collect();
    let hier_ranks = depth_ranks(&hier_depths);
    let part_ranks = depth_ranks(&part_depths);

    let mean_ranks: BTreeMap<String, f64> = teams
        .iter()
        .map(|t| {
            let mean = (hier_ranks[t] + part_ranks[t]) as f64 / 2.0;
            (t.clone(), mean)
        })
        .collect();
    let combined_ranks = rank_order(&mean_ranks, |a, b| a.total_cmp(b));

    let mut warnings = Vec::new();
    let mut rows = Vec::with_capacity(teams.len());
    for team in &teams {
        let reference_rank = reference.rank_of(team);
        if reference_rank.is_none() {
            warn!("team `{}` has no reference rank; left out of the fit metrics", team);
            warnings.push(PipelineWarning::MissingReferenceRank { team: team.clone() });
        }
        let diff = |rank: usize| reference_rank.map(|r| r as i64 - rank as i64);
        rows.push(TeamComparison {
            team: team.clone(),
            hierarchical: Standing {
                depth: hier_depths[team],
                rank: hier_ranks[team],
                diff: diff(hier_ranks[team]),
            },
            partition: Standing {
                depth: part_depths[team],
                rank: part_ranks[team],
                diff: diff(part_ranks[team]),
            },
            combined: CombinedStanding {
                mean_rank: mean_ranks[team],
                rank: combined_ranks[team],
                diff: diff(combined_ranks[team]),
            },
            reference_rank,
        });
    }
    rows.sort_by_key(|r| r.combined.rank);

    let reference_only: Vec<String> = reference
        .ranks
        .keys()
        .filter(|t| !teams.contains(*t))
        .cloned()
        .collect();
    for team in &reference_only {
        info!("reference team `{}` has no roster entry", team);
    }

    let metrics = FitMetrics {
        hierarchical_mad: mean_abs(rows.iter().filter_map(|r| r.hierarchical.diff)),
        partition_mad: mean_abs(rows.iter().filter_map(|r| r.partition.diff)),
        combined_mad: mean_abs(rows.iter().filter_map(|r| r.combined.diff)),
        compared_teams: rows.iter().filter(|r| r.reference_rank.is_some()).count(),
    };
    info!(
        "compared {} teams: MAD hierarchical {:?}, partition {:?}, combined {:?}",
        metrics.compared_teams, metrics.hierarchical_mad, metrics.partition_mad, metrics.combined_mad
    );

    (
        RankComparison {
            teams: rows,
            metrics,
            reference_only,
        },
        warnings,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::depth::TeamDepth;
    use crate::analysis::Algorithm;

    fn table(algorithm: Algorithm, depths: &[(&str, i64)]) -> DepthTable {
        DepthTable {
            algorithm,
            roster_size: 9,
            teams: depths
                .iter()
                .map(|(team, depth)| TeamDepth {
                    team: team.to_string(),
                    depth: *depth,
                    players: vec![],
                    eligible: 9,
                    shortfall: false,
                })
                .collect(),
        }
    }

    fn reference(ranks: &[(&str, usize)]) -> ReferenceRanking {
        ReferenceRanking {
            ranks: ranks.iter().map(|(t, r)| (t.to_string(), *r)).collect(),
        }
    }

    fn depths(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(t, d)| (t.to_string(), *d)).collect()
    }

    #[test]
    fn depth_ties_broken_by_team_name() {
        let ranks = depth_ranks(&depths(&[("PHI", 40), ("ATL", 50), ("BOS", 40)]));
        assert_eq!(ranks["ATL"], 1);
        assert_eq!(ranks["BOS"], 2);
        assert_eq!(ranks["PHI"], 3);
    }

    #[test]
    fn ranks_are_a_permutation() {
        let depths: BTreeMap<String, i64> = (0..30).map(|i| (format!("T{i:02}"), (i * 7 % 5) as i64)).collect();
        let ranks = depth_ranks(&depths);
        let mut seen: Vec<usize> = ranks.values().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn combined_rank_orders_by_mean_rank() {
        // Hierarchical: A1 B2 C3. Partition: B1 C2 A3.
        let hier = table(Algorithm::Hierarchical, &[("A", 60), ("B", 50), ("C", 40)]);
        let part = table(Algorithm::Partition, &[("A", 10), ("B", 70), ("C", 30)]);
        let (comparison, _) = compare(&hier, &part, &reference(&[("A", 1), ("B", 2), ("C", 3)]));
        let order: Vec<&str> = comparison.teams.iter().map(|t| t.team.as_str()).collect();
        // Means: A 2.0, B 1.5, C 2.5.
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(comparison.teams[0].combined.mean_rank, 1.5);
        assert_eq!(comparison.teams[0].combined.rank, 1);
    }

    #[test]
    fn signed_difference_and_mean_absolute_difference() {
        let hier = table(Algorithm::Hierarchical, &[("A", 60), ("B", 50), ("C", 40)]);
        let part = table(Algorithm::Partition, &[("A", 60), ("B", 50), ("C", 40)]);
        // Reference reverses the depth order.
        let (comparison, warnings) = compare(&hier, &part, &reference(&[("A", 3), ("B", 2), ("C", 1)]));
        assert!(warnings.is_empty());
        let a = comparison.teams.iter().find(|t| t.team == "A").unwrap();
        assert_eq!(a.hierarchical.rank, 1);
        assert_eq!(a.hierarchical.diff, Some(2));
        let c = comparison.teams.iter().find(|t| t.team == "C").unwrap();
        assert_eq!(c.partition.diff, Some(-2));
        // |2| + |0| + |-2| over 3 teams.
        assert_eq!(comparison.metrics.hierarchical_mad, Some(4.0 / 3.0));
        assert_eq!(comparison.metrics.combined_mad, Some(4.0 / 3.0));
        assert_eq!(comparison.metrics.compared_teams, 3);
    }

    #[test]
    fn perfect_agreement_has_zero_difference() {
        let hier = table(Algorithm::Hierarchical, &[("A", 60), ("B", 50)]);
        let (comparison, _) = compare(&hier, &hier.clone(), &reference(&[("A", 1), ("B", 2)]));
        assert_eq!(comparison.metrics.partition_mad, Some(0.0));
    }

    #[test]
    fn team_without_reference_is_kept_and_warned() {
        let hier = table(Algorithm::Hierarchical, &[("A", 60), ("B", 50), ("X", 10)]);
        let part = hier.clone();
        let (comparison, warnings) = compare(&hier, &part, &reference(&[("A", 2), ("B", 1), ("Z", 3)]));
        assert_eq!(comparison.teams.len(), 3);
        let x = comparison.teams.iter().find(|t| t.team == "X").unwrap();
        assert_eq!(x.reference_rank, None);
        assert_eq!(x.combined.diff, None);
        assert_eq!(warnings, vec![PipelineWarning::MissingReferenceRank { team: "X".to_string() }]);
        assert_eq!(comparison.metrics.compared_teams, 2);
        assert_eq!(comparison.metrics.hierarchical_mad, Some(1.0));
        assert_eq!(comparison.reference_only, vec!["Z".to_string()]);
    }

    #[test]
    fn no_overlap_leaves_metrics_empty() {
        let hier = table(Algorithm::Hierarchical, &[("A", 1)]);
        let (comparison, _) = compare(&hier, &hier.clone(), &ReferenceRanking::default());
        assert_eq!(comparison.metrics.combined_mad, None);
    }
}
