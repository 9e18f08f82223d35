// Cluster label -> value score.
//
// Label numbers say nothing about quality, so the default mapping orders
// clusters by their centroid statistics and hands out the score ladder best
// first. A fixed label-indexed table is still accepted from configuration.

use serde::Serialize;
use std::cmp::Ordering;
use tracing::{info, warn};

use crate::analysis::scaler::ScaledMatrix;
use crate::analysis::{Algorithm, ClusterAssignment};
use crate::config::{FamilyConfig, RankBy, ScoringConfig, ScoringMode};
use crate::ingest::normalize::PlayerRecord;

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterProfile {
    pub label: usize,
    pub size: usize,
    /// Mean raw value per configured feature, in family feature order.
    /// Empty clusters report zeros.
    pub raw_means: Vec<f64>,
    /// Mean z-score per scaled feature, in matrix feature order.
    pub scaled_means: Vec<f64>,
    /// The value clusters were ordered by; `None` for an empty cluster.
    pub rank_value: Option<f64>,
    pub score: i64,
}

/// The label -> score table for one algorithm, with the profiles behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueScores {
    pub algorithm: Algorithm,
    pub mode: ScoringMode,
    /// `by_label[label - 1]`.
    pub by_label: Vec<i64>,
    pub profiles: Vec<ClusterProfile>,
}

impl ValueScores {
    pub fn score_of(&self, label: usize) -> i64 {
        self.by_label[label - 1]
    }

    /// Score of every player, aligned with the assignment's labels.
    pub fn player_scores(&self, assignment: &ClusterAssignment) -> Vec<i64> {
        assignment.labels.iter().map(|&l| self.score_of(l)).collect()
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Build a profile per label `1..=k` with `score` left at zero.
pub fn cluster_profiles(
    assignment: &ClusterAssignment,
    players: &[PlayerRecord],
    matrix: &ScaledMatrix,
    rank_by: &RankBy,
    family_features: &[String],
) -> Vec<ClusterProfile> {
    let raw_dims = family_features.len();
    let scaled_dims = matrix.dims();
    let rank_column = match rank_by {
        RankBy::Feature(name) => family_features.iter().position(|f| f == name),
        RankBy::Composite => None,
    };

    (1..=assignment.k)
        .map(|label| {
            let members = assignment.members(label);
            let size = members.len();
            let mut raw_means = vec![0.0; raw_dims];
            let mut scaled_means = vec![0.0; scaled_dims];
            for &i in &members {
                for (acc, v) in raw_means.iter_mut().zip(&players[i].stats) {
                    *acc += v;
                }
                for (acc, v) in scaled_means.iter_mut().zip(&matrix.rows[i]) {
                    *acc += v;
                }
            }
            if size > 0 {
                raw_means.iter_mut().for_each(|v| *v /= size as f64);
                scaled_means.iter_mut().for_each(|v| *v /= size as f64);
            }

            let rank_value = (size > 0).then(|| match (rank_by, rank_column) {
                (RankBy::Feature(_), Some(col)) => raw_means[col],
                _ => scaled_means.iter().sum::<f64>() / scaled_dims.max(1) as f64,
            });

            ClusterProfile {
                label,
                size,
                raw_means,
                scaled_means,
                rank_value,
                score: 0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// Labels ordered best first: by `rank_value` descending, empty clusters
/// last, ties by label.
pub fn order_clusters(profiles: &[ClusterProfile]) -> Vec<usize> {
    let mut order: Vec<&ClusterProfile> = profiles.iter().collect();
    order.sort_by(|a, b| match (a.rank_value, b.rank_value) {
        (Some(x), Some(y)) => y.total_cmp(&x).then(a.label.cmp(&b.label)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.label.cmp(&b.label),
    });
    order.into_iter().map(|p| p.label).collect()
}

/// Hand out `ladder` in cluster order. Returns `by_label`.
pub fn derived_scores(profiles: &[ClusterProfile], ladder: &[i64]) -> Vec<i64> {
    let mut by_label = vec![0; profiles.len()];
    for (position, label) in order_clusters(profiles).into_iter().enumerate() {
        by_label[label - 1] = ladder.get(position).copied().unwrap_or(0);
    }
    by_label
}

/// The first `k` entries of a label-indexed table.
pub fn fixed_scores(table: &[i64], k: usize) -> Vec<i64> {
    (0..k).map(|i| table.get(i).copied().unwrap_or(0)).collect()
}

/// Score every cluster of `assignment` according to the configured mode.
pub fn score(
    assignment: &ClusterAssignment,
    players: &[PlayerRecord],
    matrix: &ScaledMatrix,
    family: &FamilyConfig,
    scoring: &ScoringConfig,
) -> ValueScores {
    let rank_by = family.rank_key();
    let mut profiles = cluster_profiles(assignment, players, matrix, &rank_by, &family.features);

    let fixed_table = family.fixed_scores.as_ref().map(|t| match assignment.algorithm {
        Algorithm::Hierarchical => t.hierarchical.as_slice(),
        Algorithm::Partition => t.partition.as_slice(),
    });
    let (mode, by_label) = match (scoring.mode, fixed_table) {
        (ScoringMode::Fixed, Some(table)) => (ScoringMode::Fixed, fixed_scores(table, assignment.k)),
        (ScoringMode::Fixed, None) => {
            warn!(
                "family `{}` has no fixed score table; deriving {} scores from centroids",
                family.name, assignment.algorithm
            );
            (ScoringMode::Derived, derived_scores(&profiles, &scoring.ladder))
        }
        (ScoringMode::Derived, _) => (ScoringMode::Derived, derived_scores(&profiles, &scoring.ladder)),
    };

    for profile in &mut profiles {
        profile.score = by_label[profile.label - 1];
    }
    info!(
        "{} scores ({:?}) by label: {:?}",
        assignment.algorithm, mode, by_label
    );

    ValueScores {
        algorithm: assignment.algorithm,
        mode,
        by_label,
        profiles,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scaler::scale;
    use crate::config::{DegeneratePolicy, FixedScores};
    use crate::ingest::normalize::RecordOrigin;

    const LADDER: [i64; 3] = [15, 10, 5];

    fn player(id: u32, stats: Vec<f64>) -> PlayerRecord {
        PlayerRecord {
            id,
            name: format!("Player {id}"),
            season_team: None,
            games_played: Some(60),
            games_started: Some(40),
            stats,
            origin: RecordOrigin::Season,
        }
    }

    fn features() -> Vec<String> {
        vec!["PTS".to_string(), "AST".to_string()]
    }

    fn family(rank_by: &str, fixed: Option<FixedScores>) -> FamilyConfig {
        FamilyConfig {
            name: "basic".to_string(),
            enabled: true,
            source: "per_game.csv".to_string(),
            participation: None,
            supplementary: None,
            features: features(),
            rank_by: rank_by.to_string(),
            fixed_scores: fixed,
        }
    }

    fn scoring(mode: ScoringMode) -> ScoringConfig {
        ScoringConfig {
            mode,
            ladder: LADDER.to_vec(),
        }
    }

    /// Label 1: bench scorers with many assists, label 2: stars,
    /// label 3: role players.
    fn fixture() -> (Vec<PlayerRecord>, ScaledMatrix, ClusterAssignment) {
        let players = vec![
            player(1, vec![6.0, 7.0]),
            player(2, vec![28.0, 5.0]),
            player(3, vec![12.0, 2.0]),
            player(4, vec![5.0, 8.0]),
            player(5, vec![26.0, 6.0]),
            player(6, vec![11.0, 1.0]),
        ];
        let matrix = scale(&players, &features(), DegeneratePolicy::Abort).unwrap();
        let assignment = ClusterAssignment {
            algorithm: Algorithm::Partition,
            k: 3,
            labels: vec![1, 2, 3, 1, 2, 3],
        };
        (players, matrix, assignment)
    }

    #[test]
    fn profiles_hold_raw_and_scaled_means() {
        let (players, matrix, assignment) = fixture();
        let profiles = cluster_profiles(&assignment, &players, &matrix, &RankBy::Composite, &features());
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[1].label, 2);
        assert_eq!(profiles[1].size, 2);
        assert_eq!(profiles[1].raw_means, vec![27.0, 5.5]);
        // Scaled means across clusters of equal size average back to zero.
        let total: f64 = profiles.iter().map(|p| p.scaled_means[0]).sum();
        assert!(total.abs() < 1e-9);
    }

    #[test]
    fn derived_by_feature_rewards_highest_mean() {
        let (players, matrix, assignment) = fixture();
        let scores = score(&assignment, &players, &matrix, &family("PTS", None), &scoring(ScoringMode::Derived));
        // PTS means: label 1 = 5.5, label 2 = 27, label 3 = 11.5.
        assert_eq!(scores.by_label, vec![5, 15, 10]);
        assert_eq!(scores.mode, ScoringMode::Derived);
        assert_eq!(scores.profiles[1].score, 15);
        assert_eq!(scores.player_scores(&assignment), vec![5, 15, 10, 5, 15, 10]);
    }

    #[test]
    fn derived_ranking_follows_the_chosen_feature() {
        let (players, matrix, assignment) = fixture();
        let scores = score(&assignment, &players, &matrix, &family("AST", None), &scoring(ScoringMode::Derived));
        // AST means: label 1 = 7.5, label 2 = 5.5, label 3 = 1.5.
        assert_eq!(scores.by_label, vec![15, 10, 5]);
    }

    #[test]
    fn composite_uses_mean_of_scaled_features() {
        let (players, matrix, assignment) = fixture();
        let profiles = cluster_profiles(&assignment, &players, &matrix, &RankBy::Composite, &features());
        for p in &profiles {
            let expected = (p.scaled_means[0] + p.scaled_means[1]) / 2.0;
            assert!((p.rank_value.unwrap() - expected).abs() < 1e-12);
        }
        let scores = score(&assignment, &players, &matrix, &family("composite", None), &scoring(ScoringMode::Derived));
        // The stars lead on points by far more than they trail on assists.
        assert_eq!(scores.score_of(2), 15);
        assert_eq!(scores.score_of(3), 5);
    }

    #[test]
    fn empty_clusters_rank_last_and_ties_go_to_lower_label() {
        let profile = |label: usize, rank_value: Option<f64>| ClusterProfile {
            label,
            size: usize::from(rank_value.is_some()),
            raw_means: vec![],
            scaled_means: vec![],
            rank_value,
            score: 0,
        };
        let profiles = vec![
            profile(1, None),
            profile(2, Some(1.0)),
            profile(3, Some(3.0)),
            profile(4, Some(1.0)),
        ];
        assert_eq!(order_clusters(&profiles), vec![3, 2, 4, 1]);
        assert_eq!(derived_scores(&profiles, &[15, 10, 5, 3]), vec![3, 10, 15, 5]);
    }

    #[test]
    fn fixed_table_is_indexed_by_label() {
        let (players, matrix, assignment) = fixture();
        let fixed = FixedScores {
            hierarchical: vec![1, 1, 1],
            partition: vec![10, 5, 15],
        };
        let scores = score(&assignment, &players, &matrix, &family("PTS", Some(fixed)), &scoring(ScoringMode::Fixed));
        assert_eq!(scores.mode, ScoringMode::Fixed);
        assert_eq!(scores.by_label, vec![10, 5, 15]);
        assert_eq!(scores.profiles[2].score, 15);
    }

    #[test]
    fn fixed_mode_without_table_derives() {
        let (players, matrix, assignment) = fixture();
        let scores = score(&assignment, &players, &matrix, &family("PTS", None), &scoring(ScoringMode::Fixed));
        assert_eq!(scores.mode, ScoringMode::Derived);
        assert_eq!(scores.by_label, vec![5, 15, 10]);
    }

    #[test]
    fn fixed_scores_truncate_to_effective_k() {
        assert_eq!(fixed_scores(&[3, 10, 1, 15, 5], 3), vec![3, 10, 1]);
    }
}
