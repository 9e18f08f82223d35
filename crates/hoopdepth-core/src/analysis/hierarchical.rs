// Agglomerative clustering with complete linkage.
//
// Works on a dense distance matrix updated with the Lance-Williams rule for
// complete linkage, d(k, i+j) = max(d(k, i), d(k, j)). O(n^2) memory and
// O(n^3) time, fine for a few hundred players.

use serde::Serialize;
use tracing::info;

use crate::analysis::{Algorithm, ClusterAssignment};

/// One agglomeration step.
///
/// Cluster ids follow the usual dendrogram convention: leaves are `0..n`,
/// the cluster created by step `s` is `n + s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Full merge history of a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dendrogram {
    pub leaves: usize,
    pub merges: Vec<Merge>,
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// Build the complete-linkage dendrogram for `rows`.
///
/// Each step merges the closest pair of active clusters. Active clusters
/// live in slots named after their lowest member index, so scanning pairs
/// in `(i, j)` order and keeping only strictly smaller distances breaks ties
/// by input order.
pub fn complete_linkage(rows: &[Vec<f64>]) -> Dendrogram {
    let n = rows.len();
    let mut dist = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(&rows[i], &rows[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    let mut active = vec![true; n];
    let mut cluster_id: Vec<usize> = (0..n).collect();
    let mut size = vec![1usize; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for step in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if !active[i] {
                continue;
            }
            for j in (i + 1)..n {
                if !active[j] {
                    continue;
                }
                let d = dist[i][j];
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, d)) = best else {
            break;
        };

        for k in 0..n {
            if active[k] && k != i && k != j {
                let merged = dist[i][k].max(dist[j][k]);
                dist[i][k] = merged;
                dist[k][i] = merged;
            }
        }
        active[j] = false;
        size[i] += size[j];
        merges.push(Merge {
            left: cluster_id[i],
            right: cluster_id[j],
            distance: d,
            size: size[i],
        });
        cluster_id[i] = n + step;
    }

    Dendrogram { leaves: n, merges }
}

impl Dendrogram {
    /// Cut into exactly `k` flat clusters (or one per leaf when there are
    /// fewer than `k` leaves) by replaying the first `n - k` merges.
    ///
    /// Complete linkage never produces inversions, so this matches cutting
    /// the tree at the height that leaves `k` clusters. Labels run `1..=k`
    /// in order of each cluster's lowest member index.
    pub fn cut(&self, k: usize) -> Vec<usize> {
        let n = self.leaves;
        let k = k.clamp(1, n.max(1));
        let replay = n.saturating_sub(k).min(self.merges.len());

        let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        let mut consumed = vec![false; n + replay];
        for merge in &self.merges[..replay] {
            let mut joined = std::mem::take(&mut members[merge.left]);
            joined.extend(std::mem::take(&mut members[merge.right]));
            consumed[merge.left] = true;
            consumed[merge.right] = true;
            members.push(joined);
        }

        let mut clusters: Vec<Vec<usize>> = members
            .into_iter()
            .enumerate()
            .filter(|(id, m)| !consumed[*id] && !m.is_empty())
            .map(|(_, m)| m)
            .collect();
        clusters.sort_by_key(|m| m.iter().copied().min().unwrap_or(usize::MAX));

        let mut labels = vec![0; n];
        for (idx, cluster) in clusters.iter().enumerate() {
            for &leaf in cluster {
                labels[leaf] = idx + 1;
            }
        }
        labels
    }

    /// Distance of the last merge replayed by `cut(k)`, if any.
    pub fn cut_height(&self, k: usize) -> Option<f64> {
        let replay = self.leaves.saturating_sub(k.max(1)).min(self.merges.len());
        replay.checked_sub(1).map(|last| self.merges[last].distance)
    }
}

/// Run complete-linkage clustering and cut into `k` flat clusters.
pub fn cluster(rows: &[Vec<f64>], k: usize) -> (ClusterAssignment, Dendrogram) {
    let dendrogram = complete_linkage(rows);
    let labels = dendrogram.cut(k);
    let effective_k = k.min(rows.len()).max(1);
    info!(
        "hierarchical: {} players, {} merges, cut into {} clusters",
        rows.len(),
        dendrogram.merges.len(),
        effective_k
    );
    (
        ClusterAssignment {
            algorithm: Algorithm::Hierarchical,
            k: effective_k,
            labels,
        },
        dendrogram,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
