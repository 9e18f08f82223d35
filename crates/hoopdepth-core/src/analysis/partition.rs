// Seeded k-means: k-means++ seeding, Lloyd iterations, best of `n_init` runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{Algorithm, ClusterAssignment};
use crate::config::ClusteringConfig;
use crate::error::ClusterConvergenceWarning;

/// What the selected k-means run looked like, and how many runs were tried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDiagnostics {
    /// Assignment passes performed by the selected run.
    pub iterations: usize,
    /// Sum of squared distances from each player to its centroid.
    pub inertia: f64,
    /// True when the selected run stopped because no assignment changed.
    pub converged: bool,
    pub runs: usize,
    /// Runs that finished with at least one centroid owning no players.
    pub empty_runs: usize,
    /// Centroids of the selected run in scaled feature space, label order.
    pub centroids: Vec<Vec<f64>>,
}

/// One Lloyd run from one k-means++ seeding. Labels are 0-based here.
#[derive(Debug, Clone)]
struct Run {
    labels: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
    iterations: usize,
    converged: bool,
    has_empty: bool,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest(row: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(row, centroid);
        if d < best_dist {
            best_dist = d;
            best = idx;
        }
    }
    best
}

/// k-means++ seeding: the first centroid uniformly, each next one with
/// probability proportional to its squared distance from the nearest
/// centroid chosen so far. When every point already sits on a centroid the
/// pick falls back to uniform.
fn seed_centroids(rows: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = rows.len();
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    centroids.push(rows[rng.random_range(0..n)].clone());

    let mut min_dist: Vec<f64> = rows
        .iter()
        .map(|r| squared_distance(r, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_dist.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for (idx, d) in min_dist.iter().enumerate() {
                cumulative += d;
                if *d > 0.0 && cumulative > target {
                    chosen = Some(idx);
                    break;
                }
            }
            // Rounding can leave `target` just past the final sum.
            chosen.unwrap_or_else(|| min_dist.iter().rposition(|d| *d > 0.0).unwrap_or(0))
        } else {
            rng.random_range(0..n)
        };

        let centroid = rows[pick].clone();
        for (idx, row) in rows.iter().enumerate() {
            min_dist[idx] = min_dist[idx].min(squared_distance(row, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Mean of each cluster's members. A cluster with no members keeps its
/// previous centroid.
fn recompute_centroids(rows: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dims]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &label) in rows.iter().zip(labels) {
        counts[label] += 1;
        for (acc, v) in sums[label].iter_mut().zip(row) {
            *acc += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

fn lloyd(rows: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iterations: usize) -> Run {
    let k = centroids.len();
    let mut labels = vec![usize::MAX; rows.len()];
    let mut iterations = 0;
    let mut converged = false;

    loop {
        iterations += 1;
        let mut changed = false;
        for (row, label) in rows.iter().zip(labels.iter_mut()) {
            let closest = nearest(row, &centroids);
            if closest != *label {
                *label = closest;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
        // Stop on the centroids the labels were assigned against.
        if iterations >= max_iterations {
            break;
        }
        centroids = recompute_centroids(rows, &labels, &centroids);
    }

    let mut counts = vec![0usize; k];
    for &label in &labels {
        counts[label] += 1;
    }
    let inertia = rows
        .iter()
        .zip(&labels)
        .map(|(row, &label)| squared_distance(row, &centroids[label]))
        .sum();

    Run {
        labels,
        centroids,
        inertia,
        iterations,
        converged,
        has_empty: counts.contains(&0),
    }
}

/// Index of the lowest-inertia run, preferring runs with no empty cluster.
/// Earlier runs win ties.
fn best_run_index(runs: &[Run]) -> usize {
    let pool_has_full = runs.iter().any(|r| !r.has_empty);
    let mut best: Option<usize> = None;
    for (idx, run) in runs.iter().enumerate() {
        if pool_has_full && run.has_empty {
            continue;
        }
        if best.map_or(true, |b| run.inertia < runs[b].inertia) {
            best = Some(idx);
        }
    }
    best.unwrap_or(0)
}

/// Run seeded k-means over the scaled rows.
///
/// All `n_init` seedings draw from one `StdRng` seeded with `config.seed`,
/// so a fixed seed and input give identical labels. `k` is clamped to the
/// number of rows. Returns a convergence warning when every run left a
/// cluster empty, or when the selected run hit `max_iterations`.
pub fn cluster(
    rows: &[Vec<f64>],
    config: &ClusteringConfig,
) -> (ClusterAssignment, PartitionDiagnostics, Option<ClusterConvergenceWarning>) {
    let n = rows.len();
    let k = config.k.min(n);
    let n_init = config.n_init.max(1);

    if k == 0 {
        let assignment = ClusterAssignment {
            algorithm: Algorithm::Partition,
            k: 0,
            labels: Vec::new(),
        };
        let diagnostics = PartitionDiagnostics {
            iterations: 0,
            inertia: 0.0,
            converged: true,
            runs: 0,
            empty_runs: 0,
            centroids: Vec::new(),
        };
        return (assignment, diagnostics, None);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut runs = Vec::with_capacity(n_init);
    for attempt in 0..n_init {
        let seeds = seed_centroids(rows, k, &mut rng);
        let run = lloyd(rows, seeds, config.max_iterations.max(1));
        debug!(
            "k-means run {}: inertia {:.4} after {} iterations (converged={}, empty={})",
            attempt + 1,
            run.inertia,
            run.iterations,
            run.converged,
            run.has_empty
        );
        runs.push(run);
    }
    let empty_runs = runs.iter().filter(|r| r.has_empty).count();

    let best = runs.swap_remove(best_run_index(&runs));

    let warning = if empty_runs == n_init {
        warn!("k-means: all {} initializations left an empty cluster", n_init);
        Some(ClusterConvergenceWarning::EmptyCluster { runs: n_init })
    } else if !best.converged {
        warn!(
            "k-means: selected run stopped at the cap of {} iterations",
            best.iterations
        );
        Some(ClusterConvergenceWarning::IterationCap {
            iterations: best.iterations,
        })
    } else {
        None
    };

    info!(
        "partition: {} players into {} clusters, inertia {:.4} ({} runs, {} with empty clusters)",
        n, k, best.inertia, n_init, empty_runs
    );

    let assignment = ClusterAssignment {
        algorithm: Algorithm::Partition,
        k,
        labels: best.labels.iter().map(|l| l + 1).collect(),
    };
    let diagnostics = PartitionDiagnostics {
        iterations: best.iterations,
        inertia: best.inertia,
        converged: best.converged,
        runs: n_init,
        empty_runs,
        centroids: best.centroids,
    };
    (assignment, diagnostics, warning)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
