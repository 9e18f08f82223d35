// Feature standardization: population z-scores per feature column.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::DegeneratePolicy;
use crate::error::{DegenerateFeatureError, PipelineError};
use crate::ingest::normalize::PlayerRecord;

/// Mean and standard deviation for a single feature across the population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Threshold below which standard deviation is treated as zero.
pub const STDEV_EPSILON: f64 = 1e-9;

/// Compute mean and population standard deviation (N denominator) for a
/// slice of values. The population is every surviving player, not a sample.
///
/// Returns `PoolStats { mean: 0.0, stdev: 0.0 }` for an empty slice.
pub fn compute_pool_stats(values: &[f64]) -> PoolStats {
    if values.is_empty() {
        return PoolStats { mean: 0.0, stdev: 0.0 };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    PoolStats {
        mean,
        stdev: variance.sqrt(),
    }
}

/// z-score of `value`. Callers must have rejected degenerate features.
pub fn compute_zscore(value: f64, stats: &PoolStats) -> f64 {
    (value - stats.mean) / stats.stdev
}

/// The frozen feature matrix clustering runs on.
///
/// `rows[i]` belongs to `players[i]`; `rows[i][j]` is the z-score of
/// `features[j]`. Excluded features do not appear in `features`.
#[derive(Debug, Clone)]
pub struct ScaledMatrix {
    pub features: Vec<String>,
    /// Index of each kept feature in the family's configured feature list.
    pub source_columns: Vec<usize>,
    pub stats: Vec<PoolStats>,
    pub rows: Vec<Vec<f64>>,
    pub excluded: Vec<DegenerateFeatureError>,
}

impl ScaledMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.features.len()
    }
}

/// Standardize the configured features across `players`.
///
/// A feature whose standard deviation is below `STDEV_EPSILON` is degenerate:
/// under `DegeneratePolicy::Abort` the run fails with that feature named,
/// under `Exclude` it is dropped and recorded in `excluded`.
pub fn scale(
    players: &[PlayerRecord],
    features: &[String],
    policy: DegeneratePolicy,
) -> Result<ScaledMatrix, PipelineError> {
    let mut kept_columns = Vec::new();
    let mut kept_names = Vec::new();
    let mut kept_stats = Vec::new();
    let mut excluded = Vec::new();

    for (col, feature) in features.iter().enumerate() {
        let values: Vec<f64> = players.iter().map(|p| p.stats[col]).collect();
        let stats = compute_pool_stats(&values);
        if stats.stdev < STDEV_EPSILON {
            let err = DegenerateFeatureError {
                feature: feature.clone(),
                reason: format!(
                    "zero variance across {} players (every value is {})",
                    players.len(),
                    stats.mean
                ),
            };
            match policy {
                DegeneratePolicy::Abort => return Err(err.into()),
                DegeneratePolicy::Exclude => {
                    warn!("excluding {}", err);
                    excluded.push(err);
                    continue;
                }
            }
        }
        kept_columns.push(col);
        kept_names.push(feature.clone());
        kept_stats.push(stats);
    }

    if kept_columns.is_empty() {
        return Err(PipelineError::NoUsableFeatures);
    }

    let rows: Vec<Vec<f64>> = players
        .iter()
        .map(|p| {
            kept_columns
                .iter()
                .zip(&kept_stats)
                .map(|(&col, stats)| compute_zscore(p.stats[col], stats))
                .collect()
        })
        .collect();

    info!(
        "scaled {} players over {} features ({} excluded)",
        rows.len(),
        kept_names.len(),
        excluded.len()
    );

    Ok(ScaledMatrix {
        features: kept_names,
        source_columns: kept_columns,
        stats: kept_stats,
        rows,
        excluded,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
