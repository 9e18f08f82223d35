// Clustering-to-ranking engine: scaling, clustering, scoring, team depth,
// and comparison against the reference ranking.

pub mod compare;
pub mod depth;
pub mod hierarchical;
pub mod partition;
pub mod scaler;
pub mod scoring;

use serde::Serialize;

/// The two clustering procedures every family is run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Hierarchical,
    Partition,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::Hierarchical, Algorithm::Partition];

    pub fn label(&self) -> &'static str {
        match self {
            Algorithm::Hierarchical => "hierarchical",
            Algorithm::Partition => "partition",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Flat cluster labels for one algorithm.
///
/// `labels[i]` is in `1..=k` and belongs to the i-th player of the scaled
/// matrix. Label numbers carry no meaning about player quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub algorithm: Algorithm,
    pub k: usize,
    pub labels: Vec<usize>,
}

impl ClusterAssignment {
    /// Number of players per label; index 0 is label 1.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label - 1] += 1;
        }
        sizes
    }

    /// Player indices carrying `label`, in input order.
    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect()
    }
}
