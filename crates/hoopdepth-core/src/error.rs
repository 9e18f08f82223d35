// Error taxonomy for the depth pipeline.
//
// Integrity and degeneracy errors abort a run. Roster shortfalls abort only
// under the `fatal` policy. Everything recoverable travels alongside the
// result as a `PipelineWarning`.

use serde::Serialize;
use thiserror::Error;

use crate::ingest::tables::LoadError;

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

/// Malformed or unexpectedly duplicated source data.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    #[error("{path}: required column `{column}` is missing")]
    MissingColumn { path: String, column: String },

    #[error("player `{name}` (id {id}) has {rows} team rows but no season-total row")]
    MissingSeasonTotal { id: u32, name: String, rows: usize },

    #[error("player `{name}` (id {id}) appears more than once after normalization")]
    DuplicatePlayer { id: u32, name: String },

    #[error("player `{name}` (id {id}) has no games played/started information")]
    MissingParticipation { id: u32, name: String },

    #[error("rookie `{rookie}` references unknown comparable player `{comparable}`")]
    UnknownComparable { rookie: String, comparable: String },

    #[error("rookie `{rookie}` references ambiguous comparable `{comparable}` ({matches} players share that name)")]
    AmbiguousComparable {
        rookie: String,
        comparable: String,
        matches: usize,
    },

    #[error("reference ranking: {0}")]
    InvalidReference(String),

    #[error("no players survived normalization")]
    EmptyPopulation,
}

/// A clustering feature with no spread across the population.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("feature `{feature}` is degenerate: {reason}")]
pub struct DegenerateFeatureError {
    pub feature: String,
    pub reason: String,
}

/// A team with fewer eligible players than the configured roster size.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[error("team `{team}` has {eligible} eligible players, {required} required")]
pub struct InsufficientRosterError {
    pub team: String,
    pub eligible: usize,
    pub required: usize,
}

/// Anything that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error(transparent)]
    DegenerateFeature(#[from] DegenerateFeatureError),

    #[error("every clustering feature was excluded as degenerate")]
    NoUsableFeatures,

    #[error(transparent)]
    InsufficientRoster(#[from] InsufficientRosterError),
}

// ---------------------------------------------------------------------------
// Recoverable conditions
// ---------------------------------------------------------------------------

/// Why a partition clustering result should be read with care.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterConvergenceWarning {
    /// The selected run stopped at the iteration cap with assignments still moving.
    IterationCap { iterations: usize },
    /// Every initialization ended with at least one centroid owning no points.
    EmptyCluster { runs: usize },
}

/// A condition the pipeline survived but a reader must see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    UnmatchedPlayer {
        name: String,
    },
    InsufficientRoster {
        algorithm: String,
        team: String,
        eligible: usize,
        required: usize,
    },
    ClusterConvergence {
        algorithm: String,
        detail: ClusterConvergenceWarning,
    },
    DegenerateFeatureExcluded {
        feature: String,
        reason: String,
    },
    MissingReferenceRank {
        team: String,
    },
    AmbiguousRosterName {
        name: String,
        team: String,
        ids: Vec<u32>,
    },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::UnmatchedPlayer { name } => {
                write!(f, "unmatched player: `{name}` has no upcoming-season team")
            }
            PipelineWarning::InsufficientRoster {
                algorithm,
                team,
                eligible,
                required,
            } => write!(
                f,
                "insufficient roster ({algorithm}): `{team}` has {eligible} of {required} players"
            ),
            PipelineWarning::ClusterConvergence { algorithm, detail } => match detail {
                ClusterConvergenceWarning::IterationCap { iterations } => write!(
                    f,
                    "cluster convergence ({algorithm}): hit the cap of {iterations} iterations"
                ),
                ClusterConvergenceWarning::EmptyCluster { runs } => write!(
                    f,
                    "cluster convergence ({algorithm}): all {runs} initializations left an empty cluster"
                ),
            },
            PipelineWarning::DegenerateFeatureExcluded { feature, reason } => {
                write!(f, "feature `{feature}` excluded: {reason}")
            }
            PipelineWarning::MissingReferenceRank { team } => {
                write!(f, "team `{team}` has no reference rank")
            }
            PipelineWarning::AmbiguousRosterName { name, team, ids } => write!(
                f,
                "ambiguous roster name: `{name}` ({team}) matches players {ids:?}; none counted"
            ),
        }
    }
}
