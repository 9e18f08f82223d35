// Per-family report: serializable result of a pipeline run, rendered as
// text for stdout and written as pretty JSON.
//
// Every container here is ordered (Vec or BTreeMap) so identical inputs and
// seed give byte-identical JSON.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::analysis::compare::{RankComparison, TeamComparison};
use crate::analysis::depth::DepthTable;
use crate::analysis::hierarchical::Dendrogram;
use crate::analysis::partition::PartitionDiagnostics;
use crate::analysis::scoring::ValueScores;
use crate::analysis::Algorithm;
use crate::error::{DegenerateFeatureError, PipelineWarning};
use crate::ingest::normalize::{NormalizationSummary, RecordOrigin};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Population statistics of one scaled feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub mean: f64,
    pub stdev: f64,
}

/// One normalized player with both cluster assignments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRow {
    pub id: u32,
    pub name: String,
    pub origin: RecordOrigin,
    /// Upcoming-season team; `None` when unrostered.
    pub team: Option<String>,
    pub hierarchical_label: usize,
    pub hierarchical_score: i64,
    pub partition_label: usize,
    pub partition_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterDiagnostics {
    Hierarchical {
        /// Largest merge distance inside the flat clusters.
        cut_height: Option<f64>,
        dendrogram: Dendrogram,
    },
    Partition(PartitionDiagnostics),
}

/// Everything one clustering algorithm produced for the family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringReport {
    pub algorithm: Algorithm,
    pub k: usize,
    pub sizes: Vec<usize>,
    pub scores: ValueScores,
    pub diagnostics: ClusterDiagnostics,
    pub depth: DepthTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyReport {
    pub family: String,
    pub seed: u64,
    pub roster_size: usize,
    pub summary: NormalizationSummary,
    pub features: Vec<FeatureSummary>,
    pub excluded_features: Vec<DegenerateFeatureError>,
    pub players: Vec<PlayerRow>,
    pub hierarchical: ClusteringReport,
    pub partition: ClusteringReport,
    pub comparison: RankComparison,
    pub warnings: Vec<PipelineWarning>,
}

impl FamilyReport {
    pub fn clusterings(&self) -> [&ClusteringReport; 2] {
        [&self.hierarchical, &self.partition]
    }
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

fn fmt_opt_f64(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn fmt_opt_i64(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:+}"))
}

fn comparison_line(row: &TeamComparison) -> String {
    format!(
        "  {:<5} {:>5} {:>4} {:>5} {:>4} {:>6.1} {:>4} {:>4} {:>5} {:>5} {:>5}\n",
        row.team,
        row.hierarchical.depth,
        row.hierarchical.rank,
        row.partition.depth,
        row.partition.rank,
        row.combined.mean_rank,
        row.combined.rank,
        row.reference_rank.map_or_else(|| "-".to_string(), |r| r.to_string()),
        fmt_opt_i64(row.hierarchical.diff),
        fmt_opt_i64(row.partition.diff),
        fmt_opt_i64(row.combined.diff),
    )
}

const COMPARISON_HEADER: &str =
    "  Team   H-dp  H-rk  P-dp  P-rk  Mean  Rank  Ref  H-df  P-df  C-df\n";

/// Human-readable report: fit metrics, best and worst `highlight` teams by
/// combined rank, the full comparison, cluster profiles and warnings.
pub fn render_text(report: &FamilyReport, highlight: usize) -> String {
    let mut out = String::with_capacity(8192);
    let metrics = &report.comparison.metrics;
    let summary = &report.summary;

    // Section 1: header
    out.push_str(&format!(
        "# TEAM DEPTH: {}\n\
         Players: {} ({} raw rows, {} partial dropped, {} filtered out, {} supplementary, {} rookies)\n\
         Features: {}\n\
         Seed: {} | Top {} players per team\n\n",
        report.family,
        summary.survivors,
        summary.raw_rows,
        summary.partial_rows_dropped,
        summary.filtered_out,
        summary.supplementary_added,
        summary.rookies_added,
        report
            .features
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        report.seed,
        report.roster_size,
    ));

    // Section 2: fit against the reference
    out.push_str("## FIT AGAINST REFERENCE (mean absolute rank difference)\n");
    out.push_str(&format!(
        "  hierarchical {} | partition {} | combined {} | over {} teams\n\n",
        fmt_opt_f64(metrics.hierarchical_mad),
        fmt_opt_f64(metrics.partition_mad),
        fmt_opt_f64(metrics.combined_mad),
        metrics.compared_teams,
    ));

    // Section 3: highlights
    let teams = &report.comparison.teams;
    let shown = highlight.min(teams.len());
    out.push_str(&format!("## TOP {shown}\n"));
    out.push_str(COMPARISON_HEADER);
    for row in teams.iter().take(shown) {
        out.push_str(&comparison_line(row));
    }
    out.push('\n');
    out.push_str(&format!("## BOTTOM {shown}\n"));
    out.push_str(COMPARISON_HEADER);
    for row in teams.iter().skip(teams.len() - shown) {
        out.push_str(&comparison_line(row));
    }
    out.push('\n');

    // Section 4: full table
    out.push_str("## ALL TEAMS (by combined rank)\n");
    out.push_str(COMPARISON_HEADER);
    for row in teams {
        out.push_str(&comparison_line(row));
    }
    out.push('\n');

    // Section 5: cluster profiles
    let feature_names: Vec<&str> = report.features.iter().map(|f| f.name.as_str()).collect();
    for clustering in report.clusterings() {
        out.push_str(&format!(
            "## CLUSTERS: {} (k = {}, {:?} scores)\n",
            clustering.algorithm, clustering.k, clustering.scores.mode
        ));
        match &clustering.diagnostics {
            ClusterDiagnostics::Hierarchical { cut_height, dendrogram } => out.push_str(&format!(
                "  {} merges, cut height {}\n",
                dendrogram.merges.len(),
                fmt_opt_f64(*cut_height),
            )),
            ClusterDiagnostics::Partition(diag) => out.push_str(&format!(
                "  inertia {:.3}, {} iterations, converged {}, {} of {} runs left a cluster empty\n",
                diag.inertia, diag.iterations, diag.converged, diag.empty_runs, diag.runs,
            )),
        }
        for profile in &clustering.scores.profiles {
            let means = feature_names
                .iter()
                .zip(&profile.scaled_means)
                .map(|(name, z)| format!("{name} {z:+.2}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!(
                "  label {} | {:>3} players | score {:>3} | {}\n",
                profile.label, profile.size, profile.score, means,
            ));
        }
        out.push('\n');
    }

    // Section 6: warnings
    if !report.warnings.is_empty() {
        out.push_str(&format!("## WARNINGS ({})\n", report.warnings.len()));
        for warning in &report.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }

    out
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn to_json(report: &FamilyReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Write `<dir>/<family>.json`, creating `dir` if needed. Returns the path.
pub fn write_json(report: &FamilyReport, dir: &Path) -> Result<PathBuf, ReportError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ReportError::Io { path, source }
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;
    let path = dir.join(format!("{}.json", report.family));
    let mut text = to_json(report)?;
    text.push('\n');
    fs::write(&path, text).map_err(io_err(&path))?;
    info!("wrote {}", path.display());
    Ok(path)
}
