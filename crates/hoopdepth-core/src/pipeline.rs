// One statistic family end to end: normalize, scale, cluster twice, score,
// aggregate per team, compare with the reference ranking.
//
// Each stage takes the previous stage's output by reference and returns a
// new value; nothing is mutated after it is produced.

use std::path::Path;
use tracing::info;

use crate::analysis::compare::compare;
use crate::analysis::depth::{aggregate, join_rosters, RosterIndex, RosterJoin};
use crate::analysis::scaler::{scale, ScaledMatrix};
use crate::analysis::scoring::score;
use crate::analysis::{hierarchical, partition, ClusterAssignment};
use crate::config::{Config, FamilyConfig};
use crate::error::{PipelineError, PipelineWarning};
use crate::ingest::normalize::{normalize, NormalizeInputs, PlayerRecord};
use crate::ingest::tables::{
    load_participation_table, load_reference_ranking, load_roster_table, load_rookie_table,
    load_season_table, load_supplementary_table, LoadError, ReferenceRanking, RookieStandIn,
    RosterEntry, SeasonRow, SupplementaryRow,
};
use crate::report::{ClusterDiagnostics, ClusteringReport, FamilyReport, FeatureSummary, PlayerRow};

/// Every table one family run reads.
#[derive(Debug, Clone, Default)]
pub struct FamilyInputs {
    pub season: Vec<SeasonRow>,
    pub participation: Option<Vec<SeasonRow>>,
    pub supplementary: Vec<SupplementaryRow>,
    pub rookies: Vec<RookieStandIn>,
    pub rosters: Vec<RosterEntry>,
    pub reference: ReferenceRanking,
}

/// Load a family's tables. Relative paths resolve against `base_dir`.
pub fn load_family_inputs(
    base_dir: &Path,
    config: &Config,
    family: &FamilyConfig,
) -> Result<FamilyInputs, LoadError> {
    let season = load_season_table(&base_dir.join(&family.source), &family.features)?;
    let participation = family
        .participation
        .as_deref()
        .map(|p| load_participation_table(&base_dir.join(p)))
        .transpose()?;
    let supplementary = match &family.supplementary {
        Some(p) => load_supplementary_table(&base_dir.join(p), &family.features)?,
        None => Vec::new(),
    };
    let rookies = match &config.data.rookies {
        Some(p) => load_rookie_table(&base_dir.join(p))?,
        None => Vec::new(),
    };
    let rosters = load_roster_table(&base_dir.join(&config.data.rosters))?;
    let reference = load_reference_ranking(&base_dir.join(&config.data.reference))?;

    info!(
        "family `{}`: loaded {} season rows, {} supplementary, {} rookies, {} roster entries, {} ranked teams",
        family.name,
        season.len(),
        supplementary.len(),
        rookies.len(),
        rosters.len(),
        reference.len()
    );

    Ok(FamilyInputs {
        season,
        participation,
        supplementary,
        rookies,
        rosters,
        reference,
    })
}

/// Load and run one family.
pub fn run(base_dir: &Path, config: &Config, family: &FamilyConfig) -> Result<FamilyReport, PipelineError> {
    let inputs = load_family_inputs(base_dir, config, family)?;
    run_family(&inputs, config, family)
}

/// Stage outputs shared by both clustering algorithms.
struct Shared<'a> {
    players: &'a [PlayerRecord],
    matrix: &'a ScaledMatrix,
    join: &'a RosterJoin,
    index: &'a RosterIndex,
    config: &'a Config,
    family: &'a FamilyConfig,
}

impl Shared<'_> {
    /// Score, aggregate and package one algorithm's assignment.
    fn finish(
        &self,
        assignment: ClusterAssignment,
        diagnostics: ClusterDiagnostics,
        warnings: &mut Vec<PipelineWarning>,
    ) -> Result<(ClusteringReport, Vec<i64>), PipelineError> {
        let scores = score(&assignment, self.players, self.matrix, self.family, &self.config.scoring);
        let player_scores = scores.player_scores(&assignment);
        let (depth, shortfalls) = aggregate(
            self.players,
            &player_scores,
            self.join,
            self.index,
            assignment.algorithm,
            &self.config.aggregation,
        )?;
        warnings.extend(shortfalls);

        let report = ClusteringReport {
            algorithm: assignment.algorithm,
            k: assignment.k,
            sizes: assignment.sizes(),
            scores,
            diagnostics,
            depth,
        };
        Ok((report, player_scores))
    }
}

/// Run every stage over already-loaded tables.
pub fn run_family(
    inputs: &FamilyInputs,
    config: &Config,
    family: &FamilyConfig,
) -> Result<FamilyReport, PipelineError> {
    info!("family `{}`: starting", family.name);

    let population = normalize(
        &NormalizeInputs {
            season: &inputs.season,
            participation: inputs.participation.as_deref(),
            supplementary: &inputs.supplementary,
            rookies: &inputs.rookies,
        },
        &config.filter,
    )?;
    let players = &population.players;

    let matrix = scale(players, &family.features, config.scaling.on_degenerate_feature)?;
    let mut warnings: Vec<PipelineWarning> = matrix
        .excluded
        .iter()
        .map(|e| PipelineWarning::DegenerateFeatureExcluded {
            feature: e.feature.clone(),
            reason: e.reason.clone(),
        })
        .collect();

    let k = config.clustering.k;
    let (hier_assignment, dendrogram) = hierarchical::cluster(&matrix.rows, k);
    let hier_diagnostics = ClusterDiagnostics::Hierarchical {
        cut_height: dendrogram.cut_height(k),
        dendrogram,
    };
    let (part_assignment, part_diagnostics, convergence) = partition::cluster(&matrix.rows, &config.clustering);
    if let Some(detail) = convergence {
        warnings.push(PipelineWarning::ClusterConvergence {
            algorithm: part_assignment.algorithm.label().to_string(),
            detail,
        });
    }

    let index = RosterIndex::new(&inputs.rosters);
    let join = join_rosters(players, &index);
    warnings.extend(join.warnings());

    let hier_labels = hier_assignment.labels.clone();
    let part_labels = part_assignment.labels.clone();
    let shared = Shared {
        players,
        matrix: &matrix,
        join: &join,
        index: &index,
        config,
        family,
    };
    let (hierarchical, hier_scores) = shared.finish(hier_assignment, hier_diagnostics, &mut warnings)?;
    let (partition, part_scores) = shared.finish(
        part_assignment,
        ClusterDiagnostics::Partition(part_diagnostics),
        &mut warnings,
    )?;

    let (comparison, missing) = compare(&hierarchical.depth, &partition.depth, &inputs.reference);
    warnings.extend(missing);

    let player_rows = players
        .iter()
        .enumerate()
        .map(|(i, p)| PlayerRow {
            id: p.id,
            name: p.name.clone(),
            origin: p.origin.clone(),
            team: join.teams[i].clone(),
            hierarchical_label: hier_labels[i],
            hierarchical_score: hier_scores[i],
            partition_label: part_labels[i],
            partition_score: part_scores[i],
        })
        .collect();

    info!(
        "family `{}`: done, {} teams compared, {} warnings",
        family.name,
        comparison.teams.len(),
        warnings.len()
    );

    Ok(FamilyReport {
        family: family.name.clone(),
        seed: config.clustering.seed,
        roster_size: config.aggregation.roster_size,
        summary: population.summary.clone(),
        features: matrix
            .features
            .iter()
            .zip(&matrix.stats)
            .map(|(name, stats)| FeatureSummary {
                name: name.clone(),
                mean: stats.mean,
                stdev: stats.stdev,
            })
            .collect(),
        excluded_features: matrix.excluded.clone(),
        players: player_rows,
        hierarchical,
        partition,
        comparison,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
