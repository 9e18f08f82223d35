// Configuration loading and validation (config/hoopdepth.toml).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Name of the single configuration file, in both `defaults/` and `config/`.
pub const CONFIG_FILE: &str = "hoopdepth.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub filter: FilterConfig,
    pub scaling: ScalingConfig,
    pub clustering: ClusteringConfig,
    pub scoring: ScoringConfig,
    pub aggregation: AggregationConfig,
    pub report: ReportConfig,
    pub data: DataPaths,
    pub families: Vec<FamilyConfig>,
}

/// Minimum-participation thresholds for season rows.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    pub min_games_started: u32,
    pub min_games_played: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    Abort,
    Exclude,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    pub on_degenerate_feature: DegeneratePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringConfig {
    pub k: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub n_init: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    Derived,
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    /// Scores handed out best cluster first. Length must equal `clustering.k`.
    pub ladder: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterPolicy {
    Fatal,
    Warn,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    pub roster_size: usize,
    pub insufficient_roster: RosterPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// How many teams to show at each end of the ranking.
    pub highlight: usize,
    pub output_dir: String,
}

/// Tables shared by every statistic family.
#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub rosters: String,
    pub reference: String,
    #[serde(default)]
    pub rookies: Option<String>,
}

/// One statistic family (e.g. per-game counting stats or advanced stats).
#[derive(Debug, Clone, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub source: String,
    /// Table supplying G/GS when the source export has no games-started column.
    #[serde(default)]
    pub participation: Option<String>,
    #[serde(default)]
    pub supplementary: Option<String>,
    pub features: Vec<String>,
    /// A feature name, or `composite` for the mean of all scaled features.
    pub rank_by: String,
    #[serde(default)]
    pub fixed_scores: Option<FixedScores>,
}

fn default_enabled() -> bool {
    true
}

/// Label-indexed score tables for `scoring.mode = "fixed"`.
#[derive(Debug, Clone, Deserialize)]
pub struct FixedScores {
    pub hierarchical: Vec<i64>,
    pub partition: Vec<i64>,
}

/// How clusters are ordered when scores are derived from centroids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankBy {
    Feature(String),
    Composite,
}

impl FamilyConfig {
    pub fn rank_key(&self) -> RankBy {
        if self.rank_by.eq_ignore_ascii_case("composite") {
            RankBy::Composite
        } else {
            RankBy::Feature(self.rank_by.clone())
        }
    }
}

impl Config {
    /// Families with `enabled = true`, in file order.
    pub fn enabled_families(&self) -> impl Iterator<Item = &FamilyConfig> {
        self.families.iter().filter(|f| f.enabled)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/hoopdepth.toml` relative to `base_dir`.
///
/// Does not install defaults; `load_config` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Parse configuration text without validating it.
pub fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Install `defaults/hoopdepth.toml` as `config/hoopdepth.toml` when no
/// config exists yet. Returns the installed path, or `None` when an existing
/// config was left alone.
pub fn install_default_config(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.is_file() {
        return Ok(None);
    }
    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no config/{CONFIG_FILE} or defaults/{CONFIG_FILE} under {}",
                base_dir.display()
            ),
        });
    }

    let copy_err = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("{} -> {}: {e}", source.display(), target.display()),
    };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(copy_err)?;
    }
    std::fs::copy(&source, &target).map_err(copy_err)?;
    info!("installed default config at {}", target.display());
    Ok(Some(target))
}

/// Load config under `base_dir`, installing the shipped defaults on first run.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    install_default_config(base_dir)?;
    load_config_from(base_dir)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let k = config.clustering.k;
    let positive: &[(&str, usize)] = &[
        ("clustering.k", k),
        ("clustering.max_iterations", config.clustering.max_iterations),
        ("clustering.n_init", config.clustering.n_init),
        ("aggregation.roster_size", config.aggregation.roster_size),
        ("report.highlight", config.report.highlight),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(invalid(*name, "must be > 0"));
        }
    }

    if config.scoring.mode == ScoringMode::Derived && config.scoring.ladder.len() != k {
        return Err(invalid(
            "scoring.ladder",
            format!(
                "must hold exactly clustering.k = {k} scores, got {}",
                config.scoring.ladder.len()
            ),
        ));
    }

    if config.enabled_families().next().is_none() {
        return Err(invalid("families", "at least one family must be enabled"));
    }

    let mut names = HashSet::new();
    for (idx, family) in config.families.iter().enumerate() {
        let prefix = format!("families[{idx}]");
        if family.name.trim().is_empty() {
            return Err(invalid(format!("{prefix}.name"), "must not be empty"));
        }
        if !names.insert(family.name.as_str()) {
            return Err(invalid(
                format!("{prefix}.name"),
                format!("duplicate family name `{}`", family.name),
            ));
        }
        if family.features.is_empty() {
            return Err(invalid(format!("{prefix}.features"), "must list at least one column"));
        }
        let mut seen = HashSet::new();
        for feature in &family.features {
            if !seen.insert(feature.as_str()) {
                return Err(invalid(
                    format!("{prefix}.features"),
                    format!("duplicate feature `{feature}`"),
                ));
            }
        }
        if let RankBy::Feature(name) = family.rank_key() {
            if !family.features.contains(&name) {
                return Err(invalid(
                    format!("{prefix}.rank_by"),
                    format!("`{name}` is neither `composite` nor one of the family's features"),
                ));
            }
        }
        if config.scoring.mode == ScoringMode::Fixed {
            let Some(fixed) = &family.fixed_scores else {
                return Err(invalid(
                    format!("{prefix}.fixed_scores"),
                    "required when scoring.mode = \"fixed\"",
                ));
            };
            for (table, scores) in [("hierarchical", &fixed.hierarchical), ("partition", &fixed.partition)] {
                if scores.len() != k {
                    return Err(invalid(
                        format!("{prefix}.fixed_scores.{table}"),
                        format!("must hold exactly clustering.k = {k} scores, got {}", scores.len()),
                    ));
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Workspace root, where `defaults/` lives.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    fn defaults_text() -> String {
        fs::read_to_string(project_root().join("defaults").join(CONFIG_FILE)).unwrap()
    }

    /// Write `text` as config/hoopdepth.toml under a fresh temp dir.
    fn temp_config(name: &str, text: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config").join(CONFIG_FILE), text).unwrap();
        tmp
    }

    fn expect_field(err: ConfigError, expected: &str) {
        match err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_defaults() {
        let tmp = temp_config("hoopdepth_config_defaults", &defaults_text());
        let config = load_config_from(&tmp).expect("defaults should validate");

        assert_eq!(config.filter.min_games_started, 5);
        assert_eq!(config.filter.min_games_played, 15);
        assert_eq!(config.scaling.on_degenerate_feature, DegeneratePolicy::Abort);
        assert_eq!(config.clustering.k, 5);
        assert_eq!(config.clustering.seed, 42);
        assert_eq!(config.scoring.mode, ScoringMode::Derived);
        assert_eq!(config.scoring.ladder, vec![15, 10, 5, 3, 1]);
        assert_eq!(config.aggregation.roster_size, 9);
        assert_eq!(config.aggregation.insufficient_roster, RosterPolicy::Warn);
        assert_eq!(config.data.rookies.as_deref(), Some("data/rookies.csv"));

        let names: Vec<&str> = config.families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["basic", "advanced"]);
        assert_eq!(config.families[0].features, vec!["PTS", "TRB", "AST", "STL", "BLK", "eFG%"]);
        assert_eq!(config.families[0].rank_key(), RankBy::Feature("PTS".into()));
        assert_eq!(config.families[1].participation.as_deref(), Some("data/per_game.csv"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn composite_rank_key_is_case_insensitive() {
        let text = defaults_text().replace("rank_by = \"PTS\"", "rank_by = \"Composite\"");
        let config = parse_config(&text).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.families[0].rank_key(), RankBy::Composite);
    }

    #[test]
    fn rejects_zero_k() {
        let text = defaults_text().replace("k = 5", "k = 0");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "clustering.k");
    }

    #[test]
    fn rejects_ladder_length_mismatch() {
        let text = defaults_text().replace("ladder = [15, 10, 5, 3, 1]", "ladder = [15, 10, 5]");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "scoring.ladder");
    }

    #[test]
    fn rejects_unknown_rank_by() {
        let text = defaults_text().replace("rank_by = \"VORP\"", "rank_by = \"BPM\"");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "families[1].rank_by");
    }

    #[test]
    fn fixed_mode_checks_table_lengths() {
        let text = defaults_text()
            .replace("mode = \"derived\"", "mode = \"fixed\"")
            .replace("partition = [3, 10, 1, 15, 5]", "partition = [3, 10]");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "families[0].fixed_scores.partition");
    }

    #[test]
    fn fixed_mode_accepts_defaults() {
        let text = defaults_text().replace("mode = \"derived\"", "mode = \"fixed\"");
        let config = parse_config(&text).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.scoring.mode, ScoringMode::Fixed);
    }

    #[test]
    fn rejects_duplicate_feature() {
        let text = defaults_text().replace("features = [\"WS\", \"VORP\"]", "features = [\"WS\", \"WS\", \"VORP\"]");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "families[1].features");
    }

    #[test]
    fn rejects_all_families_disabled() {
        let text = defaults_text().replace("name = \"basic\"", "name = \"basic\"\nenabled = false")
            .replace("name = \"advanced\"", "name = \"advanced\"\nenabled = false");
        let err = validate(&parse_config(&text).unwrap()).unwrap_err();
        expect_field(err, "families");
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let tmp = temp_config(
            "hoopdepth_config_bad_policy",
            &defaults_text().replace("insufficient_roster = \"warn\"", "insufficient_roster = \"ignore\""),
        );
        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }), "got: {err}");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_config() {
        let tmp = std::env::temp_dir().join("hoopdepth_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected FileNotFound, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn default_config_installed_once() {
        let tmp = std::env::temp_dir().join("hoopdepth_config_install");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), defaults_text()).unwrap();

        let installed = install_default_config(&tmp).unwrap();
        assert_eq!(installed, Some(tmp.join("config").join(CONFIG_FILE)));
        let config = load_config(&tmp).unwrap();
        assert_eq!(config.clustering.k, 5);

        // An edited config is never overwritten.
        fs::write(tmp.join("config").join(CONFIG_FILE), "# custom\n").unwrap();
        assert_eq!(install_default_config(&tmp).unwrap(), None);
        let content = fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn install_fails_without_defaults_or_config() {
        let tmp = std::env::temp_dir().join("hoopdepth_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        match install_default_config(&tmp).unwrap_err() {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("defaults/hoopdepth.toml"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }
}
