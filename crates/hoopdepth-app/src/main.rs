// hoopdepth entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout carries only the reports)
// 2. Load config, installing defaults on first run
// 3. For each enabled family: load tables, run the pipeline
// 4. Print the text report, write the JSON report

use hoopdepth_core::config;
use hoopdepth_core::pipeline;
use hoopdepth_core::report;

use anyhow::Context;
use std::path::Path;
use tracing::info;

fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("hoopdepth starting up");

    // 2. Load config
    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let config = config::load_config(&base_dir).context("failed to load configuration")?;
    info!(
        "Config loaded: k={}, seed={}, top {} per team, {} enabled families",
        config.clustering.k,
        config.clustering.seed,
        config.aggregation.roster_size,
        config.enabled_families().count()
    );

    // 3. Run each family
    let output_dir = base_dir.join(&config.report.output_dir);
    for family in config.enabled_families() {
        let family_report = pipeline::run(&base_dir, &config, family)
            .with_context(|| format!("pipeline failed for family `{}`", family.name))?;

        // 4. Emit reports
        print!("{}", report::render_text(&family_report, config.report.highlight));
        println!();
        let path = report::write_json(&family_report, &output_dir)
            .with_context(|| format!("failed to write report for family `{}`", family.name))?;
        info!(
            "family `{}` finished with {} warnings; JSON at {}",
            family.name,
            family_report.warnings.len(),
            display_relative(&path, &base_dir)
        );
    }

    info!("hoopdepth done");
    Ok(())
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hoopdepth=info,hoopdepth_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
