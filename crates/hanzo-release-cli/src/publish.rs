//! Implementation of the `hanzo-release publish` command.

use anyhow::{Context, Result};
use hanzo_release::{
    find_leftover_backups, require_credential, Orchestrator, PublishConfig, PublishReport,
    MANIFEST_FILE,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Options for the publish command.
#[derive(Debug)]
pub struct PublishArgs {
    /// Path to the run configuration.
    pub config: PathBuf,
    /// Resume the order at this package.
    pub from: Option<String>,
    /// Pass `--dry-run` to the publish command.
    pub dry_run: bool,
    /// Print the report as JSON.
    pub json: bool,
}

/// Run the whole publish order. Exits with failure if any package failed.
pub fn run(args: &PublishArgs) -> Result<ExitCode> {
    let config = load_config(&args.config)?;

    let mut order = config.order()?;
    if let Some(from) = &args.from {
        order = order
            .starting_at(from)
            .with_context(|| format!("{from} is not in the publish order"))?;
    }

    let credential = require_credential(&config.credential_env)?;
    let (table, defaults) = config.tables()?;
    let mut registry = config.registry();
    let publisher = config.publisher(args.dry_run);
    let base_dir = config.base_dir();

    let leftovers = find_leftover_backups(&base_dir, MANIFEST_FILE)?;
    if !leftovers.is_empty() {
        tracing::warn!(
            "{} leftover backups under {}; those packages will fail until `hanzo-release restore` runs",
            leftovers.len(),
            base_dir.display()
        );
    }

    tracing::info!(
        "publishing {} packages from {} with `{}`",
        order.len(),
        base_dir.display(),
        publisher.command_line()
    );
    let orchestrator = Orchestrator::new(base_dir, table, defaults, publisher)
        .with_options(config.options(args.dry_run));
    let report = orchestrator.run(&order, &mut registry, &credential);

    print_report(&report, args.json)?;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Load the run configuration, naming the file in errors.
pub fn load_config(path: &std::path::Path) -> Result<PublishConfig> {
    PublishConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn print_report(report: &PublishReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
