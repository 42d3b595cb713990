//! Implementation of the `hanzo-release fix` command.
//!
//! Rewrites every manifest of the publish order into its standalone form, in
//! place and without a backup. Useful for inspecting the result with
//! `git diff` or for publishing by hand.

use crate::publish::load_config;
use anyhow::{bail, Result};
use hanzo_release::{Manifest, Resolver, MANIFEST_FILE};
use std::path::Path;

/// Result of a fix run.
#[derive(Debug, Default)]
pub struct FixSummary {
    /// Manifests that were rewritten.
    pub changed: Vec<String>,
    /// Manifests that were already standalone.
    pub unchanged: Vec<String>,
    /// Manifests that could not be read or written, with the reason.
    pub failed: Vec<(String, String)>,
}

impl FixSummary {
    /// Print a summary of the changes.
    pub fn print_summary(&self) {
        for package in &self.changed {
            println!("  fixed      {package}");
        }
        for package in &self.unchanged {
            println!("  unchanged  {package}");
        }
        for (package, reason) in &self.failed {
            println!("  failed     {package}: {reason}");
        }
        println!(
            "\n{} fixed, {} unchanged, {} failed",
            self.changed.len(),
            self.unchanged.len(),
            self.failed.len()
        );
    }
}

/// Resolve every manifest of the configured order in place.
pub fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let order = config.order()?;
    let (table, defaults) = config.tables()?;
    let registry = config.registry();
    let resolver = Resolver::new(&table, &defaults, &registry);

    let summary = fix_manifests(&config.base_dir(), order.packages(), &resolver);
    summary.print_summary();

    if !summary.failed.is_empty() {
        bail!("{} manifests could not be fixed", summary.failed.len());
    }
    Ok(())
}

fn fix_manifests<'a>(
    base_dir: &Path,
    packages: impl IntoIterator<Item = &'a str>,
    resolver: &Resolver<'_>,
) -> FixSummary {
    let mut summary = FixSummary::default();

    for package in packages {
        let path = base_dir.join(package).join(MANIFEST_FILE);
        let manifest = match Manifest::load(&path) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!("{package}: {e}");
                summary.failed.push((package.to_string(), e.to_string()));
                continue;
            }
        };

        let name = manifest.package_name().unwrap_or(package).to_string();
        let resolved = resolver.resolve(&manifest, &name);
        if resolved.to_string() == manifest.to_string() {
            summary.unchanged.push(package.to_string());
            continue;
        }

        match resolved.write(&path) {
            Ok(()) => {
                tracing::debug!(manifest = %path.display(), "rewrote manifest");
                summary.changed.push(package.to_string());
            }
            Err(e) => summary.failed.push((package.to_string(), e.to_string())),
        }
    }

    summary
}
