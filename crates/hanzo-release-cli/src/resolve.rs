//! Implementation of the `hanzo-release resolve` command.

use crate::publish::load_config;
use anyhow::{Context, Result};
use hanzo_release::{Manifest, PublishConfig, Resolver, CONFIG_FILE};
use std::path::Path;

/// Print the resolved form of the manifest at `manifest_path`.
///
/// The configuration is optional: without `--config` the default file is
/// used when present, else the built-in tables.
pub fn run(manifest_path: &Path, config: Option<&Path>, name: Option<&str>) -> Result<()> {
    let config = match config {
        Some(path) => load_config(path)?,
        None if Path::new(CONFIG_FILE).is_file() => load_config(Path::new(CONFIG_FILE))?,
        None => PublishConfig::default(),
    };
    let (table, defaults) = config.tables()?;
    let registry = config.registry();

    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let name = package_name(manifest_path, &manifest, name);

    let resolved = Resolver::new(&table, &defaults, &registry).resolve(&manifest, &name);
    print!("{resolved}");
    Ok(())
}

/// `--name`, else `package.name`, else the directory holding the manifest.
fn package_name(manifest_path: &Path, manifest: &Manifest, name: Option<&str>) -> String {
    name.or_else(|| manifest.package_name())
        .or_else(|| {
            manifest_path
                .parent()
                .and_then(Path::file_name)
                .and_then(|dir| dir.to_str())
        })
        .unwrap_or("package")
        .to_string()
}
