//! Implementation of the `hanzo-release restore` command.

use crate::publish::load_config;
use anyhow::{bail, Result};
use hanzo_release::{find_leftover_backups, restore_leftover, MANIFEST_FILE};
use std::path::Path;

/// Move every leftover `Cargo.toml.bak` under the base directory back over
/// its manifest.
pub fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let base_dir = config.base_dir();

    let backups = find_leftover_backups(&base_dir, MANIFEST_FILE)?;
    if backups.is_empty() {
        println!("No leftover backups under {}", base_dir.display());
        return Ok(());
    }

    let mut failed = 0;
    for backup in &backups {
        match restore_leftover(backup) {
            Ok(manifest) => println!("Restored {}", manifest.display()),
            Err(e) => {
                tracing::error!("{e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} backups could not be restored", backups.len());
    }
    Ok(())
}
