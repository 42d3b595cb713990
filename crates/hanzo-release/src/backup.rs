//! Scoped manifest backups.
//!
//! Publishing rewrites a package's `Cargo.toml` in place. [`ManifestBackup`]
//! copies the original aside first and moves it back afterwards, either
//! explicitly through [`ManifestBackup::restore`] or when the guard is
//! dropped, so the working tree ends up exactly as it started.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix appended to the manifest path for its backup copy.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Errors that can occur while backing up or restoring a manifest.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(
        "stale backup {} exists from an earlier run; run `hanzo-release restore` first",
        .0.display()
    )]
    Stale(PathBuf),

    #[error("failed to back up {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to restore {}: {source}", path.display())]
    Restore {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid backup search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// The backup path for a manifest: `Cargo.toml` becomes `Cargo.toml.bak`.
#[must_use]
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// A manifest copied aside for the duration of a destructive edit.
#[derive(Debug)]
pub struct ManifestBackup {
    original: PathBuf,
    backup: PathBuf,
    restored: bool,
}

impl ManifestBackup {
    /// Copy `path` to its backup location.
    ///
    /// Refuses to run when a backup already exists: that file is the only
    /// pristine copy left by an interrupted run and must not be overwritten.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, BackupError> {
        let original = path.as_ref().to_path_buf();
        let backup = backup_path_for(&original);

        if !original.is_file() {
            return Err(BackupError::NotFound(original));
        }
        if backup.exists() {
            return Err(BackupError::Stale(backup));
        }

        fs::copy(&original, &backup).map_err(|source| BackupError::Copy {
            path: original.clone(),
            source,
        })?;
        tracing::debug!(backup = %backup.display(), "manifest backed up");

        Ok(Self {
            original,
            backup,
            restored: false,
        })
    }

    /// Path of the backup copy.
    #[must_use]
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Move the backup back over the live manifest.
    pub fn restore(mut self) -> Result<(), BackupError> {
        self.restored = true;
        self.move_back()
    }

    fn move_back(&self) -> Result<(), BackupError> {
        fs::rename(&self.backup, &self.original).map_err(|source| BackupError::Restore {
            path: self.original.clone(),
            source,
        })?;
        tracing::debug!(manifest = %self.original.display(), "manifest restored");
        Ok(())
    }
}

impl Drop for ManifestBackup {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.move_back() {
            tracing::error!("{e}; the original is still at {}", self.backup.display());
        }
    }
}

/// Find backups left behind by an interrupted run: `<base_dir>/*/Cargo.toml.bak`.
pub fn find_leftover_backups(base_dir: &Path, manifest_file: &str) -> Result<Vec<PathBuf>, BackupError> {
    let pattern = format!(
        "{}/*/{manifest_file}{BACKUP_SUFFIX}",
        glob::Pattern::escape(&base_dir.to_string_lossy())
    );

    let mut backups = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) => backups.push(path),
            Err(e) => tracing::warn!("skipping unreadable path: {e}"),
        }
    }
    backups.sort();
    Ok(backups)
}

/// Move a leftover backup back over the manifest it was taken from.
pub fn restore_leftover(backup: &Path) -> Result<PathBuf, BackupError> {
    let original = backup
        .to_string_lossy()
        .strip_suffix(BACKUP_SUFFIX)
        .map(PathBuf::from)
        .ok_or_else(|| BackupError::NotFound(backup.to_path_buf()))?;
    fs::rename(backup, &original).map_err(|source| BackupError::Restore {
        path: original.clone(),
        source,
    })?;
    Ok(original)
}
