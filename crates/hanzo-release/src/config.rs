//! Run configuration (`hanzo-release.toml`).
//!
//! ```toml
//! base-dir = "hanzo-libs"
//! workspace-manifest = "Cargo.toml"
//! settle-secs = 10
//!
//! [versions]
//! thiserror = "2.0"
//!
//! [published]
//! hanzo-message-primitives = "1.1.10"
//!
//! [[tier]]
//! name = "base"
//! packages = ["hanzo-pqc", "hanzo-fs"]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use crate::publish::{PublishOptions, PublishOrder, Tier, DEFAULT_DIAGNOSTIC_TAIL};
use crate::registry::{CargoPublisher, PublishedRegistry, DEFAULT_CREDENTIAL_VAR};
use crate::table::VersionTable;
use crate::workspace::{WorkspaceDefaults, WorkspaceError, WorkspaceManifest};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "hanzo-release.toml";

/// Errors that can occur when loading the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// The run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PublishConfig {
    /// Directory containing one subdirectory per package.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Workspace root manifest to read shared versions and metadata from.
    #[serde(default)]
    pub workspace_manifest: Option<PathBuf>,

    /// Environment variable holding the registry token.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,

    /// Seconds to wait after each successful publish.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Output lines kept for a failed publish.
    #[serde(default = "default_diagnostic_tail")]
    pub diagnostic_tail: usize,

    /// Publish command, run in each package root.
    #[serde(default = "default_command")]
    pub command: Vec<String>,

    /// Overrides for the workspace metadata defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Extra or replacement dependency versions.
    #[serde(default)]
    pub versions: BTreeMap<String, String>,

    /// Extra mandatory features.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<String>>,

    /// Packages already on the registry, with their versions.
    #[serde(default)]
    pub published: BTreeMap<String, String>,

    /// Publish order, first tier first.
    #[serde(default, rename = "tier")]
    pub tiers: Vec<TierConfig>,

    #[serde(skip)]
    root: PathBuf,
}

/// `[defaults]`: every field of [`WorkspaceDefaults`], all optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DefaultsConfig {
    pub version: Option<String>,
    pub edition: Option<String>,
    pub authors: Option<Vec<String>>,
    pub license: Option<String>,
    pub repository: Option<String>,
    pub homepage: Option<String>,
    pub description: Option<String>,
    pub namespace: Option<String>,
    pub platform: Option<String>,
}

/// One `[[tier]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierConfig {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("hanzo-libs")
}

fn default_credential_env() -> String {
    DEFAULT_CREDENTIAL_VAR.to_string()
}

fn default_settle_secs() -> u64 {
    10
}

fn default_diagnostic_tail() -> usize {
    DEFAULT_DIAGNOSTIC_TAIL
}

fn default_command() -> Vec<String> {
    ["cargo", "publish", "--allow-dirty"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            workspace_manifest: None,
            credential_env: default_credential_env(),
            settle_secs: default_settle_secs(),
            diagnostic_tail: default_diagnostic_tail(),
            command: default_command(),
            defaults: DefaultsConfig::default(),
            versions: BTreeMap::new(),
            features: BTreeMap::new(),
            published: BTreeMap::new(),
            tiers: Vec::new(),
            root: PathBuf::from("."),
        }
    }
}

impl PublishConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(config)
    }

    /// Parse and validate a configuration; relative paths stay relative to
    /// the current directory.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.root = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::Invalid(String::from("`command` must not be empty")));
        }
        if let Some(version) = &self.defaults.version {
            check_version("defaults.version", version)?;
        }
        for (name, version) in &self.published {
            check_version(&format!("published.{name}"), version)?;
        }
        for (name, requirement) in &self.versions {
            semver::VersionReq::parse(requirement).map_err(|e| {
                ConfigError::Invalid(format!("versions.{name} = \"{requirement}\": {e}"))
            })?;
        }

        let mut seen = BTreeSet::new();
        for tier in &self.tiers {
            for package in &tier.packages {
                if !seen.insert(package.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "{package} appears more than once in the publish order"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Directory containing one subdirectory per package.
    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(&self.base_dir)
    }

    /// Path of the workspace root manifest, if one is configured.
    #[must_use]
    pub fn workspace_manifest_path(&self) -> Option<PathBuf> {
        self.workspace_manifest
            .as_ref()
            .map(|path| self.root.join(path))
    }

    /// The version table and metadata defaults for this run.
    ///
    /// Built-in values come first, then the workspace root manifest, then
    /// this file.
    pub fn tables(&self) -> Result<(VersionTable, WorkspaceDefaults), ConfigError> {
        let mut table = VersionTable::builtin();
        let mut defaults = WorkspaceDefaults::default();

        if let Some(path) = self.workspace_manifest_path() {
            let workspace = WorkspaceManifest::from_path(&path)?;
            workspace.apply_dependencies(&mut table);
            workspace.apply_defaults(&mut defaults);
            tracing::debug!(manifest = %path.display(), "applied workspace manifest");
        }

        for (name, version) in &self.versions {
            table.set_version(name.as_str(), version.as_str());
        }
        for (name, features) in &self.features {
            table.require_features(name.as_str(), features.iter().cloned());
        }
        self.defaults.apply(&mut defaults);

        Ok((table, defaults))
    }

    /// The registry seeded with `[published]`.
    #[must_use]
    pub fn registry(&self) -> PublishedRegistry {
        PublishedRegistry::seeded(&self.published)
    }

    /// The publish order.
    pub fn order(&self) -> Result<PublishOrder, ConfigError> {
        let order = PublishOrder::new(
            self.tiers
                .iter()
                .map(|tier| Tier::new(tier.name.as_str(), tier.packages.iter().map(String::as_str)))
                .collect(),
        );
        if order.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "no packages to publish; add a [[tier]] with packages",
            )));
        }
        Ok(order)
    }

    /// The publisher running the configured command.
    #[must_use]
    pub fn publisher(&self, dry_run: bool) -> CargoPublisher {
        let publisher = CargoPublisher::from_command(self.command.iter().map(String::as_str))
            .unwrap_or_default();
        if dry_run {
            publisher.arg("--dry-run")
        } else {
            publisher
        }
    }

    /// Run options. Dry runs do not wait for the registry to settle.
    #[must_use]
    pub fn options(&self, dry_run: bool) -> PublishOptions {
        PublishOptions {
            settle: if dry_run {
                Duration::ZERO
            } else {
                Duration::from_secs(self.settle_secs)
            },
            diagnostic_tail: self.diagnostic_tail,
        }
    }
}

impl DefaultsConfig {
    fn apply(&self, defaults: &mut WorkspaceDefaults) {
        let fields = [
            (&self.version, &mut defaults.version),
            (&self.edition, &mut defaults.edition),
            (&self.license, &mut defaults.license),
            (&self.repository, &mut defaults.repository),
            (&self.homepage, &mut defaults.homepage),
            (&self.namespace, &mut defaults.namespace),
            (&self.platform, &mut defaults.platform),
        ];
        for (value, target) in fields {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }
        if let Some(authors) = &self.authors {
            defaults.authors.clone_from(authors);
        }
        if self.description.is_some() {
            defaults.description.clone_from(&self.description);
        }
    }
}

fn check_version(field: &str, version: &str) -> Result<(), ConfigError> {
    semver::Version::parse(version)
        .map(drop)
        .map_err(|e| ConfigError::Invalid(format!("{field} = \"{version}\" is not a version: {e}")))
}
