//! Ordered publishing of workspace members.
//!
//! For each package of a [`PublishOrder`] the [`Orchestrator`]:
//!
//! 1. skips it if it was published before the run started
//! 2. loads `<base_dir>/<package>/Cargo.toml`
//! 3. backs the manifest up and writes the resolved manifest in its place
//! 4. runs the publish command in the package root
//! 5. restores the original manifest
//! 6. on success, records the version and waits for the registry to settle
//!
//! A failing package never stops the run. Every package of the order ends up
//! with exactly one entry in the [`PublishReport`].

use crate::backup::{BackupError, ManifestBackup};
use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::registry::{classify, Credential, PublishStatus, PublishedRegistry, Publisher};
use crate::resolve::Resolver;
use crate::table::VersionTable;
use crate::workspace::WorkspaceDefaults;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Default pause after each successful publish.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

/// Default number of output lines kept for a failed publish.
pub const DEFAULT_DIAGNOSTIC_TAIL: usize = 30;

/// Errors that can occur while publishing.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The registry credential is not available; nothing was touched.
    #[error("environment variable {0} is not set; export a registry token before publishing")]
    ConfigMissing(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("registry rejected {package}:\n{tail}")]
    PublishRejected { package: String, tail: String },

    #[error("failed to run publish command for {package}: {source}")]
    Command {
        package: String,
        source: std::io::Error,
    },
}

/// Read the registry credential from `var`, failing if it is unset or empty.
pub fn require_credential(var: &str) -> Result<Credential, PublishError> {
    Credential::from_env(var).ok_or_else(|| PublishError::ConfigMissing(var.to_string()))
}

/// A named group of packages that only depend on earlier tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Tier name, for logs.
    pub name: String,
    /// Package directory names under the base directory.
    pub packages: Vec<String>,
}

impl Tier {
    /// Create a tier.
    pub fn new<I, S>(name: impl Into<String>, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }
}

/// The order packages are published in: dependencies before dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOrder {
    tiers: Vec<Tier>,
}

impl PublishOrder {
    /// Build an order from tiers, published first to last.
    #[must_use]
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    /// The tiers of this order.
    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// All packages, flattened in publish order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.tiers
            .iter()
            .flat_map(|tier| tier.packages.iter().map(String::as_str))
    }

    /// Total number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.iter().map(|tier| tier.packages.len()).sum()
    }

    /// Returns true if there is nothing to publish.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `package` is part of the order.
    #[must_use]
    pub fn contains(&self, package: &str) -> bool {
        self.packages().any(|p| p == package)
    }

    /// The rest of the order, beginning with `package`.
    ///
    /// Returns `None` if `package` is not in the order.
    #[must_use]
    pub fn starting_at(&self, package: &str) -> Option<Self> {
        let tier_index = self
            .tiers
            .iter()
            .position(|tier| tier.packages.iter().any(|p| p == package))?;

        let mut tiers = self.tiers[tier_index..].to_vec();
        let first = &mut tiers[0];
        let start = first.packages.iter().position(|p| p == package)?;
        first.packages.drain(..start);
        Some(Self { tiers })
    }
}

/// How a package's publish ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Uploaded during this run.
    Published,
    /// The registry already had this version.
    AlreadyPublished,
    /// Known published before the run; not touched.
    Skipped,
    /// Something went wrong; see the diagnostic.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::AlreadyPublished => write!(f, "already published"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The result for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    /// Package directory name.
    pub package: String,
    /// How the publish ended.
    pub outcome: Outcome,
    /// Version on the registry, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Error message or the tail of the publish command's output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl PublishResult {
    fn new(package: &str, outcome: Outcome, version: Option<String>) -> Self {
        Self {
            package: package.to_string(),
            outcome,
            version,
            diagnostic: None,
        }
    }

    fn failed(package: &str, diagnostic: String) -> Self {
        Self {
            package: package.to_string(),
            outcome: Outcome::Failed,
            version: None,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Outcomes of a run, in publish order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    results: Vec<PublishResult>,
}

impl PublishReport {
    /// Per-package results, in publish order.
    #[must_use]
    pub fn results(&self) -> &[PublishResult] {
        &self.results
    }

    /// The result for `package`.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&PublishResult> {
        self.results.iter().find(|r| r.package == package)
    }

    /// Number of packages with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Returns true if no package failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.count(Outcome::Failed) == 0
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the report is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            write!(f, "{:<18} {}", result.outcome.to_string(), result.package)?;
            if let Some(version) = &result.version {
                write!(f, " v{version}")?;
            }
            writeln!(f)?;
            if let Some(diagnostic) = &result.diagnostic {
                for line in diagnostic.lines() {
                    writeln!(f, "    {line}")?;
                }
            }
        }
        write!(
            f,
            "\n{} published, {} already published, {} skipped, {} failed",
            self.count(Outcome::Published),
            self.count(Outcome::AlreadyPublished),
            self.count(Outcome::Skipped),
            self.count(Outcome::Failed),
        )
    }
}

/// Tunables of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Pause after each successful publish so the registry index catches up.
    pub settle: Duration,
    /// Output lines kept when a publish fails.
    pub diagnostic_tail: usize,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            diagnostic_tail: DEFAULT_DIAGNOSTIC_TAIL,
        }
    }
}

/// Publishes packages one at a time, in order.
pub struct Orchestrator<P> {
    base_dir: PathBuf,
    table: VersionTable,
    defaults: WorkspaceDefaults,
    publisher: P,
    options: PublishOptions,
    sleep: Box<dyn Fn(Duration)>,
}

impl<P: Publisher> Orchestrator<P> {
    /// Create an orchestrator for the packages under `base_dir`.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        table: VersionTable,
        defaults: WorkspaceDefaults,
        publisher: P,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            table,
            defaults,
            publisher,
            options: PublishOptions::default(),
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the run options.
    #[must_use]
    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace how the settle delay is waited out.
    #[must_use]
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Directory containing one subdirectory per package.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Publish every package of `order`.
    ///
    /// `registry` is updated as packages are published, so later packages
    /// pin their siblings to the versions that actually reached the registry.
    pub fn run(
        &self,
        order: &PublishOrder,
        registry: &mut PublishedRegistry,
        credential: &Credential,
    ) -> PublishReport {
        let total = order.len();
        let mut report = PublishReport::default();

        for (index, package) in order.packages().enumerate() {
            info!("[{}/{total}] {package}", index + 1);
            let result = self.publish_one(package, registry, credential);

            match result.outcome {
                Outcome::Published | Outcome::AlreadyPublished => {
                    info!(package, outcome = %result.outcome, "done");
                    if index + 1 < total && !self.options.settle.is_zero() {
                        (self.sleep)(self.options.settle);
                    }
                }
                Outcome::Skipped => info!(package, "already published before this run, skipping"),
                Outcome::Failed => warn!(package, "publish failed, continuing"),
            }
            report.results.push(result);
        }

        report
    }

    fn publish_one(
        &self,
        package: &str,
        registry: &mut PublishedRegistry,
        credential: &Credential,
    ) -> PublishResult {
        if registry.is_seeded(package) {
            let version = registry.version_of(package).map(str::to_string);
            return PublishResult::new(package, Outcome::Skipped, version);
        }

        match self.try_publish(package, registry, credential) {
            Ok((status, name, version)) => {
                registry.record(name, version.as_str());
                let outcome = match status {
                    PublishStatus::AlreadyPublished => Outcome::AlreadyPublished,
                    _ => Outcome::Published,
                };
                PublishResult::new(package, outcome, Some(version))
            }
            Err(PublishError::PublishRejected { tail, .. }) => PublishResult::failed(package, tail),
            Err(e) => PublishResult::failed(package, e.to_string()),
        }
    }

    /// Returns the status with the published package name and version.
    fn try_publish(
        &self,
        package: &str,
        registry: &PublishedRegistry,
        credential: &Credential,
    ) -> Result<(PublishStatus, String, String), PublishError> {
        let package_root = self.base_dir.join(package);
        let manifest_path = package_root.join(MANIFEST_FILE);

        let manifest = Manifest::load(&manifest_path)?;
        let name = manifest.package_name().unwrap_or(package).to_string();

        let backup = ManifestBackup::create(&manifest_path)?;
        let resolved = Resolver::new(&self.table, &self.defaults, registry).resolve(&manifest, &name);
        resolved.write(&manifest_path)?;

        let output = self
            .publisher
            .publish(&package_root, credential)
            .map_err(|source| PublishError::Command {
                package: package.to_string(),
                source,
            })?;

        if let Err(e) = backup.restore() {
            error!("{e}");
        }

        let version = resolved
            .package_version()
            .unwrap_or(&self.defaults.version)
            .to_string();
        match classify(&output, self.options.diagnostic_tail) {
            PublishStatus::Rejected(tail) => Err(PublishError::PublishRejected {
                package: package.to_string(),
                tail,
            }),
            status => Ok((status, name, version)),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for Orchestrator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_dir", &self.base_dir)
            .field("publisher", &self.publisher)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
