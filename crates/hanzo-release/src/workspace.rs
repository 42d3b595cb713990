//! Workspace defaults for package metadata.
//!
//! Members of the Hanzo workspace inherit most of their `[package]` fields:
//!
//! ```toml
//! [package]
//! name = "hanzo-pqc"
//! version.workspace = true
//! edition.workspace = true
//! authors.workspace = true
//! ```
//!
//! When a member is published on its own those fields must be spelled out.
//! [`WorkspaceDefaults`] holds the values to substitute. They default to the
//! values of the Hanzo workspace and can be refreshed from the
//! `[workspace.package]` table of the root manifest.

use crate::table::VersionTable;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml_edit::{Array, Value};

/// Errors that can occur when reading the workspace root manifest.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to read workspace manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse workspace manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("not a workspace: {} has no [workspace] section", .0.display())]
    NotAWorkspace(PathBuf),
}

/// Package metadata fields that can be inherited from the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Version,
    Edition,
    Authors,
    License,
    Repository,
    Homepage,
    Description,
}

impl MetadataField {
    /// All fields, in the order they are filled in.
    pub const ALL: [Self; 7] = [
        Self::Version,
        Self::Edition,
        Self::Authors,
        Self::License,
        Self::Repository,
        Self::Homepage,
        Self::Description,
    ];

    /// The key of this field in `[package]`.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Edition => "edition",
            Self::Authors => "authors",
            Self::License => "license",
            Self::Repository => "repository",
            Self::Homepage => "homepage",
            Self::Description => "description",
        }
    }
}

/// Fallback metadata substituted for inherited or missing package fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceDefaults {
    /// Version shared by all workspace members.
    pub version: String,
    /// Rust edition.
    pub edition: String,
    /// Package authors.
    pub authors: Vec<String>,
    /// SPDX license expression.
    pub license: String,
    /// Repository URL.
    pub repository: String,
    /// Homepage URL.
    pub homepage: String,
    /// Description used for packages that inherit theirs. Packages without a
    /// description get a generated one instead.
    pub description: Option<String>,
    /// Name prefix shared by workspace members, without separator.
    pub namespace: String,
    /// Platform phrase appended to generated descriptions.
    pub platform: String,
}

impl Default for WorkspaceDefaults {
    fn default() -> Self {
        Self {
            version: String::from("1.1.10"),
            edition: String::from("2021"),
            authors: vec![String::from("Hanzo AI Inc")],
            license: String::from("MIT"),
            repository: String::from("https://github.com/hanzoai/hanzo-node"),
            homepage: String::from("https://hanzo.ai"),
            description: None,
            namespace: String::from("hanzo"),
            platform: String::from("Hanzo AI platform"),
        }
    }
}

impl WorkspaceDefaults {
    /// The explicit value for `field`.
    ///
    /// The description is derived from `package_name` unless a workspace
    /// description is configured; see [`WorkspaceDefaults::describe`].
    #[must_use]
    pub fn value_for(&self, field: MetadataField, package_name: &str) -> Value {
        match field {
            MetadataField::Version => Value::from(self.version.as_str()),
            MetadataField::Edition => Value::from(self.edition.as_str()),
            MetadataField::Authors => {
                Value::Array(self.authors.iter().map(String::as_str).collect::<Array>())
            }
            MetadataField::License => Value::from(self.license.as_str()),
            MetadataField::Repository => Value::from(self.repository.as_str()),
            MetadataField::Homepage => Value::from(self.homepage.as_str()),
            MetadataField::Description => match &self.description {
                Some(description) => Value::from(description.as_str()),
                None => Value::from(self.describe(package_name)),
            },
        }
    }

    /// Generate a description from a package name.
    ///
    /// `hanzo-tools-primitives` becomes `Tools Primitives for Hanzo AI platform`.
    #[must_use]
    pub fn describe(&self, package_name: &str) -> String {
        let words: Vec<String> = self
            .strip_namespace(package_name)
            .split(is_separator)
            .filter(|word| !word.is_empty())
            .map(title_case)
            .collect();
        format!("{} for {}", words.join(" "), self.platform)
    }

    /// Remove the namespace prefix (`hanzo-` or `hanzo_`) from a name.
    #[must_use]
    pub fn strip_namespace<'a>(&self, name: &'a str) -> &'a str {
        if self.namespace.is_empty() {
            return name;
        }
        name.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix(is_separator))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(name)
    }

    /// Returns true if `name` carries the workspace namespace prefix.
    #[must_use]
    pub fn is_sibling(&self, name: &str) -> bool {
        !self.namespace.is_empty() && self.strip_namespace(name) != name
    }

    /// Overlay the values declared in `[workspace.package]`.
    pub fn apply_workspace(&mut self, package: &WorkspacePackageConfig) {
        if let Some(version) = &package.version {
            self.version.clone_from(version);
        }
        if let Some(edition) = &package.edition {
            self.edition.clone_from(edition);
        }
        if let Some(authors) = &package.authors {
            self.authors.clone_from(authors);
        }
        if let Some(license) = &package.license {
            self.license.clone_from(license);
        }
        if let Some(repository) = &package.repository {
            self.repository.clone_from(repository);
        }
        if let Some(homepage) = &package.homepage {
            self.homepage.clone_from(homepage);
        }
        if package.description.is_some() {
            self.description.clone_from(&package.description);
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '_'
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// The parts of a workspace root manifest that members can inherit from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceManifest {
    /// Workspace configuration (if this is a workspace root).
    #[serde(default)]
    pub workspace: Option<WorkspaceConfig>,
}

/// Workspace configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceConfig {
    /// Member packages specified as paths or glob patterns.
    #[serde(default)]
    pub members: Vec<String>,

    /// Shared package metadata that members can inherit.
    #[serde(default)]
    pub package: Option<WorkspacePackageConfig>,

    /// Shared dependencies that members can inherit.
    #[serde(default)]
    pub dependencies: BTreeMap<String, WorkspaceDependency>,
}

/// Shared package configuration for workspace members.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspacePackageConfig {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub edition: Option<String>,

    #[serde(default)]
    pub authors: Option<Vec<String>>,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A dependency declared in `[workspace.dependencies]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspaceDependency {
    /// Simple version string: `tokio = "1.36"`.
    Simple(String),

    /// Detailed specification; only the version and features matter here.
    Detailed {
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        features: Vec<String>,
    },
}

impl WorkspaceManifest {
    /// Load a workspace root manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Self = toml::from_str(&content).map_err(|source| WorkspaceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if manifest.workspace.is_none() {
            return Err(WorkspaceError::NotAWorkspace(path.to_path_buf()));
        }
        Ok(manifest)
    }

    /// Parse a workspace root manifest from a TOML string.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay `[workspace.package]` onto `defaults`.
    pub fn apply_defaults(&self, defaults: &mut WorkspaceDefaults) {
        if let Some(package) = self.workspace.as_ref().and_then(|ws| ws.package.as_ref()) {
            defaults.apply_workspace(package);
        }
    }

    /// Overlay `[workspace.dependencies]` onto `table`.
    ///
    /// Entries without a version (path-only siblings) contribute only their
    /// features.
    pub fn apply_dependencies(&self, table: &mut VersionTable) {
        let Some(workspace) = &self.workspace else {
            return;
        };
        for (name, dependency) in &workspace.dependencies {
            match dependency {
                WorkspaceDependency::Simple(version) => {
                    table.set_version(name.as_str(), version.as_str());
                }
                WorkspaceDependency::Detailed { version, features } => {
                    if let Some(version) = version {
                        table.set_version(name.as_str(), version.as_str());
                    }
                    if !features.is_empty() {
                        table.require_features(name.as_str(), features.iter().cloned());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn describe_strips_namespace_and_title_cases() {
        let defaults = WorkspaceDefaults::default();
        assert_eq!(
            defaults.describe("hanzo-tools-primitives"),
            "Tools Primitives for Hanzo AI platform"
        );
        assert_eq!(
            defaults.describe("hanzo_job_queue_manager"),
            "Job Queue Manager for Hanzo AI platform"
        );
        assert_eq!(defaults.describe("hanzo-pqc"), "Pqc for Hanzo AI platform");
    }

    #[test]
    fn describe_keeps_foreign_names() {
        let defaults = WorkspaceDefaults::default();
        assert_eq!(defaults.describe("vector-db"), "Vector Db for Hanzo AI platform");
        // A bare namespace is not stripped to nothing.
        assert_eq!(defaults.describe("hanzo"), "Hanzo for Hanzo AI platform");
    }

    #[test]
    fn sibling_detection() {
        let defaults = WorkspaceDefaults::default();
        assert!(defaults.is_sibling("hanzo-db"));
        assert!(defaults.is_sibling("hanzo_message_primitives"));
        assert!(!defaults.is_sibling("hanzoai"));
        assert!(!defaults.is_sibling("serde"));
    }

    #[test]
    fn inherited_description_prefers_workspace_value() {
        let mut defaults = WorkspaceDefaults::default();
        let generated = defaults.value_for(MetadataField::Description, "hanzo-fs");
        assert_eq!(generated.as_str(), Some("Fs for Hanzo AI platform"));

        defaults.description = Some(String::from("Hanzo AI component"));
        let shared = defaults.value_for(MetadataField::Description, "hanzo-fs");
        assert_eq!(shared.as_str(), Some("Hanzo AI component"));
    }

    #[test]
    fn authors_value_is_an_array() {
        let defaults = WorkspaceDefaults::default();
        let authors = defaults.value_for(MetadataField::Authors, "hanzo-fs");
        let authors: Vec<_> = authors
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(authors, ["Hanzo AI Inc"]);
    }

    #[test]
    fn parse_workspace_manifest() {
        let toml = r#"
[workspace]
members = ["hanzo-libs/*"]

[workspace.package]
version = "1.2.0"
edition = "2021"
authors = ["Team <team@example.com>"]

[workspace.dependencies]
tokio = "1.40"
serde = { version = "1.0.210", features = ["derive", "rc"] }
hanzo-db = { path = "hanzo-libs/hanzo-db" }
"#;
        let manifest = WorkspaceManifest::parse(toml).unwrap();

        let mut defaults = WorkspaceDefaults::default();
        manifest.apply_defaults(&mut defaults);
        assert_eq!(defaults.version, "1.2.0");
        assert_eq!(defaults.authors, ["Team <team@example.com>"]);
        assert_eq!(defaults.license, "MIT");

        let mut table = VersionTable::builtin();
        manifest.apply_dependencies(&mut table);
        assert_eq!(table.lookup("tokio").unwrap().version, "1.40");
        let serde = table.lookup("serde").unwrap();
        assert_eq!(serde.version, "1.0.210");
        assert_eq!(serde.features, ["derive".to_string(), "rc".to_string()]);
        assert!(table.lookup("hanzo-db").is_none());
    }

    #[test]
    fn load_requires_workspace_section() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Cargo.toml");
        fs::write(&path, "[package]\nname = \"solo\"\n").unwrap();

        let err = WorkspaceManifest::from_path(&path).unwrap_err();
        assert!(matches!(err, WorkspaceError::NotAWorkspace(_)));
    }

    #[test]
    fn load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = WorkspaceManifest::from_path(tmp.path().join("Cargo.toml")).unwrap_err();
        assert!(matches!(err, WorkspaceError::Io { .. }));
    }
}
