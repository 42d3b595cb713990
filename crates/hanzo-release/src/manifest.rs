//! Cargo manifest (`Cargo.toml`) loading, editing and writing.
//!
//! Manifests are kept as a [`toml_edit::DocumentMut`] so that everything the
//! resolver does not touch (comments, `[lib]`, `[features]`, key order) is
//! written back exactly as it was read.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value};

/// Name of the manifest file inside a package root.
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Dependency sections, at the top level or under `[target.<cfg>]`.
pub const DEPENDENCY_SECTIONS: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml_edit::TomlError),

    #[error("failed to replace manifest {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A package manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    doc: DocumentMut,
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        Ok(Self {
            doc: content.parse::<DocumentMut>()?,
        })
    }

    /// Write the manifest to `path`.
    ///
    /// The content goes to a temporary file next to `path` which is then
    /// renamed over it, so readers never observe a partially written file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(self.to_string().as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| ManifestError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    /// The `package.name` field, if present.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        self.doc.get("package")?.get("name")?.as_str()
    }

    /// The `package.version` field, if it is explicit.
    #[must_use]
    pub fn package_version(&self) -> Option<&str> {
        self.doc.get("package")?.get("version")?.as_str()
    }

    /// Returns true if the manifest declares its own (possibly empty) workspace.
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.doc.contains_key("workspace")
    }

    /// Look up a dependency by section and name.
    ///
    /// `section` is one of [`DEPENDENCY_SECTIONS`] at the top level.
    #[must_use]
    pub fn dependency(&self, section: &str, name: &str) -> Option<DependencySpec> {
        self.doc
            .get(section)?
            .as_table_like()?
            .get(name)
            .and_then(DependencySpec::from_item)
    }

    /// Returns true if any dependency in any section is still inherited.
    #[must_use]
    pub fn has_inherited_dependencies(&self) -> bool {
        dependency_tables(self.doc.as_table()).into_iter().any(|(_, table)| {
            table
                .iter()
                .filter_map(|(_, item)| DependencySpec::from_item(item))
                .any(|spec| spec.is_inherited())
        })
    }

    pub(crate) fn document_mut(&mut self) -> &mut DocumentMut {
        &mut self.doc
    }

    /// The underlying TOML document.
    #[must_use]
    pub fn document(&self) -> &DocumentMut {
        &self.doc
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doc)
    }
}

fn dependency_tables(root: &Table) -> Vec<(String, &Table)> {
    let mut tables = Vec::new();
    for section in DEPENDENCY_SECTIONS {
        if let Some(table) = root.get(section).and_then(Item::as_table) {
            tables.push((section.to_string(), table));
        }
    }
    if let Some(targets) = root.get("target").and_then(Item::as_table) {
        for (platform, item) in targets.iter() {
            let Some(platform_table) = item.as_table() else {
                continue;
            };
            for section in DEPENDENCY_SECTIONS {
                if let Some(table) = platform_table.get(section).and_then(Item::as_table) {
                    tables.push((format!("target.{platform}.{section}"), table));
                }
            }
        }
    }
    tables
}

/// Collect every dependency table of a manifest, including target-specific
/// ones, labelled with their dotted section path.
pub(crate) fn dependency_tables_mut(root: &mut Table) -> Vec<(String, &mut Table)> {
    let mut tables = Vec::new();
    for (key, item) in root.iter_mut() {
        let key = key.get().to_string();
        if DEPENDENCY_SECTIONS.contains(&key.as_str()) {
            if let Some(table) = item.as_table_mut() {
                tables.push((key, table));
            }
        } else if key == "target" {
            let Some(targets) = item.as_table_mut() else {
                continue;
            };
            for (platform, item) in targets.iter_mut() {
                let platform = platform.get().to_string();
                let Some(platform_table) = item.as_table_mut() else {
                    continue;
                };
                for (section, item) in platform_table.iter_mut() {
                    let section = section.get().to_string();
                    if !DEPENDENCY_SECTIONS.contains(&section.as_str()) {
                        continue;
                    }
                    if let Some(table) = item.as_table_mut() {
                        tables.push((format!("target.{platform}.{section}"), table));
                    }
                }
            }
        }
    }
    tables
}

/// How a dependency was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredForm {
    /// `name = "1.0"`
    Bare,
    /// `name = { version = "1.0", ... }` or a `[dependencies.name]` table.
    Table,
}

/// Whether a dependency still defers to the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// `workspace = true`, or an empty placeholder version.
    Inherited,
    /// A self-contained declaration.
    Explicit,
}

/// A dependency declaration.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    /// How the declaration was written.
    pub form: DeclaredForm,
    /// Whether the declaration is inherited.
    pub resolution: Resolution,
    /// Version requirement, if any.
    pub version: Option<String>,
    /// Enabled features, in declaration order.
    pub features: Vec<String>,
    /// Other keys (`optional`, `path`, `package`, ...), carried through as-is.
    pub extra: Vec<(String, Value)>,
}

impl DependencySpec {
    /// Read a dependency declaration from a manifest item.
    ///
    /// Returns `None` for items that are neither a string nor a table.
    #[must_use]
    pub fn from_item(item: &Item) -> Option<Self> {
        if let Some(version) = item.as_str() {
            let placeholder = version.trim().is_empty();
            return Some(Self {
                form: DeclaredForm::Bare,
                resolution: if placeholder {
                    Resolution::Inherited
                } else {
                    Resolution::Explicit
                },
                version: (!placeholder).then(|| version.to_string()),
                features: Vec::new(),
                extra: Vec::new(),
            });
        }

        let table = item.as_table_like()?;
        let mut spec = Self {
            form: DeclaredForm::Table,
            resolution: Resolution::Explicit,
            version: None,
            features: Vec::new(),
            extra: Vec::new(),
        };
        for (key, item) in table.iter() {
            match key {
                "workspace" => {
                    if item.as_bool() == Some(true) {
                        spec.resolution = Resolution::Inherited;
                    }
                }
                "version" => spec.version = item.as_str().map(str::to_string),
                "features" => {
                    if let Some(features) = item.as_array() {
                        spec.features = features
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect();
                    }
                }
                _ => {
                    if let Some(value) = item.as_value() {
                        let mut value = value.clone();
                        value.decor_mut().clear();
                        spec.extra.push((key.to_string(), value));
                    }
                }
            }
        }
        Some(spec)
    }

    /// Returns true if the declaration defers to the workspace.
    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.resolution == Resolution::Inherited
    }

    /// The registry package name: the `package` key if renamed, else `key`.
    #[must_use]
    pub fn package_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.extra
            .iter()
            .find(|(k, _)| k == "package")
            .and_then(|(_, value)| value.as_str())
            .unwrap_or(key)
    }

    /// Pin the version and mark the declaration explicit.
    pub fn set_explicit(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
        self.resolution = Resolution::Explicit;
    }

    /// Add features that are not enabled yet. Returns true if any were added.
    pub fn merge_features<I, S>(&mut self, features: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = false;
        for feature in features {
            let feature = feature.as_ref();
            if !self.features.iter().any(|f| f == feature) {
                self.features.push(feature.to_string());
                added = true;
            }
        }
        added
    }

    /// Render the declaration as a manifest value.
    ///
    /// A bare declaration stays a bare string as long as it has nothing but a
    /// version; anything else becomes an inline table.
    #[must_use]
    pub fn to_value(&self) -> Value {
        if self.form == DeclaredForm::Bare && self.features.is_empty() && self.extra.is_empty() {
            return Value::from(self.version.as_deref().unwrap_or_default());
        }

        let mut table = InlineTable::new();
        if self.is_inherited() {
            table.insert("workspace", Value::from(true));
        }
        if let Some(version) = &self.version {
            table.insert("version", Value::from(version.as_str()));
        }
        if !self.features.is_empty() {
            let features: Array = self.features.iter().map(String::as_str).collect();
            table.insert("features", Value::Array(features));
        }
        for (key, value) in &self.extra {
            table.insert(key.as_str(), value.clone());
        }
        table.fmt();
        Value::InlineTable(table)
    }
}
