//! Rewriting a workspace member's manifest into a self-contained one.
//!
//! A crate inside the Hanzo workspace leans on the workspace root for its
//! metadata and most dependency versions. The registry only sees the crate's
//! own `Cargo.toml`, so before publishing every inherited value is replaced
//! with an explicit one:
//!
//! 1. inherited or missing `[package]` fields get the workspace defaults
//! 2. `[dependencies.name]` tables and dotted keys are folded into inline
//!    tables
//! 3. inherited dependencies get an explicit version and their mandatory
//!    features
//! 4. an empty `[workspace]` table marks the crate as standalone
//!
//! Resolution never fails and is idempotent.

use crate::manifest::{dependency_tables_mut, DependencySpec, Manifest, DEPENDENCY_SECTIONS};
use crate::registry::PublishedRegistry;
use crate::table::VersionTable;
use crate::workspace::{MetadataField, WorkspaceDefaults};
use toml_edit::{Array, Item, Table, TableLike, Value};
use tracing::{debug, warn};

/// Version pinned for an inherited dependency nobody knows about.
pub const FALLBACK_VERSION: &str = "1.0";

/// Resolves inherited manifest values against the tables of one run.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    table: &'a VersionTable,
    defaults: &'a WorkspaceDefaults,
    published: &'a PublishedRegistry,
}

impl<'a> Resolver<'a> {
    /// Create a resolver.
    #[must_use]
    pub fn new(
        table: &'a VersionTable,
        defaults: &'a WorkspaceDefaults,
        published: &'a PublishedRegistry,
    ) -> Self {
        Self {
            table,
            defaults,
            published,
        }
    }

    /// Return a copy of `manifest` with every inherited value made explicit.
    ///
    /// `package_name` is used to generate a description when the manifest
    /// needs one.
    #[must_use]
    pub fn resolve(&self, manifest: &Manifest, package_name: &str) -> Manifest {
        let mut resolved = manifest.clone();
        let root = resolved.document_mut().as_table_mut();

        if let Some(package) = root.get_mut("package").and_then(Item::as_table_like_mut) {
            self.resolve_metadata(package, package_name);
        }

        fold_quoted_sections(root);
        for (section, table) in dependency_tables_mut(root) {
            table.set_implicit(false);
            self.resolve_dependencies(&section, table);
        }

        if !root.contains_key("workspace") {
            root.insert("workspace", Item::Table(Table::new()));
            debug!(package = package_name, "marked standalone");
        }

        for key in unresolved_inherited_keys(root) {
            warn!(package = package_name, key = %key, "still inherits from the workspace; cargo will reject it");
        }

        resolved
    }

    fn resolve_metadata(&self, package: &mut dyn TableLike, package_name: &str) {
        if package.remove("workspace").is_some() {
            debug!(package = package_name, "dropped package.workspace pointer");
        }

        for field in MetadataField::ALL {
            let key = field.key();
            let value = match package.get(key) {
                None => match field {
                    MetadataField::Description => Value::from(self.defaults.describe(package_name)),
                    _ => self.defaults.value_for(field, package_name),
                },
                Some(item) if is_inherited(item) => self.defaults.value_for(field, package_name),
                Some(item)
                    if field == MetadataField::Description
                        && item.as_str().is_some_and(|s| s.trim().is_empty()) =>
                {
                    Value::from(self.defaults.describe(package_name))
                }
                Some(_) => continue,
            };
            debug!(package = package_name, field = key, value = %value, "filled package field");
            package.insert(key, Item::Value(value));
        }
    }

    fn resolve_dependencies(&self, section: &str, table: &mut Table) {
        for (mut key, item) in table.iter_mut() {
            if item.is_table() {
                *item = fold(std::mem::take(item));
                key.fmt();
            }

            let key = key.get().to_string();
            let Some(mut spec) = DependencySpec::from_item(item) else {
                continue;
            };
            let name = spec.package_name(&key).to_string();
            let required = self.table.required_features(&name);

            if spec.is_inherited() {
                let version = self.version_for(&name);
                debug!(section, dependency = %key, version = %version, "pinned inherited dependency");
                spec.set_explicit(version);
                spec.merge_features(required);
                replace_value(item, spec.to_value());
            } else if spec.merge_features(required) {
                debug!(section, dependency = %key, "added mandatory features");
                match item.as_inline_table_mut() {
                    Some(inline) => {
                        let features: Array = spec.features.iter().map(String::as_str).collect();
                        inline.insert("features", Value::Array(features));
                    }
                    None => replace_value(item, spec.to_value()),
                }
            }
        }
    }

    fn version_for(&self, name: &str) -> String {
        if let Some(version) = self.published.version_of(name) {
            return version.to_string();
        }
        if let Some(spec) = self.table.lookup(name) {
            return spec.version.to_string();
        }
        if self.defaults.is_sibling(name) {
            return self.defaults.version.clone();
        }
        warn!(dependency = name, "no known version, falling back to {FALLBACK_VERSION}");
        FALLBACK_VERSION.to_string()
    }
}

/// `field.workspace = true` or `field = { workspace = true }`.
fn is_inherited(item: &Item) -> bool {
    item.as_table_like()
        .and_then(|table| table.get("workspace"))
        .and_then(Item::as_bool)
        == Some(true)
}

/// Inherited keys the resolver has no value for, such as
/// `package.rust-version` or `lints`.
fn unresolved_inherited_keys(root: &Table) -> Vec<String> {
    let mut keys: Vec<String> = root
        .get("package")
        .and_then(Item::as_table_like)
        .into_iter()
        .flat_map(|package| package.iter())
        .filter(|(_, item)| is_inherited(item))
        .map(|(key, _)| format!("package.{key}"))
        .collect();
    if root.get("lints").is_some_and(is_inherited) {
        keys.push(String::from("lints"));
    }
    keys
}

/// Turn a header or dotted table into an inline table value.
fn fold(item: Item) -> Item {
    match item {
        Item::Table(table) => {
            let mut inline = table.into_inline_table();
            inline.fmt();
            Item::Value(Value::InlineTable(inline))
        }
        other => other,
    }
}

/// Keep the whitespace and trailing comment of the value being replaced.
fn replace_value(item: &mut Item, mut value: Value) {
    if let Some(old) = item.as_value() {
        *value.decor_mut() = old.decor().clone();
    }
    *item = Item::Value(value);
}

/// Move top-level keys such as `"dependencies.serde"` into their section.
fn fold_quoted_sections(root: &mut Table) {
    let quoted: Vec<String> = root
        .iter()
        .map(|(key, _)| key.to_string())
        .filter(|key| {
            key.split_once('.')
                .is_some_and(|(section, name)| DEPENDENCY_SECTIONS.contains(&section) && !name.is_empty())
        })
        .collect();

    for key in quoted {
        let Some((section, name)) = key.split_once('.') else {
            continue;
        };
        if root.get(section).is_some_and(|item| !item.is_table()) {
            warn!(key = %key, "cannot fold into non-table [{section}]");
            continue;
        }
        let Some(item) = root.remove(&key) else {
            continue;
        };
        if let Some(table) = root
            .entry(section)
            .or_insert_with(|| Item::Table(Table::new()))
            .as_table_mut()
        {
            debug!(key = %key, "folded quoted dependency key");
            table.insert(name, fold(item));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolve_with(registry: &PublishedRegistry, source: &str) -> Manifest {
        let table = VersionTable::builtin();
        let defaults = WorkspaceDefaults::default();
        let manifest = Manifest::parse(source).unwrap();
        let name = manifest.package_name().unwrap_or("hanzo-test").to_string();
        Resolver::new(&table, &defaults, registry).resolve(&manifest, &name)
    }

    fn resolve(source: &str) -> Manifest {
        resolve_with(&PublishedRegistry::new(), source)
    }

    fn features(spec: &DependencySpec) -> Vec<&str> {
        spec.features.iter().map(String::as_str).collect()
    }

    #[test]
    fn inherited_serde_gets_version_and_derive() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-db"
version = "1.1.10"

[dependencies]
serde = { workspace = true }
"#,
        );
        assert!(resolved
            .to_string()
            .contains(r#"serde = { version = "1.0.219", features = ["derive"] }"#));
        assert!(!resolved.has_inherited_dependencies());
    }

    #[test]
    fn inherited_metadata_is_filled_in() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-tools-primitives"
version.workspace = true
edition = { workspace = true }
"#,
        );
        let package = resolved.document()["package"].as_table().unwrap();
        assert_eq!(package["version"].as_str(), Some("1.1.10"));
        assert_eq!(package["edition"].as_str(), Some("2021"));
        assert_eq!(package["license"].as_str(), Some("MIT"));
        assert_eq!(package["homepage"].as_str(), Some("https://hanzo.ai"));
        assert_eq!(
            package["description"].as_str(),
            Some("Tools Primitives for Hanzo AI platform")
        );
        assert_eq!(resolved.package_version(), Some("1.1.10"));
        assert!(resolved.to_string().contains("version = \"1.1.10\""));
    }

    #[test]
    fn explicit_fields_are_never_overwritten() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-pqc"
version = "0.9.0"
license = "Apache-2.0"
description = "Post-quantum crypto"
"#,
        );
        assert_eq!(resolved.package_version(), Some("0.9.0"));
        let package = resolved.document()["package"].as_table().unwrap();
        assert_eq!(package["license"].as_str(), Some("Apache-2.0"));
        assert_eq!(package["description"].as_str(), Some("Post-quantum crypto"));
    }

    #[test]
    fn empty_description_is_generated() {
        let resolved = resolve("[package]\nname = \"hanzo-fs\"\ndescription = \"\"\n");
        let package = resolved.document()["package"].as_table().unwrap();
        assert_eq!(package["description"].as_str(), Some("Fs for Hanzo AI platform"));
    }

    #[test]
    fn inherited_description_uses_workspace_description() {
        let table = VersionTable::builtin();
        let defaults = WorkspaceDefaults {
            description: Some(String::from("Hanzo AI component")),
            ..WorkspaceDefaults::default()
        };
        let registry = PublishedRegistry::new();
        let manifest =
            Manifest::parse("[package]\nname = \"hanzo-fs\"\ndescription.workspace = true\n").unwrap();

        let resolved = Resolver::new(&table, &defaults, &registry).resolve(&manifest, "hanzo-fs");
        let package = resolved.document()["package"].as_table().unwrap();
        assert_eq!(package["description"].as_str(), Some("Hanzo AI component"));
    }

    #[test]
    fn package_workspace_pointer_is_removed() {
        let resolved = resolve("[package]\nname = \"hanzo-fs\"\nworkspace = \"../..\"\n");
        let package = resolved.document()["package"].as_table().unwrap();
        assert!(!package.contains_key("workspace"));
        assert!(resolved.is_standalone());
    }

    #[test]
    fn inherited_keys_without_a_default_are_reported() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-fs"
version.workspace = true
rust-version.workspace = true
publish = { workspace = true }

[lints]
workspace = true
"#,
        );
        let package = resolved.document()["package"].as_table().unwrap();
        assert_eq!(package["version"].as_str(), Some("1.1.10"));
        assert_eq!(
            unresolved_inherited_keys(resolved.document().as_table()),
            ["package.rust-version", "package.publish", "lints"]
        );

        let clean = resolve("[package]\nname = \"hanzo-fs\"\nversion.workspace = true\n");
        assert!(unresolved_inherited_keys(clean.document().as_table()).is_empty());
    }

    #[test]
    fn explicit_dependencies_are_untouched() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-db"

[dependencies]
anyhow = "1.0.40"  # pinned
hanzo-sqlite = { path = "../hanzo-sqlite", version = "1.1.10" }
"#,
        );
        let text = resolved.to_string();
        assert!(text.contains("anyhow = \"1.0.40\"  # pinned\n"));
        assert!(text.contains(r#"hanzo-sqlite = { path = "../hanzo-sqlite", version = "1.1.10" }"#));
    }

    #[test]
    fn explicit_dependency_gains_mandatory_features() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-http"

[dependencies]
reqwest = "0.12"
tokio = { version = "1.40", features = ["rt", "signal"], optional = true }
"#,
        );
        let reqwest = resolved.dependency("dependencies", "reqwest").unwrap();
        assert_eq!(reqwest.version.as_deref(), Some("0.12"));
        assert_eq!(features(&reqwest), ["json"]);

        let tokio = resolved.dependency("dependencies", "tokio").unwrap();
        assert_eq!(tokio.version.as_deref(), Some("1.40"));
        assert_eq!(
            features(&tokio),
            ["rt", "signal", "rt-multi-thread", "macros", "fs", "io-util", "net", "sync", "time"]
        );
        assert_eq!(tokio.extra.len(), 1);
    }

    #[test]
    fn unknown_dependency_falls_back() {
        let resolved = resolve("[package]\nname = \"hanzo-x\"\n\n[dependencies]\nleft-pad = { workspace = true }\n");
        let spec = resolved.dependency("dependencies", "left-pad").unwrap();
        assert_eq!(spec.version.as_deref(), Some(FALLBACK_VERSION));
        assert!(!spec.is_inherited());
    }

    #[test]
    fn sibling_versions_come_from_the_registry_first() {
        let registry = PublishedRegistry::seeded([("hanzo-message-primitives", "1.1.9")]);
        let resolved = resolve_with(
            &registry,
            r#"[package]
name = "hanzo-kbs"

[dependencies]
hanzo_message_primitives = { workspace = true }
hanzo-unpublished = { workspace = true, optional = true }
primitives = { package = "hanzo-message-primitives", workspace = true }
"#,
        );
        let published = resolved
            .dependency("dependencies", "hanzo_message_primitives")
            .unwrap();
        assert_eq!(published.version.as_deref(), Some("1.1.9"));

        let renamed = resolved.dependency("dependencies", "primitives").unwrap();
        assert_eq!(renamed.version.as_deref(), Some("1.1.9"));

        let sibling = resolved.dependency("dependencies", "hanzo-unpublished").unwrap();
        assert_eq!(sibling.version.as_deref(), Some("1.1.10"));
        assert_eq!(sibling.extra.len(), 1);
    }

    #[test]
    fn bare_placeholder_resolves_to_bare_version() {
        let resolved = resolve("[package]\nname = \"hanzo-x\"\n\n[dependencies]\nanyhow = \"\"\n");
        assert!(resolved.to_string().contains("anyhow = \"1.0.86\"\n"));
    }

    #[test]
    fn nested_tables_are_folded() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-x"

[dependencies]
chrono.workspace = true

[dependencies.uuid]
workspace = true
features = ["v4"]

[dev-dependencies.tempfile]
workspace = true
"#,
        );
        let document = resolved.document();
        assert!(document["dependencies"]["uuid"].is_inline_table());
        assert!(document["dependencies"]["chrono"].is_inline_table());

        let uuid = resolved.dependency("dependencies", "uuid").unwrap();
        assert_eq!(uuid.version.as_deref(), Some("1.8.0"));
        assert_eq!(features(&uuid), ["v4"]);

        let chrono = resolved.dependency("dependencies", "chrono").unwrap();
        assert_eq!(chrono.version.as_deref(), Some("0.4"));
        assert_eq!(features(&chrono), ["serde"]);

        let tempfile = resolved.dependency("dev-dependencies", "tempfile").unwrap();
        assert_eq!(tempfile.version.as_deref(), Some("3.8"));
        assert!(resolved.to_string().contains("[dev-dependencies]\n"));
    }

    #[test]
    fn quoted_section_keys_are_folded() {
        let registry = PublishedRegistry::seeded([("hanzo-message-primitives", "1.1.10")]);
        let resolved = resolve_with(
            &registry,
            r#"[package]
name = "hanzo-kbs"

["dependencies.hanzo_message_primitives"]
workspace = true
"#,
        );
        assert!(!resolved
            .document()
            .contains_key("dependencies.hanzo_message_primitives"));
        let spec = resolved
            .dependency("dependencies", "hanzo_message_primitives")
            .unwrap();
        assert_eq!(spec.version.as_deref(), Some("1.1.10"));
    }

    #[test]
    fn target_sections_are_resolved() {
        let resolved = resolve(
            r#"[package]
name = "hanzo-x"

[target.'cfg(unix)'.dependencies]
nalgebra = { workspace = true }
"#,
        );
        assert!(!resolved.has_inherited_dependencies());
        assert!(resolved
            .to_string()
            .contains(r#"nalgebra = { version = "0.32", features = ["serde-serialize"] }"#));
    }

    #[test]
    fn existing_workspace_table_is_kept() {
        let source = "[package]\nname = \"hanzo-x\"\n\n[workspace]\nmembers = []\n";
        let resolved = resolve(source);
        assert_eq!(resolved.document()["workspace"]["members"].as_array().unwrap().len(), 0);

        let marked = resolve("[package]\nname = \"hanzo-x\"\n");
        assert!(marked.to_string().ends_with("[workspace]\n"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let source = r#"# Hanzo key-value store
[package]
name = "hanzo-kbs"
version.workspace = true
authors.workspace = true

[dependencies]
serde = { workspace = true }
tokio = { workspace = true, features = ["signal"] }
reqwest = "0.11"
hanzo-db = { workspace = true, path = "../hanzo-db" }

[dependencies.chrono]
workspace = true

[dev-dependencies]
tempfile = ""
"#;
        let once = resolve(source);
        let twice = resolve(&once.to_string());
        assert_eq!(twice.to_string(), once.to_string());
        assert!(once.to_string().starts_with("# Hanzo key-value store\n"));
    }
}
