//! Explicit versions and mandatory features for inherited dependencies.
//!
//! Workspace members declare most third-party dependencies as
//! `name = { workspace = true }`. A crate published on its own cannot do that,
//! so the resolver looks the name up here to find the version to pin and the
//! features the crate cannot build without.

use std::collections::BTreeMap;

/// Built-in dependency versions shared by the Hanzo workspace.
const VERSIONS: &[(&str, &str)] = &[
    ("anyhow", "1.0.86"),
    ("async-trait", "0.1.81"),
    ("base64", "0.22.0"),
    ("bincode", "1.3.3"),
    ("blake3", "1.5"),
    ("chrono", "0.4"),
    ("clap", "4.5.4"),
    ("criterion", "0.5"),
    ("csv", "1.3"),
    ("dashmap", "6.0"),
    ("dirs", "5.0"),
    ("ed25519-dalek", "2.1.1"),
    ("futures", "0.3.30"),
    ("hex", "0.4.3"),
    ("home", "0.5.5"),
    ("keyphrases", "0.3.2"),
    ("lazy_static", "1.4.0"),
    ("log", "0.4.20"),
    ("nalgebra", "0.32"),
    ("once_cell", "1.19"),
    ("regex", "1"),
    ("reqwest", "0.11.27"),
    ("rmcp", "0.6"),
    ("rusqlite", "0.31.0"),
    ("serde", "1.0.219"),
    ("serde_json", "1.0.117"),
    ("sha2", "0.10"),
    ("tempfile", "3.8"),
    ("thiserror", "2.0"),
    ("tokio", "1.36"),
    ("tokio-test", "0.4"),
    ("tracing", "0.1.40"),
    ("utoipa", "4.2"),
    ("uuid", "1.8.0"),
    ("x25519-dalek", "2.0.1"),
];

/// Features that must be enabled wherever the dependency appears.
const FEATURES: &[(&str, &[&str])] = &[
    ("chrono", &["serde"]),
    ("ed25519-dalek", &["rand_core"]),
    ("nalgebra", &["serde-serialize"]),
    ("reqwest", &["json"]),
    ("serde", &["derive"]),
    (
        "tokio",
        &[
            "rt",
            "rt-multi-thread",
            "macros",
            "fs",
            "io-util",
            "net",
            "sync",
            "time",
        ],
    ),
    ("tracing-subscriber", &["env-filter"]),
    ("utoipa", &["yaml"]),
    ("x25519-dalek", &["static_secrets"]),
];

/// An explicit version plus the features it must be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplicitSpec<'a> {
    /// Version requirement to pin.
    pub version: &'a str,
    /// Features that must be enabled.
    pub features: &'a [String],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TableEntry {
    version: Option<String>,
    features: Vec<String>,
}

/// Lookup table from dependency name to explicit version and features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTable {
    entries: BTreeMap<String, TableEntry>,
}

impl VersionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of versions and features used across the Hanzo workspace.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (name, version) in VERSIONS {
            table.set_version(*name, *version);
        }
        for (name, features) in FEATURES {
            table.require_features(*name, features.iter().copied());
        }
        table
    }

    /// Pin `name` to `version`, replacing any previous version.
    pub fn set_version(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.entries.entry(name.into()).or_default().version = Some(version.into());
    }

    /// Add mandatory features for `name`. Features already present are kept once.
    pub fn require_features<I, S>(&mut self, name: impl Into<String>, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entries.entry(name.into()).or_default();
        for feature in features {
            let feature = feature.into();
            if !entry.features.contains(&feature) {
                entry.features.push(feature);
            }
        }
    }

    /// Look up the explicit declaration for `name`.
    ///
    /// Returns `None` for unknown names and for names that only carry
    /// mandatory features; callers must then leave the version alone.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ExplicitSpec<'_>> {
        let entry = self.entries.get(name)?;
        let version = entry.version.as_deref()?;
        Some(ExplicitSpec {
            version,
            features: &entry.features,
        })
    }

    /// Features that must be enabled for `name` (empty when none are required).
    #[must_use]
    pub fn required_features(&self, name: &str) -> &[String] {
        self.entries
            .get(name)
            .map_or(&[][..], |entry| entry.features.as_slice())
    }

    /// Number of dependency names with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_serde_has_version_and_derive() {
        let table = VersionTable::builtin();
        let spec = table.lookup("serde").unwrap();
        assert_eq!(spec.version, "1.0.219");
        assert_eq!(spec.features, ["derive".to_string()]);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let table = VersionTable::builtin();
        assert!(table.lookup("left-pad").is_none());
        assert!(table.required_features("left-pad").is_empty());
    }

    #[test]
    fn feature_only_entry_has_no_version() {
        let table = VersionTable::builtin();
        assert!(table.lookup("tracing-subscriber").is_none());
        assert_eq!(table.required_features("tracing-subscriber"), ["env-filter"]);
    }

    #[test]
    fn set_version_overrides_builtin() {
        let mut table = VersionTable::builtin();
        table.set_version("thiserror", "1.0.63");
        assert_eq!(table.lookup("thiserror").unwrap().version, "1.0.63");
    }

    #[test]
    fn require_features_does_not_duplicate() {
        let mut table = VersionTable::new();
        table.require_features("reqwest", ["json"]);
        table.require_features("reqwest", ["json", "rustls-tls"]);
        assert_eq!(table.required_features("reqwest"), ["json", "rustls-tls"]);
        assert!(table.lookup("reqwest").is_none());
    }

    #[test]
    fn every_builtin_feature_entry_is_reachable() {
        let table = VersionTable::builtin();
        for (name, features) in FEATURES {
            assert_eq!(table.required_features(name).len(), features.len(), "{name}");
        }
        assert_eq!(table.len(), VERSIONS.len() + 1);
    }
}
