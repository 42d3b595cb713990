//! The package registry as seen from a publish run.
//!
//! This module provides:
//! - [`PublishedRegistry`], the live record of sibling packages known to be
//!   on the registry and the versions they were published at
//! - [`Publisher`], the seam around the external publish command, with
//!   [`CargoPublisher`] running `cargo publish`
//! - [`classify`], which turns the command's exit status and output into a
//!   [`PublishStatus`]

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Environment variable holding the crates.io token.
pub const DEFAULT_CREDENTIAL_VAR: &str = "CARGO_REGISTRY_TOKEN";

/// Output fragments the registry uses when a version is already present.
const ALREADY_PUBLISHED_MARKERS: &[&str] = &["already uploaded", "already exists"];

/// Packages known to be published, keyed by normalized name.
///
/// Crate names treat `-` and `_` as the same character, so `hanzo_db` and
/// `hanzo-db` refer to one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedRegistry {
    versions: BTreeMap<String, Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    version: String,
    seeded: bool,
}

fn normalize(name: &str) -> String {
    name.replace('_', "-")
}

impl PublishedRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with packages published before this run.
    pub fn seeded<I, N, V>(packages: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut registry = Self::new();
        for (name, version) in packages {
            registry.versions.insert(
                normalize(&name.into()),
                Entry {
                    version: version.into(),
                    seeded: true,
                },
            );
        }
        registry
    }

    /// Record that `name` is now on the registry at `version`.
    pub fn record(&mut self, name: impl Into<String>, version: impl Into<String>) {
        let key = normalize(&name.into());
        let seeded = self.versions.get(&key).is_some_and(|entry| entry.seeded);
        self.versions.insert(
            key,
            Entry {
                version: version.into(),
                seeded,
            },
        );
    }

    /// The published version of `name`.
    #[must_use]
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.versions
            .get(&normalize(name))
            .map(|entry| entry.version.as_str())
    }

    /// Returns true if `name` was known published before the run started.
    #[must_use]
    pub fn is_seeded(&self, name: &str) -> bool {
        self.versions
            .get(&normalize(name))
            .is_some_and(|entry| entry.seeded)
    }

    /// Number of known packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no packages are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// The registry token, read once from the environment.
///
/// The value is handed to the publish command and never inspected.
#[derive(Clone)]
pub struct Credential {
    var: String,
    value: String,
}

impl Credential {
    /// Read the credential from the environment variable `var`.
    ///
    /// Returns `None` if the variable is unset or empty.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|value| !value.is_empty())
            .map(|value| Self::new(var, value))
    }

    /// Build a credential from a known value.
    #[must_use]
    pub fn new(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            value: value.into(),
        }
    }

    /// Name of the environment variable the credential is passed in.
    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("var", &self.var)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Exit status and combined output of a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Standard output followed by standard error.
    pub output: String,
}

/// Runs the external publish command for one package.
pub trait Publisher {
    /// Publish the package rooted at `package_root`.
    fn publish(&self, package_root: &Path, credential: &Credential) -> std::io::Result<CommandOutput>;
}

/// Publishes by running a command such as `cargo publish --allow-dirty`.
#[derive(Debug, Clone)]
pub struct CargoPublisher {
    program: String,
    args: Vec<String>,
}

impl CargoPublisher {
    /// The default command: `cargo publish --allow-dirty`.
    ///
    /// The rewritten manifest is an uncommitted change by construction, hence
    /// `--allow-dirty`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: String::from("cargo"),
            args: vec![String::from("publish"), String::from("--allow-dirty")],
        }
    }

    /// Build a publisher from an argv. Returns `None` for an empty command.
    pub fn from_command<I, S>(command: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = command.into_iter().map(Into::<String>::into);
        let program = command.next()?;
        Some(Self {
            program,
            args: command.collect(),
        })
    }

    /// Append an argument, e.g. `--dry-run`.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The full command line, for logging.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for CargoPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for CargoPublisher {
    fn publish(&self, package_root: &Path, credential: &Credential) -> std::io::Result<CommandOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(package_root)
            .env(&credential.var, &credential.value)
            .output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            success: output.status.success(),
            output: combined,
        })
    }
}

/// How the registry answered a publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// The command succeeded.
    Published,
    /// The registry already has this version.
    AlreadyPublished,
    /// The registry refused the package; carries the diagnostic tail.
    Rejected(String),
}

/// Classify a publish attempt, keeping the last `tail` lines of output on failure.
#[must_use]
pub fn classify(output: &CommandOutput, tail: usize) -> PublishStatus {
    if output.success {
        return PublishStatus::Published;
    }
    let lower = output.output.to_lowercase();
    if ALREADY_PUBLISHED_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
    {
        return PublishStatus::AlreadyPublished;
    }
    PublishStatus::Rejected(tail_lines(&output.output, tail))
}

/// The last `n` lines of `text`, ignoring trailing blank lines.
#[must_use]
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(output: &str) -> CommandOutput {
        CommandOutput {
            success: false,
            output: output.to_string(),
        }
    }

    #[test]
    fn zero_exit_is_published() {
        let output = CommandOutput {
            success: true,
            output: String::from("Uploading hanzo-pqc v1.1.10"),
        };
        assert_eq!(classify(&output, 30), PublishStatus::Published);
    }

    #[test]
    fn already_uploaded_is_success_equivalent() {
        let output = failed(
            "error: failed to publish to registry at https://crates.io\n\n\
             Caused by:\n  the remote server responded with an error: \
             crate version `1.1.10` is Already Uploaded",
        );
        assert_eq!(classify(&output, 30), PublishStatus::AlreadyPublished);

        let output = failed("error: crate hanzo-pqc@1.1.10 already exists on crates.io index");
        assert_eq!(classify(&output, 30), PublishStatus::AlreadyPublished);
    }

    #[test]
    fn other_failures_keep_only_the_tail() {
        let log: Vec<String> = (1..=50).map(|i| format!("line {i}")).collect();
        let status = classify(&failed(&log.join("\n")), 3);
        assert_eq!(
            status,
            PublishStatus::Rejected(String::from("line 48\nline 49\nline 50"))
        );
    }

    #[test]
    fn tail_of_short_output_is_everything() {
        assert_eq!(tail_lines("a\nb\n\n", 30), "a\nb");
        assert_eq!(tail_lines("", 30), "");
    }

    #[test]
    fn registry_normalizes_names() {
        let mut registry = PublishedRegistry::seeded([("hanzo_message_primitives", "1.1.10")]);
        assert_eq!(registry.version_of("hanzo-message-primitives"), Some("1.1.10"));
        assert!(registry.is_seeded("hanzo-message-primitives"));

        registry.record("hanzo-pqc", "1.1.10");
        assert_eq!(registry.version_of("hanzo_pqc"), Some("1.1.10"));
        assert!(!registry.is_seeded("hanzo-pqc"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn recording_a_seeded_package_keeps_it_seeded() {
        let mut registry = PublishedRegistry::seeded([("hanzo-tools-runner", "1.0.3")]);
        registry.record("hanzo-tools-runner", "1.0.4");
        assert!(registry.is_seeded("hanzo-tools-runner"));
        assert_eq!(registry.version_of("hanzo-tools-runner"), Some("1.0.4"));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new(DEFAULT_CREDENTIAL_VAR, "cio_secret");
        let debug = format!("{credential:?}");
        assert!(debug.contains(DEFAULT_CREDENTIAL_VAR));
        assert!(!debug.contains("cio_secret"));
    }

    #[test]
    fn publisher_command_line() {
        let publisher = CargoPublisher::new().arg("--dry-run");
        assert_eq!(publisher.command_line(), "cargo publish --allow-dirty --dry-run");
        assert!(CargoPublisher::from_command(Vec::<String>::new()).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn publisher_runs_in_package_root_with_credential() {
        let tmp = tempfile::TempDir::new().unwrap();
        let publisher = CargoPublisher::from_command([
            "sh",
            "-c",
            "pwd; echo \"token=$HANZO_TEST_TOKEN\" >&2; exit 3",
        ])
        .unwrap();
        let credential = Credential::new("HANZO_TEST_TOKEN", "abc");

        let output = publisher.publish(tmp.path(), &credential).unwrap();
        assert!(!output.success);
        assert!(output.output.contains("token=abc"));
        let root = tmp.path().canonicalize().unwrap();
        assert!(output.output.contains(root.to_str().unwrap()));
    }
}
