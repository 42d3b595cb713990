//! Release tooling for the Hanzo Rust workspace.
//!
//! This crate provides:
//! - A version and feature table for dependencies members inherit from the
//!   workspace
//! - Format-preserving loading, resolution and writing of `Cargo.toml`
//!   manifests, turning a workspace member into a standalone crate
//! - Scoped manifest backups that restore the original on every exit path
//! - Ordered publishing of members with a live record of what reached the
//!   registry

mod backup;
mod config;
mod manifest;
mod publish;
mod registry;
mod resolve;
mod table;
mod workspace;

pub use backup::{
    backup_path_for, find_leftover_backups, restore_leftover, BackupError, ManifestBackup,
    BACKUP_SUFFIX,
};
pub use config::{ConfigError, DefaultsConfig, PublishConfig, TierConfig, CONFIG_FILE};
pub use manifest::{
    DeclaredForm, DependencySpec, Manifest, ManifestError, Resolution, DEPENDENCY_SECTIONS,
    MANIFEST_FILE,
};
pub use publish::{
    require_credential, Orchestrator, Outcome, PublishError, PublishOptions, PublishOrder,
    PublishReport, PublishResult, Tier, DEFAULT_DIAGNOSTIC_TAIL, DEFAULT_SETTLE,
};
pub use registry::{
    classify, tail_lines, CargoPublisher, CommandOutput, Credential, PublishStatus, Publisher,
    PublishedRegistry, DEFAULT_CREDENTIAL_VAR,
};
pub use resolve::{Resolver, FALLBACK_VERSION};
pub use table::{ExplicitSpec, VersionTable};
pub use workspace::{
    MetadataField, WorkspaceConfig, WorkspaceDefaults, WorkspaceDependency, WorkspaceError,
    WorkspaceManifest, WorkspacePackageConfig,
};
