//! hanzo-release - publish the Hanzo workspace crates to crates.io in dependency order

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use hanzo_release::CONFIG_FILE;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod fix;
mod publish;
mod resolve;
mod restore;

#[derive(Parser)]
#[command(name = "hanzo-release")]
#[command(version)]
#[command(about = "Publish Hanzo workspace crates as standalone packages", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and publish every package of the publish order
    Publish {
        /// Path to the run configuration
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,

        /// Resume the order at this package
        #[arg(long)]
        from: Option<String>,

        /// Pass --dry-run to the publish command and skip the settle delay
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved form of a manifest without changing it
    Resolve {
        /// Path to the manifest
        manifest: PathBuf,

        /// Path to the run configuration (defaults apply if omitted and absent)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Package name used for generated descriptions
        #[arg(long)]
        name: Option<String>,
    },

    /// Resolve every manifest of the publish order in place
    Fix {
        /// Path to the run configuration
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },

    /// Put back manifests left modified by an interrupted run
    Restore {
        /// Path to the run configuration
        #[arg(long, default_value = CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Publish {
            config,
            from,
            dry_run,
            json,
        } => {
            let options = publish::PublishArgs {
                config,
                from,
                dry_run,
                json,
            };
            publish::run(&options)
        }

        Commands::Resolve {
            manifest,
            config,
            name,
        } => {
            resolve::run(&manifest, config.as_deref(), name.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fix { config } => {
            fix::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Restore { config } => {
            restore::run(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Log to stderr so stdout only carries reports and manifests.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_publish_defaults() {
        let cli = Cli::try_parse_from(["hanzo-release", "publish"]).unwrap();
        match cli.command {
            Commands::Publish {
                config,
                from,
                dry_run,
                json,
            } => {
                assert_eq!(config, PathBuf::from(CONFIG_FILE));
                assert!(from.is_none());
                assert!(!dry_run);
                assert!(!json);
            }
            _ => panic!("Expected Publish command"),
        }
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_publish_with_flags() {
        let cli = Cli::try_parse_from([
            "hanzo-release",
            "publish",
            "--config",
            "release/hanzo-release.toml",
            "--from",
            "hanzo-db",
            "--dry-run",
            "--json",
            "-vv",
        ])
        .unwrap();
        match cli.command {
            Commands::Publish {
                config,
                from,
                dry_run,
                json,
            } => {
                assert_eq!(config, PathBuf::from("release/hanzo-release.toml"));
                assert_eq!(from.as_deref(), Some("hanzo-db"));
                assert!(dry_run);
                assert!(json);
            }
            _ => panic!("Expected Publish command"),
        }
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_resolve_command() {
        let cli = Cli::try_parse_from([
            "hanzo-release",
            "-v",
            "resolve",
            "hanzo-libs/hanzo-db/Cargo.toml",
            "--name",
            "hanzo-db",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                manifest,
                config,
                name,
            } => {
                assert_eq!(manifest, PathBuf::from("hanzo-libs/hanzo-db/Cargo.toml"));
                assert!(config.is_none());
                assert_eq!(name.as_deref(), Some("hanzo-db"));
            }
            _ => panic!("Expected Resolve command"),
        }
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_resolve_requires_manifest() {
        assert!(Cli::try_parse_from(["hanzo-release", "resolve"]).is_err());
    }

    #[test]
    fn test_fix_and_restore_commands() {
        let cli = Cli::try_parse_from(["hanzo-release", "fix", "--config", "r.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Fix { config } if config == PathBuf::from("r.toml")));

        let cli = Cli::try_parse_from(["hanzo-release", "restore"]).unwrap();
        assert!(matches!(cli.command, Commands::Restore { .. }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["hanzo-release"]).is_err());
    }
}
