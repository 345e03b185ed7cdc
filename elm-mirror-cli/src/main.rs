//! elm-mirror - archive and smoke-test the Elm package registry
//!
//! Main entry point: parses flags, sets up logging, resolves configuration
//! and hands off to the command implementations.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use elm_mirror_core::MirrorConfig;

mod commands;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "elm-mirror",
    about = "Archive the Elm package registry and check every package still installs",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: commands::Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines on stderr
    #[clap(long, global = true)]
    log_json: bool,

    /// Configuration file (defaults to the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Override the artifacts directory
    #[clap(long, global = true)]
    root: Option<PathBuf>,

    /// Override the registry base URL
    #[clap(long, global = true)]
    registry: Option<String>,
}

impl Cli {
    /// Load the config file and apply command line overrides on top
    fn resolve_config(&self) -> Result<MirrorConfig> {
        let mut config =
            MirrorConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(root) = &self.root {
            config.artifacts_root = root.clone();
        }
        if let Some(registry) = &self.registry {
            config.registry_url = registry.clone();
        }

        config
            .validate()
            .context("Invalid configuration after applying command line overrides")?;
        Ok(config)
    }
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout carries the per-step status lines.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let config = cli.resolve_config()?;
    tracing::debug!("Effective configuration: {:?}", config);

    cli.command.execute(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "artifacts_root: /from/file\nelm_command: npx elm\n").unwrap();

        let cli = Cli::try_parse_from([
            "elm-mirror",
            "--config",
            path.to_str().unwrap(),
            "--registry",
            "http://localhost:8000",
            "run",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.artifacts_root, PathBuf::from("/from/file"));
        assert_eq!(config.registry_url, "http://localhost:8000");
        assert_eq!(config.elm_command, "npx elm");
    }

    #[test]
    fn test_bad_registry_override_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "{}\n").unwrap();

        let cli = Cli::try_parse_from([
            "elm-mirror",
            "--config",
            path.to_str().unwrap(),
            "--registry",
            "package.elm-lang.org",
            "index",
        ])
        .unwrap();
        assert!(cli.resolve_config().is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "elm-mirror",
            "run",
            "--only",
            "elm/core",
            "--only",
            "elm/json",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            commands::Command::Run { only, dry_run, .. } => {
                assert_eq!(only, vec!["elm/core", "elm/json"]);
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
