//! Mirror configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Command line flags (applied by the CLI on top of the loaded file)
//! 2. An explicit `--config <file>`
//! 3. `~/.config/elm-mirror/config.yaml` (platform config directory)
//! 4. Built-in defaults
//!
//! ```yaml
//! artifacts_root: /srv/elm-archive
//! registry_url: https://package.elm-lang.org
//! git_host: https://github.com
//! elm_command: npx elm
//! command_timeout_seconds: 900
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default registry serving `search.json` and `packages/...`
pub const DEFAULT_REGISTRY_URL: &str = "https://package.elm-lang.org";

/// Default host package repositories are cloned from
pub const DEFAULT_GIT_HOST: &str = "https://github.com";

/// Name of the config file inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Everything a run needs to know, built once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Directory holding every downloaded artifact and mirror
    pub artifacts_root: PathBuf,

    /// Base URL of the package registry
    pub registry_url: String,

    /// Base URL repositories are cloned from (`<git_host>/<author>/<project>.git`)
    pub git_host: String,

    /// Command line used to invoke the Elm CLI, split with shell quoting rules
    pub elm_command: String,

    /// Command line used to invoke git
    pub git_command: String,

    /// Per-request HTTP timeout
    pub http_timeout_seconds: u64,

    /// Per-process timeout for git and elm invocations
    pub command_timeout_seconds: u64,

    /// User-Agent header sent to the registry
    pub user_agent: String,
}

fn default_artifacts_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("artifacts")
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            artifacts_root: default_artifacts_root(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            git_host: DEFAULT_GIT_HOST.to_string(),
            elm_command: "elm".to_string(),
            git_command: "git".to_string(),
            http_timeout_seconds: 60,
            command_timeout_seconds: 600,
            user_agent: concat!("elm-mirror/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl MirrorConfig {
    /// Load configuration from an explicit file, or the default location
    ///
    /// An explicit path must exist. The default location is optional and
    /// falls back to built-in defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::load_from_path(path)
            }
            None => match Self::default_config_path() {
                Some(path) => Self::load_from_path(&path),
                None => {
                    tracing::debug!("No config directory available, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from a specific path, using defaults if it is missing
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_yaml_ng::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            tracing::debug!("Config {} not found, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Platform config file location, without creating anything
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "elm-mirror", "elm-mirror")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .or_else(|| dirs::config_dir().map(|d| d.join("elm-mirror")))
            .map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Reject settings that would make every step fail
    pub fn validate(&self) -> Result<()> {
        for (key, url) in [("registry_url", &self.registry_url), ("git_host", &self.git_host)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{key} must start with http:// or https:// (got '{url}')");
            }
        }

        if self.http_timeout_seconds == 0 {
            anyhow::bail!("http_timeout_seconds must be greater than zero");
        }
        if self.command_timeout_seconds == 0 {
            anyhow::bail!("command_timeout_seconds must be greater than zero");
        }

        for (key, line) in [("elm_command", &self.elm_command), ("git_command", &self.git_command)] {
            let words = shell_words::split(line)
                .with_context(|| format!("{key} is not a valid command line: '{line}'"))?;
            if words.is_empty() {
                anyhow::bail!("{key} must not be empty");
            }
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    /// Serialize to YAML (used by `elm-mirror config`)
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to serialize configuration")
    }
}
