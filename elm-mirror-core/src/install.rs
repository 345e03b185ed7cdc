//! Install probe
//!
//! Checks that a package installs with the standard Elm tooling: in a scratch
//! folder, run `elm init` and then `elm install <package>`. Nothing the
//! commands print is kept; only success or failure matters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{OperationError, Result};
use crate::outcome::{Outcome, Step};
use crate::process::{CommandRunner, CommandSpec};
use crate::store::ArtifactStore;

/// Scratch folder name inside each package directory
pub const SCRATCH_DIR: &str = "@install";

/// Answer to the Elm CLI's `[Y/n]` confirmation prompt
///
/// `elm init` and `elm install` each ask exactly once and have no
/// non-interactive flag.
const CONFIRM: &str = "y\n";

/// Runs the two-step install probe in a per-package scratch folder
pub struct InstallRunner {
    store: ArtifactStore,
    runner: Arc<dyn CommandRunner>,
    elm_command: String,
    timeout: Duration,
}

impl InstallRunner {
    pub fn new(config: &MirrorConfig, store: ArtifactStore, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            store,
            runner,
            elm_command: config.elm_command.clone(),
            timeout: config.command_timeout(),
        }
    }

    /// `packages/<name>/@install`
    pub fn scratch_path(&self, package: &str) -> PathBuf {
        self.store.path(&["packages", package, SCRATCH_DIR])
    }

    /// Run `elm init` and `elm install <package>` in a fresh scratch folder
    ///
    /// The folder is left in place; removing it is the caller's job so it
    /// happens whether or not the probe succeeded.
    pub async fn install_and_probe(&self, package: &str) -> Outcome {
        let scratch = self.scratch_path(package);

        match self.probe(package, &scratch).await {
            Ok(()) => Outcome::ok(Step::Install, package),
            Err(e) => Outcome::failed(Step::Install, package, &e),
        }
    }

    async fn probe(&self, package: &str, scratch: &Path) -> Result<()> {
        // A folder left by an interrupted run still holds its elm.json, which
        // makes `elm init` refuse to run
        if scratch.exists() {
            debug!("Removing stale scratch folder {}", scratch.display());
            tokio::fs::remove_dir_all(scratch)
                .await
                .map_err(|e| OperationError::io(scratch, e))?;
        }

        tokio::fs::create_dir_all(scratch)
            .await
            .map_err(|e| OperationError::io(scratch, e))?;

        self.elm(scratch, &["init"]).await?;
        self.elm(scratch, &["install", package]).await?;

        debug!("{} installs cleanly", package);
        Ok(())
    }

    async fn elm(&self, scratch: &Path, args: &[&str]) -> Result<()> {
        let spec = args
            .iter()
            .fold(
                CommandSpec::from_command_line(&self.elm_command, self.timeout)?,
                |spec, arg| spec.arg(*arg),
            )
            .current_dir(scratch)
            .stdin(CONFIRM);

        self.runner.run(&spec).await?;
        Ok(())
    }
}
