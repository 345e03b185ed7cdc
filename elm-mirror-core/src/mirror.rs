//! Source mirror
//!
//! Clones each package's repository next to its artifacts, once. The clone is
//! a bare `--mirror` clone so every branch and tag is archived.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MirrorConfig;
use crate::error::{OperationError, Result};
use crate::outcome::{Outcome, Step};
use crate::process::{CommandRunner, CommandSpec};
use crate::store::ArtifactStore;

/// Directory name of a package's mirror: `elm/core` -> `elm~core.git`
pub fn mirror_dir_name(package: &str) -> String {
    format!("{}.git", package.replace('/', "~"))
}

/// Clones package repositories into the artifact store
pub struct SourceMirror {
    store: ArtifactStore,
    runner: Arc<dyn CommandRunner>,
    git_command: String,
    git_host: String,
    timeout: Duration,
}

impl SourceMirror {
    pub fn new(config: &MirrorConfig, store: ArtifactStore, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            store,
            runner,
            git_command: config.git_command.clone(),
            git_host: config.git_host.trim_end_matches('/').to_string(),
            timeout: config.command_timeout(),
        }
    }

    /// Local mirror location: `packages/<name>/<name with ~>.git`
    pub fn mirror_path(&self, package: &str) -> PathBuf {
        self.store
            .path(&["packages", package, mirror_dir_name(package).as_str()])
    }

    /// Remote repository the package is cloned from
    pub fn remote_url(&self, package: &str) -> String {
        format!("{}/{}.git", self.git_host, package)
    }

    /// Clone the package's repository unless a mirror already exists
    pub async fn mirror(&self, package: &str) -> Outcome {
        let path = self.mirror_path(package);

        if path.exists() {
            return Outcome::skipped(Step::Clone, package, "already mirrored");
        }

        match self.clone_into(package, path).await {
            Ok(()) => Outcome::ok(Step::Clone, package),
            Err(e) => Outcome::failed(Step::Clone, package, &e),
        }
    }

    /// Clone into a `.<dir>.part` sibling and rename it into place
    ///
    /// An interrupted or timed-out clone never leaves a directory at the
    /// final path, so the next run retries instead of skipping.
    async fn clone_into(&self, package: &str, path: PathBuf) -> Result<()> {
        let parent = path.parent().ok_or_else(|| OperationError::InvalidArgument {
            detail: format!("mirror path has no parent: {}", path.display()),
        })?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OperationError::io(parent, e))?;

        let staging = parent.join(format!(".{}.part", mirror_dir_name(package)));
        remove_stale(&staging).await?;

        let spec = CommandSpec::from_command_line(&self.git_command, self.timeout)?
            .arg("clone")
            .arg("--mirror")
            .arg("--quiet")
            .arg(self.remote_url(package))
            .arg(staging.to_string_lossy());

        debug!("Mirroring {} into {}", package, path.display());
        if let Err(e) = self.runner.run(&spec).await {
            if let Err(cleanup) = remove_stale(&staging).await {
                warn!("Failed to remove partial clone: {}", cleanup.chain());
            }
            return Err(e);
        }

        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| OperationError::io(&path, e))
    }
}

/// Remove a leftover staging directory from an earlier attempt
async fn remove_stale(staging: &Path) -> Result<()> {
    if staging.exists() {
        tokio::fs::remove_dir_all(staging)
            .await
            .map_err(|e| OperationError::io(staging, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use crate::process::MockRunner;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn mirror_with(temp_dir: &TempDir, runner: Arc<MockRunner>) -> SourceMirror {
        let config = MirrorConfig {
            artifacts_root: temp_dir.path().to_path_buf(),
            git_host: "https://git.test/".to_string(),
            ..Default::default()
        };
        let store = ArtifactStore::new(
            temp_dir.path(),
            &config.registry_url,
            Arc::new(MockFetcher::new(&[])),
        );
        SourceMirror::new(&config, store, runner)
    }

    #[test]
    fn test_mirror_dir_name() {
        assert_eq!(mirror_dir_name("elm/core"), "elm~core.git");
        assert_eq!(mirror_dir_name("noslash"), "noslash.git");
    }

    #[test]
    fn test_mirror_path_and_remote() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = mirror_with(&temp_dir, Arc::new(MockRunner::new()));

        assert_eq!(
            mirror.mirror_path("elm/core"),
            temp_dir.path().join("packages/elm/core/elm~core.git")
        );
        assert_eq!(mirror.remote_url("elm/core"), "https://git.test/elm/core.git");
    }

    #[tokio::test]
    async fn test_clone_once() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner {
            create_last_arg: true,
            ..MockRunner::new()
        });
        let mirror = mirror_with(&temp_dir, runner.clone());

        let first = mirror.mirror("a/pkg").await;
        assert!(first.is_ok(), "{first}");
        let second = mirror.mirror("a/pkg").await;
        assert!(second.is_skipped(), "{second}");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(
            &calls[0].args[..4],
            &["clone", "--mirror", "--quiet", "https://git.test/a/pkg.git"]
        );
        assert!(calls[0].args[4].ends_with(".a~pkg.git.part"));
        assert!(mirror.mirror_path("a/pkg").is_dir());
        assert!(!temp_dir.path().join("packages/a/pkg/.a~pkg.git.part").exists());
    }

    #[tokio::test]
    async fn test_clone_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(MockRunner {
            fail_matching: Some("clone".to_string()),
            ..MockRunner::new()
        });
        let mirror = mirror_with(&temp_dir, runner);

        let outcome = mirror.mirror("a/pkg").await;
        assert!(outcome.is_failed());
        assert!(!mirror.mirror_path("a/pkg").exists());
    }

    #[tokio::test]
    async fn test_interrupted_clone_is_retried() {
        let temp_dir = TempDir::new().unwrap();
        // Creates the target, then fails: a clone killed halfway through
        let runner = Arc::new(MockRunner {
            create_last_arg: true,
            fail_matching: Some("clone".to_string()),
            ..MockRunner::new()
        });
        let mirror = mirror_with(&temp_dir, runner.clone());

        let first = mirror.mirror("a/pkg").await;
        assert!(first.is_failed(), "{first}");
        assert!(!mirror.mirror_path("a/pkg").exists());
        assert!(!temp_dir.path().join("packages/a/pkg/.a~pkg.git.part").exists());

        let second = mirror.mirror("a/pkg").await;
        assert!(second.is_failed(), "{second}");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_staging_dir_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("packages/a/pkg/.a~pkg.git.part");
        std::fs::create_dir_all(staging.join("objects")).unwrap();
        std::fs::write(staging.join("objects/leftover"), "x").unwrap();

        let runner = Arc::new(MockRunner {
            create_last_arg: true,
            ..MockRunner::new()
        });
        let mirror = mirror_with(&temp_dir, runner);

        assert!(mirror.mirror("a/pkg").await.is_ok());
        let path = mirror.mirror_path("a/pkg");
        assert!(path.is_dir());
        assert!(!path.join("objects/leftover").exists());
        assert!(!staging.exists());
    }
}
