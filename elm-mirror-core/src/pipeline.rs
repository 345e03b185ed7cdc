//! Pipeline driver
//!
//! Runs every package through the same sequence, strictly one after another:
//!
//! ```text
//! index ─► for each package (sorted by name):
//!            releases ─► metadata downloads ─► mirror ─► install probe ─► cleanup
//! ```
//!
//! ## Failure policy
//!
//! | step              | on failure                                   |
//! |-------------------|----------------------------------------------|
//! | index             | reported, run processes no packages          |
//! | releases          | package abandoned, straight to cleanup       |
//! | metadata download | reported, continue                           |
//! | mirror            | reported, continue                           |
//! | install probe     | reported, continue                           |
//! | cleanup           | reported, continue                           |

use std::sync::Arc;
use tracing::{debug, info};

use crate::cleanup;
use crate::config::MirrorConfig;
use crate::error::Result;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::install::InstallRunner;
use crate::mirror::SourceMirror;
use crate::outcome::{Outcome, RunReport, Step};
use crate::process::{CommandRunner, DryRunRunner, SystemRunner};
use crate::registry::{PackageSummary, RegistryClient, INDEX_DOCUMENT};
use crate::store::ArtifactStore;

/// Metadata files downloaded for every release
pub const METADATA_FILES: [&str; 3] = ["elm.json", "docs.json", "README.md"];

/// Switches narrowing what a run does
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only process these packages (all packages when empty)
    pub only: Vec<String>,
    pub skip_mirror: bool,
    pub skip_install: bool,
}

impl RunOptions {
    fn selects(&self, package: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|name| name == package)
    }
}

/// The whole archival run, built once from configuration
pub struct Pipeline {
    store: ArtifactStore,
    registry: RegistryClient,
    source_mirror: SourceMirror,
    installer: InstallRunner,
    options: RunOptions,
}

impl Pipeline {
    /// Assemble a pipeline around explicit fetcher and runner implementations
    pub fn new(
        config: &MirrorConfig,
        fetcher: Arc<dyn Fetcher>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let store = ArtifactStore::new(&config.artifacts_root, &config.registry_url, fetcher);

        Self {
            registry: RegistryClient::new(store.clone()),
            source_mirror: SourceMirror::new(config, store.clone(), runner.clone()),
            installer: InstallRunner::new(config, store.clone(), runner),
            store,
            options: RunOptions::default(),
        }
    }

    /// Assemble the production pipeline: HTTP fetcher and real processes
    ///
    /// With `dry_run` set, commands are logged instead of executed.
    pub fn from_config(config: &MirrorConfig, dry_run: bool) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config)?);
        let runner: Arc<dyn CommandRunner> = if dry_run {
            Arc::new(DryRunRunner)
        } else {
            Arc::new(SystemRunner)
        };

        debug!(
            "Pipeline using fetcher '{}' and runner '{}'",
            fetcher.name(),
            runner.name()
        );

        Ok(Self::new(config, fetcher, runner))
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Run the pipeline, logging outcomes only
    pub async fn run(&self) -> RunReport {
        self.run_with(|_| {}).await
    }

    /// Run the pipeline, handing every outcome to `observe` as it happens
    pub async fn run_with<F>(&self, observe: F) -> RunReport
    where
        F: FnMut(&Outcome),
    {
        let mut recorder = Recorder {
            report: RunReport::new(),
            observe,
        };

        let index_url = format!("{}/{}", self.store.base_url(), INDEX_DOCUMENT);
        let packages: Vec<PackageSummary> = match self.registry.try_fetch_package_index().await {
            Ok(packages) => {
                recorder.emit(Outcome::ok(
                    Step::Index,
                    format!("{index_url} ({} packages)", packages.len()),
                ));
                packages
                    .into_iter()
                    .filter(|package| self.options.selects(&package.name))
                    .collect()
            }
            Err(e) => {
                // Degrade to an empty run rather than aborting
                recorder.emit(Outcome::failed(Step::Index, index_url, &e));
                Vec::new()
            }
        };

        info!("Processing {} packages", packages.len());

        for package in &packages {
            recorder.report.packages += 1;
            self.process_package(&package.name, &mut recorder).await;
        }

        recorder.report.finish();
        info!(
            "Run complete: {} ok, {} skipped, {} failed",
            recorder.report.ok, recorder.report.skipped, recorder.report.failed
        );
        recorder.report
    }

    async fn process_package<F>(&self, package: &str, recorder: &mut Recorder<F>)
    where
        F: FnMut(&Outcome),
    {
        info!("Processing package - {}", package);

        match self.registry.fetch_releases(package).await {
            Ok(versions) => {
                recorder.emit(Outcome::ok(
                    Step::Releases,
                    format!("{package} ({} versions)", versions.len()),
                ));

                for version in &versions {
                    for file in METADATA_FILES {
                        let outcome = self
                            .store
                            .download_if_missing(&["packages", package, version.as_str(), file])
                            .await;
                        recorder.emit(outcome);
                    }
                }

                if !self.options.skip_mirror {
                    recorder.emit(self.source_mirror.mirror(package).await);
                }

                if !self.options.skip_install {
                    recorder.emit(self.installer.install_and_probe(package).await);
                }
            }
            Err(e) => {
                recorder.emit(Outcome::failed(Step::Releases, package, &e));
                recorder.report.abandon(package);
            }
        }

        // Unconditional: a failed probe or abandoned package must not leak its scratch folder
        recorder.emit(cleanup::remove(&self.installer.scratch_path(package)).await);
    }
}

/// Routes each outcome to tracing, the observer and the report
struct Recorder<F> {
    report: RunReport,
    observe: F,
}

impl<F: FnMut(&Outcome)> Recorder<F> {
    fn emit(&mut self, outcome: Outcome) {
        outcome.log();
        (self.observe)(&outcome);
        self.report.record(&outcome);
    }
}
