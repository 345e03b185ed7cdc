//! elm-mirror subcommands
//!
//! Thin wrappers over the core pipeline: build the components from
//! configuration, run them, and render the results for a terminal.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use elm_mirror_core::aggregate::{aggregate, to_elm_json};
use elm_mirror_core::fetch::HttpFetcher;
use elm_mirror_core::{
    ArtifactStore, MirrorConfig, PackageSummary, Pipeline, RegistryClient, RunOptions, RunReport,
};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Archive the whole registry and probe every package with `elm install`
    Run {
        /// Only process this package (repeatable)
        #[clap(long, value_name = "NAME")]
        only: Vec<String>,

        /// Do not clone git mirrors
        #[clap(long)]
        skip_mirror: bool,

        /// Do not run the install probe
        #[clap(long)]
        skip_install: bool,

        /// Download metadata but only log the git and elm commands
        #[clap(long)]
        dry_run: bool,

        /// Exit with status 1 if any step failed
        #[clap(long)]
        fail_on_error: bool,
    },

    /// Fetch and list the package index
    Index {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// List the published versions of one package
    Releases {
        /// Package name, e.g. elm/core
        name: String,
    },

    /// Write an elm.json depending on every indexed package
    Aggregate {
        /// Application elm.json to start from
        #[clap(long)]
        template: PathBuf,

        /// Where to write the result
        #[clap(long)]
        output: PathBuf,
    },

    /// Print the effective configuration as YAML
    Config,
}

impl Command {
    pub async fn execute(self, config: MirrorConfig) -> Result<()> {
        match self {
            Command::Run {
                only,
                skip_mirror,
                skip_install,
                dry_run,
                fail_on_error,
            } => {
                let options = RunOptions {
                    only,
                    skip_mirror,
                    skip_install,
                };
                run(&config, options, dry_run, fail_on_error).await
            }
            Command::Index { json } => index(&config, json).await,
            Command::Releases { name } => releases(&config, &name).await,
            Command::Aggregate { template, output } => {
                aggregate_command(&config, &template, &output).await
            }
            Command::Config => {
                print!("{}", config.to_yaml()?);
                Ok(())
            }
        }
    }
}

fn registry_client(config: &MirrorConfig) -> Result<RegistryClient> {
    let fetcher = HttpFetcher::new(config).context("Failed to create HTTP client")?;
    let store = ArtifactStore::new(&config.artifacts_root, &config.registry_url, Arc::new(fetcher));
    Ok(RegistryClient::new(store))
}

async fn run(
    config: &MirrorConfig,
    options: RunOptions,
    dry_run: bool,
    fail_on_error: bool,
) -> Result<()> {
    std::fs::create_dir_all(&config.artifacts_root).with_context(|| {
        format!(
            "Failed to create artifacts root {}",
            config.artifacts_root.display()
        )
    })?;

    let pipeline = Pipeline::from_config(config, dry_run)
        .context("Failed to set up pipeline")?
        .with_options(options);

    let report = pipeline.run_with(|outcome| println!("{outcome}")).await;

    println!();
    println!("{}", summary_table(&report));

    if !report.failures.is_empty() {
        println!("\nFailures:");
        for failure in &report.failures {
            println!("  {failure}");
        }
    }

    if fail_on_error && report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Packages")]
    packages: usize,
    #[tabled(rename = "Ok")]
    ok: usize,
    #[tabled(rename = "Skipped")]
    skipped: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Abandoned")]
    abandoned: usize,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
}

fn summary_table(report: &RunReport) -> String {
    let elapsed = report
        .elapsed()
        .map(|d| format!("{}s", d.num_seconds()))
        .unwrap_or_else(|| "-".to_string());

    let rows = vec![SummaryRow {
        packages: report.packages,
        ok: report.ok,
        skipped: report.skipped,
        failed: report.failed,
        abandoned: report.abandoned.len(),
        elapsed,
    }];

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "License")]
    license: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

impl From<&PackageSummary> for PackageRow {
    fn from(package: &PackageSummary) -> Self {
        let summary = package.summary.clone().unwrap_or_default();
        Self {
            name: package.name.clone(),
            version: package.version.clone().unwrap_or_else(|| "-".to_string()),
            license: package.license.clone().unwrap_or_else(|| "-".to_string()),
            summary: if summary.chars().count() > 60 {
                format!("{}...", summary.chars().take(57).collect::<String>())
            } else {
                summary
            },
        }
    }
}

async fn index(config: &MirrorConfig, json: bool) -> Result<()> {
    let packages = registry_client(config)?
        .try_fetch_package_index()
        .await
        .with_context(|| format!("Failed to fetch package index from {}", config.registry_url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }

    if packages.is_empty() {
        println!("No packages found.");
        return Ok(());
    }

    let rows: Vec<PackageRow> = packages.iter().map(PackageRow::from).collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    println!("\n{} packages", packages.len());
    Ok(())
}

async fn releases(config: &MirrorConfig, name: &str) -> Result<()> {
    let versions = registry_client(config)?
        .fetch_releases(name)
        .await
        .with_context(|| format!("Failed to fetch releases of {name}"))?;

    for version in &versions {
        println!("{version}");
    }
    Ok(())
}

async fn aggregate_command(
    config: &MirrorConfig,
    template: &std::path::Path,
    output: &std::path::Path,
) -> Result<()> {
    let text = std::fs::read_to_string(template)
        .with_context(|| format!("Failed to read template {}", template.display()))?;
    let template_json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Template {} is not valid JSON", template.display()))?;

    let packages = registry_client(config)?
        .try_fetch_package_index()
        .await
        .with_context(|| format!("Failed to fetch package index from {}", config.registry_url))?;

    let manifest = aggregate(template_json, &packages).context("Failed to build manifest")?;
    std::fs::write(output, to_elm_json(&manifest)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "✅ Wrote {} with {} direct dependencies",
        output.display(),
        manifest["dependencies"]["direct"]
            .as_object()
            .map(|direct| direct.len())
            .unwrap_or(0)
    );
    Ok(())
}
