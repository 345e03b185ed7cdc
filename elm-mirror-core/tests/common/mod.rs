//! Test helpers for pipeline integration tests
//!
//! Shared through the tests/common/ pattern: an in-memory registry standing in
//! for package.elm-lang.org and a scripted command runner standing in for
//! git and the Elm CLI.

#![allow(dead_code)]

use async_trait::async_trait;
use elm_mirror_core::error::{OperationError, Result};
use elm_mirror_core::fetch::Fetcher;
use elm_mirror_core::process::{CommandOutput, CommandRunner, CommandSpec};
use elm_mirror_core::MirrorConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, Once};

pub const REGISTRY: &str = "https://registry.test";

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Configuration pointing every component at the fakes
pub fn test_config(root: &Path) -> MirrorConfig {
    MirrorConfig {
        artifacts_root: root.to_path_buf(),
        registry_url: REGISTRY.to_string(),
        git_host: "https://git.test".to_string(),
        ..Default::default()
    }
}

/// In-memory registry keyed by path below the registry root
#[derive(Default)]
pub struct FakeRegistry {
    documents: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `<registry>/<path>`
    pub fn serve(&self, path: &str, body: &str) -> &Self {
        self.documents
            .lock()
            .unwrap()
            .insert(format!("{REGISTRY}/{path}"), body.to_string());
        self
    }

    /// Serve a package with the given versions and all its metadata files
    pub fn publish(&self, package: &str, versions: &[&str]) -> &Self {
        let releases: serde_json::Map<String, serde_json::Value> = versions
            .iter()
            .enumerate()
            .map(|(i, v)| (v.to_string(), serde_json::json!(i)))
            .collect();
        self.serve(
            &format!("packages/{package}/releases.json"),
            &serde_json::Value::Object(releases).to_string(),
        );

        for version in versions {
            let base = format!("packages/{package}/{version}");
            self.serve(
                &format!("{base}/elm.json"),
                &format!(r#"{{"name":"{package}","version":"{version}"}}"#),
            );
            self.serve(&format!("{base}/docs.json"), "[]");
            self.serve(&format!("{base}/README.md"), &format!("# {package}"));
        }
        self
    }

    pub fn request_count(&self, path: &str) -> usize {
        let url = format!("{REGISTRY}/{path}");
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| **u == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for FakeRegistry {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| OperationError::Http {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &'static str {
        "fake-registry"
    }
}

/// Behaves like git and elm closely enough for the pipeline:
/// `git clone` creates its target directory, `elm` writes an elm.json
/// into its working directory (and `elm init` fails if one is already there),
/// and failures can be scripted per package.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failing_installs: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `elm install <package>` exit non-zero
    pub fn fail_install_of(&self, package: &str) -> &Self {
        self.failing_installs
            .lock()
            .unwrap()
            .push(package.to_string());
        self
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(CommandSpec::display)
            .collect()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        match (spec.program.as_str(), spec.args.first().map(String::as_str)) {
            ("git", Some("clone")) => {
                let target = spec.args.last().cloned().unwrap_or_default();
                std::fs::create_dir_all(&target).map_err(|source| OperationError::Io {
                    path: target.into(),
                    source,
                })?;
            }
            ("elm", Some("init")) | ("elm", Some("install")) => {
                let dir = spec.current_dir.clone().unwrap_or_default();
                // Like the real CLI, `elm init` refuses to touch an existing project
                if spec.args[0] == "init" && dir.join("elm.json").exists() {
                    return Err(OperationError::CommandFailed {
                        command: spec.display(),
                        code: 1,
                        stderr: "-- EXISTING PROJECT".to_string(),
                    });
                }
                if spec.args[0] == "install"
                    && self
                        .failing_installs
                        .lock()
                        .unwrap()
                        .iter()
                        .any(|p| spec.args.get(1) == Some(p))
                {
                    return Err(OperationError::CommandFailed {
                        command: spec.display(),
                        code: 1,
                        stderr: "-- PROBLEM BUILDING DEPENDENCIES".to_string(),
                    });
                }
                std::fs::write(dir.join("elm.json"), "{}").map_err(|source| {
                    OperationError::Io {
                        path: dir.clone(),
                        source,
                    }
                })?;
            }
            _ => {}
        }

        Ok(CommandOutput::default())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
