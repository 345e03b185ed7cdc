//! Artifact store
//!
//! A directory tree mirroring the registry's URL layout. The store answers
//! "is this artifact already here" and "fetch this artifact to disk", and
//! never overwrites a file unless asked to refresh it.
//!
//! ```text
//! <artifacts_root>/
//!   search.json
//!   packages/<author>/<project>/
//!     releases.json
//!     <version>/{elm.json, docs.json, README.md}
//!     <author>~<project>.git/
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{OperationError, Result};
use crate::fetch::Fetcher;
use crate::outcome::{Outcome, Step};

/// Filesystem cache keyed by registry path segments
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            fetcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Local path for the given segments
    ///
    /// A package name such as `elm/core` is a single segment that expands to
    /// two directories.
    pub fn path(&self, segments: &[&str]) -> PathBuf {
        segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Remote URL for the given segments
    ///
    /// Every artifact lives at least one directory below the registry root,
    /// so fewer than two segments is rejected.
    pub fn url(&self, segments: &[&str]) -> Result<String> {
        if segments.len() < 2 {
            return Err(OperationError::InvalidArgument {
                detail: format!(
                    "artifact URL needs at least two path segments, got {:?}",
                    segments
                ),
            });
        }

        Ok(format!("{}/{}", self.base_url, segments.join("/")))
    }

    /// Download an artifact unless it already exists locally
    pub async fn download_if_missing(&self, segments: &[&str]) -> Outcome {
        let path = self.path(segments);
        let subject = self.subject(&path);

        if path.exists() {
            return Outcome::skipped(Step::Download, subject, "already present");
        }

        match self.fetch_to_disk(segments, &path).await {
            Ok(_) => Outcome::ok(Step::Download, subject),
            Err(e) => Outcome::failed(Step::Download, subject, &e),
        }
    }

    /// Download an artifact, replacing any existing copy
    ///
    /// Outcome-reporting form for library callers. The pipeline refreshes
    /// release lists through [`refresh`](Self::refresh) instead, because it
    /// needs the bytes and treats a failure as fatal for the package.
    pub async fn download_forcibly(&self, segments: &[&str]) -> Outcome {
        let path = self.path(segments);
        let subject = self.subject(&path);

        match self.refresh(segments).await {
            Ok(_) => Outcome::ok(Step::Refresh, subject),
            Err(e) => Outcome::failed(Step::Refresh, subject, &e),
        }
    }

    /// Fetch and overwrite an artifact, returning the fetched bytes
    ///
    /// This is the typed form of [`download_forcibly`](Self::download_forcibly)
    /// for callers that treat a failure as fatal and need the content.
    pub async fn refresh(&self, segments: &[&str]) -> Result<Vec<u8>> {
        let path = self.path(segments);
        self.fetch_to_disk(segments, &path).await
    }

    /// Atomically write bytes to the artifact at `segments`
    pub async fn write(&self, segments: &[&str], bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(segments);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    async fn fetch_to_disk(&self, segments: &[&str], path: &Path) -> Result<Vec<u8>> {
        let url = self.url(segments)?;
        let bytes = self.fetcher.get(&url).await?;
        write_atomic(path, &bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(bytes)
    }

    /// Path relative to the root, for compact console output
    fn subject(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Write through a sibling temp file so a partial download is never mistaken
/// for a complete artifact on the next run
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| OperationError::InvalidArgument {
        detail: format!("artifact path has no parent: {}", path.display()),
    })?;

    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| OperationError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{file_name}.part"));

    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|e| OperationError::io(&temp_path, e))?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(OperationError::io(path, e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MockFetcher;
    use crate::outcome::Status;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const BASE: &str = "https://registry.test";

    fn store_with(temp_dir: &TempDir, fetcher: Arc<MockFetcher>) -> ArtifactStore {
        ArtifactStore::new(temp_dir.path(), &format!("{BASE}/"), fetcher)
    }

    #[test]
    fn test_path_expands_package_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));

        let path = store.path(&["packages", "elm/core", "1.0.5", "elm.json"]);
        assert_eq!(
            path,
            temp_dir
                .path()
                .join("packages")
                .join("elm")
                .join("core")
                .join("1.0.5")
                .join("elm.json")
        );
    }

    #[test]
    fn test_url_joins_segments() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));

        assert_eq!(
            store
                .url(&["packages", "elm/core", "releases.json"])
                .unwrap(),
            "https://registry.test/packages/elm/core/releases.json"
        );
    }

    #[test]
    fn test_url_requires_two_segments() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));

        assert!(matches!(
            store.url(&["search.json"]),
            Err(OperationError::InvalidArgument { .. })
        ));
        assert!(matches!(
            store.url(&[]),
            Err(OperationError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_if_missing_fetches_once() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://registry.test/packages/a/pkg/1.0.0/elm.json";
        let fetcher = Arc::new(MockFetcher::new(&[(url, "first")]));
        let store = store_with(&temp_dir, fetcher.clone());
        let segments = ["packages", "a/pkg", "1.0.0", "elm.json"];

        let first = store.download_if_missing(&segments).await;
        assert!(first.is_ok(), "{first}");

        fetcher.serve(url, "second");
        let second = store.download_if_missing(&segments).await;
        assert!(second.is_skipped(), "{second}");

        assert_eq!(fetcher.request_count(url), 1);
        assert_eq!(
            std::fs::read_to_string(store.path(&segments)).unwrap(),
            "first"
        );
    }

    #[tokio::test]
    async fn test_download_forcibly_always_fetches() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://registry.test/packages/a/pkg/releases.json";
        let fetcher = Arc::new(MockFetcher::new(&[(url, r#"{"1.0.0":0}"#)]));
        let store = store_with(&temp_dir, fetcher.clone());
        let segments = ["packages", "a/pkg", "releases.json"];

        assert!(store.download_forcibly(&segments).await.is_ok());
        fetcher.serve(url, r#"{"1.0.0":0,"1.1.0":1}"#);
        let second = store.download_forcibly(&segments).await;
        assert_eq!(second.step, Step::Refresh);
        assert!(second.is_ok());

        assert_eq!(fetcher.request_count(url), 2);
        assert_eq!(
            std::fs::read_to_string(store.path(&segments)).unwrap(),
            r#"{"1.0.0":0,"1.1.0":1}"#
        );
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));
        let segments = ["packages", "a/pkg", "1.0.0", "docs.json"];

        let outcome = store.download_if_missing(&segments).await;
        match &outcome.status {
            Status::Failed(cause) => assert!(cause.contains("HTTP 404")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(outcome.subject, "packages/a/pkg/1.0.0/docs.json");
        assert!(!store.path(&segments).exists());
    }

    #[tokio::test]
    async fn test_invalid_segments_become_failed_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));

        let outcome = store.download_forcibly(&["search.json"]).await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_write_replaces_and_cleans_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_with(&temp_dir, Arc::new(MockFetcher::new(&[])));

        store.write(&["search.json"], b"[]").await.unwrap();
        let path = store.write(&["search.json"], b"[{}]").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[{}]");
        assert!(!temp_dir.path().join(".search.json.part").exists());
    }
}
