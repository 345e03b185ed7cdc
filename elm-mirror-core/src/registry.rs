//! Registry client
//!
//! Fetches the package index (`search.json`) and per-package release lists
//! (`packages/<name>/releases.json`). Both documents change upstream, so both
//! are re-fetched on every call and never served from the artifact store.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

use crate::error::{OperationError, Result};
use crate::store::ArtifactStore;

/// Index document name at the registry root
pub const INDEX_DOCUMENT: &str = "search.json";

/// Release list document name inside each package directory
pub const RELEASES_DOCUMENT: &str = "releases.json";

/// One record of the registry index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    /// `author/project`
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Latest published version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PackageSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: None,
            license: None,
            version: None,
        }
    }
}

/// Client for the registry's index and release documents
#[derive(Clone)]
pub struct RegistryClient {
    store: ArtifactStore,
}

impl RegistryClient {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Fetch every published package, sorted by name
    ///
    /// A failed fetch or parse is logged and yields an empty list: a run with
    /// a broken index does nothing rather than crashing. Library callers that
    /// only want the list use this form; the pipeline calls
    /// [`try_fetch_package_index`](Self::try_fetch_package_index) so the
    /// failure also lands in its report.
    pub async fn fetch_package_index(&self) -> Vec<PackageSummary> {
        match self.try_fetch_package_index().await {
            Ok(packages) => {
                debug!("Fetched index: {} packages", packages.len());
                packages
            }
            Err(e) => {
                error!("Failed to fetch package index: {}", e.chain());
                Vec::new()
            }
        }
    }

    /// Fetch the index, propagating failures
    pub async fn try_fetch_package_index(&self) -> Result<Vec<PackageSummary>> {
        let url = format!("{}/{}", self.store.base_url(), INDEX_DOCUMENT);
        let bytes = self.store.fetcher().get(&url).await?;

        // Archiving the index is best effort; parsing is what matters
        if let Err(e) = self.store.write(&[INDEX_DOCUMENT], &bytes).await {
            warn!("Failed to archive package index: {}", e.chain());
        }

        parse_package_index(&bytes)
    }

    /// Fetch the published versions of one package, oldest first
    ///
    /// Failure here is fatal for the package: without versions there is
    /// nothing to download.
    pub async fn fetch_releases(&self, package: &str) -> Result<Vec<String>> {
        validate_package_name(package)?;
        let bytes = self
            .store
            .refresh(&["packages", package, RELEASES_DOCUMENT])
            .await?;
        parse_releases(&bytes, package)
    }
}

/// Parse `search.json` and sort by package name
///
/// Entries whose name is not a valid `author/project` are dropped with a
/// warning; names become directories under the artifacts root.
pub fn parse_package_index(bytes: &[u8]) -> Result<Vec<PackageSummary>> {
    let packages: Vec<PackageSummary> =
        serde_json::from_slice(bytes).map_err(|source| OperationError::Parse {
            what: "package index".to_string(),
            source,
        })?;

    let mut packages: Vec<PackageSummary> = packages
        .into_iter()
        .filter(|package| match validate_package_name(&package.name) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring index entry: {}", e);
                false
            }
        })
        .collect();

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// Check a package name is exactly `author/project`
///
/// Each part must be non-empty, use only ASCII letters, digits, `-`, `_`
/// and `.`, and not start with `.`.
pub fn validate_package_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| OperationError::InvalidArgument {
        detail: format!("package name '{name}' {reason}"),
    };

    let parts: Vec<&str> = name.split('/').collect();
    if parts.len() != 2 {
        return Err(invalid("must have the form author/project"));
    }

    for part in parts {
        if part.is_empty() {
            return Err(invalid("has an empty segment"));
        }
        if part.starts_with('.') {
            return Err(invalid("has a segment starting with '.'"));
        }
        if !part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("contains characters other than letters, digits, '-', '_' and '.'"));
        }
    }

    Ok(())
}

/// Parse a `releases.json` map of version to publish time
///
/// Only the keys are kept; the publish times are never used.
pub fn parse_releases(bytes: &[u8], package: &str) -> Result<Vec<String>> {
    let releases: BTreeMap<String, IgnoredAny> =
        serde_json::from_slice(bytes).map_err(|source| OperationError::Parse {
            what: format!("release list of {package}"),
            source,
        })?;

    let mut versions: Vec<String> = releases.into_keys().collect();
    // Versions become directory names, so anything but MAJOR.MINOR.PATCH is refused
    if let Some((version, e)) = versions
        .iter()
        .find_map(|v| semver::Version::parse(v).err().map(|e| (v, e)))
    {
        return Err(OperationError::InvalidArgument {
            detail: format!("release list of {package} has invalid version '{version}': {e}"),
        });
    }
    sort_versions(&mut versions);
    Ok(versions)
}

/// Sort versions oldest first, by semver where both sides parse
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| {
        match (semver::Version::parse(a), semver::Version::parse(b)) {
            (Ok(va), Ok(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        }
    });
}
