//! Filesystem-backed version and manifest providers.
//!
//! The registry directory holds one subdirectory per package (identity
//! with '/' encoded as "__"), containing one JSON manifest per published
//! version named `<version>.json`. The set of files doubles as the
//! version listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use grove_common::{PackageIdentity, PackageManifest};
use grove_core::{ManifestError, ManifestProvider, ProviderError, VersionProvider};
use semver::Version;
use tracing::{debug, warn};

pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.root.join(identity.as_str().replace('/', "__"))
    }

    fn manifest_path(&self, identity: &PackageIdentity, version: &Version) -> PathBuf {
        self.package_dir(identity).join(format!("{version}.json"))
    }
}

#[async_trait]
impl VersionProvider for FsRegistry {
    async fn available_versions(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Vec<Version>, ProviderError> {
        let dir = self.package_dir(identity);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(identity.clone()));
            }
            Err(e) => {
                return Err(ProviderError::Fetch {
                    identity: identity.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let mut versions = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| ProviderError::Fetch {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;
            let Some(entry) = entry else { break };
            let name = entry.file_name();
            let path = Path::new(&name);
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Version::parse(stem) {
                Ok(version) => versions.push(version),
                Err(e) => warn!(
                    "skipping '{}' in {}: {e}",
                    name.to_string_lossy(),
                    dir.display()
                ),
            }
        }
        debug!("registry lists {} versions of '{identity}'", versions.len());
        Ok(versions)
    }
}

#[async_trait]
impl ManifestProvider for FsRegistry {
    async fn manifest(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<PackageManifest, ManifestError> {
        let path = self.manifest_path(identity, version);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    identity: identity.clone(),
                    version: version.clone(),
                });
            }
            Err(e) => {
                return Err(ManifestError::Unreadable {
                    identity: identity.clone(),
                    version: version.clone(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&text).map_err(|e| ManifestError::Unreadable {
            identity: identity.clone(),
            version: version.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(root: &Path, identity: &str, version: &str) {
        let dir = root.join(identity.replace('/', "__"));
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = PackageManifest::new(PackageIdentity::new(identity));
        std::fs::write(
            dir.join(format!("{version}.json")),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn lists_published_versions() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "widget", "1.0.0");
        publish(dir.path(), "widget", "1.2.0");
        // Non-manifest files are ignored.
        std::fs::write(dir.path().join("widget").join("README.md"), "hi").unwrap();

        let registry = FsRegistry::new(dir.path());
        let mut versions = registry
            .available_versions(&PackageIdentity::new("widget"))
            .await
            .unwrap();
        versions.sort();
        assert_eq!(versions, vec![Version::new(1, 0, 0), Version::new(1, 2, 0)]);
    }

    #[tokio::test]
    async fn unknown_package_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FsRegistry::new(dir.path());
        let err = registry
            .available_versions(&PackageIdentity::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn loads_manifests_and_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        publish(dir.path(), "example.com/widget", "1.0.0");
        std::fs::write(
            dir.path().join("example.com__widget").join("2.0.0.json"),
            "not json",
        )
        .unwrap();

        let registry = FsRegistry::new(dir.path());
        let identity = PackageIdentity::new("example.com/widget");

        let manifest = registry
            .manifest(&identity, &Version::new(1, 0, 0))
            .await
            .unwrap();
        assert_eq!(manifest.identity, identity);

        let err = registry
            .manifest(&identity, &Version::new(2, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::Unreadable { .. }));

        let err = registry
            .manifest(&identity, &Version::new(3, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }
}
