//! Provider traits and the per-resolution memoizing layer.
//!
//! Version listing and manifest loading are the engine's only side
//! effects. Both are issued at most once per key per resolution: the first
//! caller performs the fetch, concurrent callers await the same in-flight
//! result. Cancellation is observed before and during every fetch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use grove_common::{PackageIdentity, PackageManifest};
use semver::Version;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("package '{0}' not found")]
    NotFound(PackageIdentity),

    #[error("failed to fetch version list for '{identity}': {reason}")]
    Fetch {
        identity: PackageIdentity,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone)]
pub enum ManifestError {
    #[error("no manifest for '{identity}' at {version}")]
    NotFound {
        identity: PackageIdentity,
        version: Version,
    },

    #[error("manifest for '{identity}' at {version} is unreadable: {reason}")]
    Unreadable {
        identity: PackageIdentity,
        version: Version,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Lists the versions a package is available at. Branch- and
/// revision-addressed candidates appear as their synthetic versions.
#[async_trait]
pub trait VersionProvider: Send + Sync {
    async fn available_versions(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Vec<Version>, ProviderError>;
}

/// Returns the structured manifest of one package at one concrete version.
#[async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn manifest(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<PackageManifest, ManifestError>;
}

type VersionCell = Arc<OnceCell<Result<Arc<Vec<Version>>, ProviderError>>>;
type ManifestCell = Arc<OnceCell<Result<Arc<PackageManifest>, ManifestError>>>;

/// Memoizing, request-coalescing front for the two providers.
///
/// Owned by one resolution call and discarded with it; never a
/// process-lifetime singleton.
pub struct ProviderCache {
    versions: Arc<dyn VersionProvider>,
    manifests: Arc<dyn ManifestProvider>,
    cancel: CancellationToken,
    version_cells: Mutex<HashMap<PackageIdentity, VersionCell>>,
    manifest_cells: Mutex<HashMap<(PackageIdentity, Version), ManifestCell>>,
}

impl ProviderCache {
    pub fn new(
        versions: Arc<dyn VersionProvider>,
        manifests: Arc<dyn ManifestProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            versions,
            manifests,
            cancel,
            version_cells: Mutex::new(HashMap::new()),
            manifest_cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Version list for `identity`, sorted descending, fetched at most once.
    pub async fn available_versions(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Arc<Vec<Version>>, ProviderError> {
        let cell = {
            let mut cells = self.version_cells.lock().await;
            Arc::clone(cells.entry(identity.clone()).or_default())
        };
        let result = cell
            .get_or_init(|| async {
                debug!("querying available versions of '{identity}'");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(ProviderError::Cancelled),
                    listed = self.versions.available_versions(identity) => listed.map(|mut vs| {
                        vs.sort();
                        vs.reverse();
                        Arc::new(vs)
                    }),
                }
            })
            .await;
        result.clone()
    }

    /// Manifest for `(identity, version)`, fetched at most once.
    pub async fn manifest(
        &self,
        identity: &PackageIdentity,
        version: &Version,
    ) -> Result<Arc<PackageManifest>, ManifestError> {
        let cell = {
            let mut cells = self.manifest_cells.lock().await;
            Arc::clone(
                cells
                    .entry((identity.clone(), version.clone()))
                    .or_default(),
            )
        };
        let result = cell
            .get_or_init(|| async {
                debug!("loading manifest of '{identity}' at {version}");
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(ManifestError::Cancelled),
                    loaded = self.manifests.manifest(identity, version) => loaded.map(Arc::new),
                }
            })
            .await;
        result.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use grove_common::PackageManifest;

    use super::*;

    struct CountingProvider {
        version_calls: AtomicUsize,
        manifest_calls: AtomicUsize,
    }

    #[async_trait]
    impl VersionProvider for CountingProvider {
        async fn available_versions(
            &self,
            _identity: &PackageIdentity,
        ) -> Result<Vec<Version>, ProviderError> {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Version::new(1, 0, 0),
                Version::new(2, 0, 0),
                Version::new(1, 5, 0),
            ])
        }
    }

    #[async_trait]
    impl ManifestProvider for CountingProvider {
        async fn manifest(
            &self,
            identity: &PackageIdentity,
            _version: &Version,
        ) -> Result<PackageManifest, ManifestError> {
            self.manifest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(PackageManifest::new(identity.clone()))
        }
    }

    #[tokio::test]
    async fn version_queries_are_memoized_and_sorted() {
        let inner = Arc::new(CountingProvider {
            version_calls: AtomicUsize::new(0),
            manifest_calls: AtomicUsize::new(0),
        });
        let cache = ProviderCache::new(
            inner.clone(),
            inner.clone(),
            CancellationToken::new(),
        );

        let id = PackageIdentity::new("alpha");
        let first = cache.available_versions(&id).await.unwrap();
        let second = cache.available_versions(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.version_calls.load(Ordering::SeqCst), 1);
        // Descending order, independent of what the provider reported.
        assert_eq!(first[0], Version::new(2, 0, 0));
        assert_eq!(first[2], Version::new(1, 0, 0));
    }

    #[tokio::test]
    async fn manifest_queries_are_memoized_per_version() {
        let inner = Arc::new(CountingProvider {
            version_calls: AtomicUsize::new(0),
            manifest_calls: AtomicUsize::new(0),
        });
        let cache = ProviderCache::new(
            inner.clone(),
            inner.clone(),
            CancellationToken::new(),
        );

        let id = PackageIdentity::new("alpha");
        cache.manifest(&id, &Version::new(1, 0, 0)).await.unwrap();
        cache.manifest(&id, &Version::new(1, 0, 0)).await.unwrap();
        cache.manifest(&id, &Version::new(2, 0, 0)).await.unwrap();
        assert_eq!(inner.manifest_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_the_fetch_point() {
        let inner = Arc::new(CountingProvider {
            version_calls: AtomicUsize::new(0),
            manifest_calls: AtomicUsize::new(0),
        });
        let token = CancellationToken::new();
        token.cancel();
        let cache = ProviderCache::new(inner.clone(), inner.clone(), token);

        let id = PackageIdentity::new("alpha");
        let result = cache.available_versions(&id).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
