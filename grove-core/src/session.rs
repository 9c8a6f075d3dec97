//! The resolution entry point: reconcile the lockfile, solve if needed,
//! build the graph, then persist. The ordering matters: an error at any
//! stage leaves the previous lockfile untouched.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use grove_common::{DeclaredDependency, PackageIdentity, PackageManifest, Platform};
use semver::Version;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::graph::{GraphBuilder, GraphError, PackageGraph};
use crate::lockfile::{FastPathResult, Lockfile, LockfileError, LockfileManager};
use crate::provider::{ManifestProvider, ProviderCache, VersionProvider};
use crate::resolver::{ResolutionError, Resolver, Solution};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Lockfile(#[from] LockfileError),
}

/// Everything a successful resolution produces.
#[derive(Debug)]
pub struct Outcome {
    pub solution: Solution,
    pub graph: PackageGraph,
    /// True when the lockfile fast path held and the solver never ran.
    pub reused_lockfile: bool,
}

/// One resolution session: providers, host platform and lockfile path,
/// shared by however many `resolve` calls the caller makes. Each call
/// builds its own memoization cache, so providers are re-queried across
/// calls but never within one.
pub struct Session {
    versions: Arc<dyn VersionProvider>,
    manifests: Arc<dyn ManifestProvider>,
    cancel: CancellationToken,
    host: Platform,
    lockfile: LockfileManager,
}

impl Session {
    pub fn new(
        versions: Arc<dyn VersionProvider>,
        manifests: Arc<dyn ManifestProvider>,
        lockfile_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            versions,
            manifests,
            cancel: CancellationToken::new(),
            host: Platform::host(),
            lockfile: LockfileManager::new(lockfile_path),
        }
    }

    pub fn with_host(mut self, host: Platform) -> Self {
        self.host = host;
        self
    }

    /// Token observed at every provider suspension point. Cancelling it
    /// aborts the session without writing anything.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve the root manifest's requirements into a validated package
    /// graph, reusing the lockfile when it still holds and rewriting it
    /// only after a full resolution produced a valid graph.
    pub async fn resolve(&self, root_manifest: &PackageManifest) -> Result<Outcome, SessionError> {
        // Memoization is scoped to this call; the cache dies with it.
        let providers = ProviderCache::new(
            self.versions.clone(),
            self.manifests.clone(),
            self.cancel.clone(),
        );
        let requirements = &root_manifest.dependencies;
        let (solution, reused) = match self
            .lockfile
            .reconcile(requirements, &providers, self.host)
            .await?
        {
            FastPathResult::Reused(solution) => {
                info!("lockfile holds, skipping resolution");
                (solution, true)
            }
            FastPathResult::Stale(preferences) => {
                debug!("lockfile stale, resolving with {} pins preferred", preferences.len());
                (self.solve(&providers, requirements, preferences).await?, false)
            }
            FastPathResult::Missing => {
                debug!("no lockfile, resolving from scratch");
                (self.solve(&providers, requirements, BTreeMap::new()).await?, false)
            }
        };

        let graph = GraphBuilder::new(&providers, self.host)
            .build(root_manifest, &solution)
            .await?;

        if !reused {
            self.lockfile.persist(&Lockfile::from_solution(&solution))?;
        }

        Ok(Outcome {
            solution,
            graph,
            reused_lockfile: reused,
        })
    }

    async fn solve(
        &self,
        providers: &ProviderCache,
        requirements: &[DeclaredDependency],
        preferences: BTreeMap<PackageIdentity, Version>,
    ) -> Result<Solution, ResolutionError> {
        Resolver::new(providers, self.host)
            .with_preferences(preferences)
            .resolve(requirements)
            .await
    }
}
