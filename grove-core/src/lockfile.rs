//! Lockfile persistence and the reconciliation fast path.
//!
//! A lockfile is the serialized form of a [`Solution`]: one pin per
//! resolved package, ordered by identity so the same solution always
//! serializes byte-identically. Reconciliation checks a prior lockfile
//! against the current requirements using manifest queries only; the full
//! solver runs only when the lockfile no longer holds.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use grove_common::{DeclaredDependency, PackageIdentity, Platform, RequirementKind};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::provider::{ManifestError, ProviderCache};
use crate::resolver::{ResolvedVersion, Solution};

const LOCKFILE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum LockfileError {
    #[error("lockfile i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("lockfile serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("lockfile reconciliation cancelled")]
    Cancelled,
}

/// One persisted resolution entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub identity: PackageIdentity,
    pub version: Version,
    pub kind: RequirementKind,
}

/// The on-disk pin list. `version` is the format version, bumped on
/// incompatible schema changes; unknown versions are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub pins: Vec<Pin>,
}

impl Lockfile {
    pub fn from_solution(solution: &Solution) -> Self {
        // BTreeMap iteration keeps the pins sorted by identity.
        let pins = solution
            .packages
            .iter()
            .map(|(identity, resolved)| Pin {
                identity: identity.clone(),
                version: resolved.version.clone(),
                kind: resolved.kind,
            })
            .collect();
        Self {
            version: LOCKFILE_FORMAT_VERSION,
            pins,
        }
    }

    pub fn to_solution(&self) -> Solution {
        let mut solution = Solution::default();
        for pin in &self.pins {
            solution.packages.insert(
                pin.identity.clone(),
                ResolvedVersion {
                    version: pin.version.clone(),
                    kind: pin.kind,
                },
            );
        }
        solution
    }

    /// Pin map used to seed the solver's decision preference.
    pub fn to_preferences(&self) -> BTreeMap<PackageIdentity, Version> {
        self.pins
            .iter()
            .map(|pin| (pin.identity.clone(), pin.version.clone()))
            .collect()
    }

    pub fn pin(&self, identity: &PackageIdentity) -> Option<&Pin> {
        self.pins.iter().find(|p| p.identity == *identity)
    }

    pub fn serialize(&self) -> Result<String, LockfileError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

/// Outcome of checking a prior lockfile against the current requirements.
#[derive(Debug)]
pub enum FastPathResult {
    /// Every pin still holds and no package appeared or vanished: the
    /// lockfile is the solution, no solving needed.
    Reused(Solution),
    /// The lockfile no longer matches; solve again, preferring these pins.
    Stale(BTreeMap<PackageIdentity, Version>),
    /// No usable lockfile exists.
    Missing,
}

/// Owns the lockfile path and everything that reads or writes it.
pub struct LockfileManager {
    path: PathBuf,
}

impl LockfileManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the lockfile if a usable one exists. A missing, unparseable
    /// or unknown-format file yields `None` rather than an error: the
    /// caller falls back to a full resolution either way.
    pub fn load(&self) -> Result<Option<Lockfile>, LockfileError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let lockfile: Lockfile = match serde_json::from_str(&text) {
            Ok(lockfile) => lockfile,
            Err(err) => {
                warn!("ignoring unparseable lockfile at {}: {err}", self.path.display());
                return Ok(None);
            }
        };
        if lockfile.version != LOCKFILE_FORMAT_VERSION {
            warn!(
                "ignoring lockfile with unsupported format version {}",
                lockfile.version
            );
            return Ok(None);
        }
        Ok(Some(lockfile))
    }

    /// Write the lockfile atomically: a temporary file in the same
    /// directory is renamed over the previous one, so a crash mid-write
    /// never leaves a truncated lockfile behind.
    pub fn persist(&self, lockfile: &Lockfile) -> Result<(), LockfileError> {
        let directory = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory)?;
        let mut temp = tempfile::NamedTempFile::new_in(directory)?;
        temp.write_all(lockfile.serialize()?.as_bytes())?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        debug!("wrote {} pins to {}", lockfile.pins.len(), self.path.display());
        Ok(())
    }

    /// The fast path: walk the dependency closure implied by the pinned
    /// versions, fetching manifests only, and check that every pin still
    /// satisfies its requirement and that the reachable set matches the
    /// pinned set exactly. Any mismatch falls back to a full resolution
    /// seeded with the old pins.
    pub async fn reconcile(
        &self,
        root_requirements: &[DeclaredDependency],
        providers: &ProviderCache,
        host: Platform,
    ) -> Result<FastPathResult, LockfileError> {
        let Some(lockfile) = self.load()? else {
            return Ok(FastPathResult::Missing);
        };
        let preferences = lockfile.to_preferences();

        let mut visited: BTreeSet<PackageIdentity> = BTreeSet::new();
        let mut queue: VecDeque<DeclaredDependency> =
            root_requirements.iter().cloned().collect();

        while let Some(dependency) = queue.pop_front() {
            let applicable = dependency
                .condition
                .as_ref()
                .map(|c| c.applies_to(host))
                .unwrap_or(true);
            if !applicable || dependency.requirement.is_path() {
                continue;
            }
            let Some(pin) = lockfile.pin(&dependency.identity) else {
                debug!("lockfile stale: '{}' is not pinned", dependency.identity);
                return Ok(FastPathResult::Stale(preferences));
            };
            if !dependency.requirement.satisfied_by(&pin.version) {
                debug!(
                    "lockfile stale: '{}' pinned at {} no longer satisfies {}",
                    pin.identity, pin.version, dependency.requirement
                );
                return Ok(FastPathResult::Stale(preferences));
            }
            if !visited.insert(pin.identity.clone()) {
                continue;
            }
            match providers.manifest(&pin.identity, &pin.version).await {
                Ok(manifest) => queue.extend(manifest.dependencies.iter().cloned()),
                Err(ManifestError::Cancelled) => return Err(LockfileError::Cancelled),
                Err(err) => {
                    debug!("lockfile stale: {err}");
                    return Ok(FastPathResult::Stale(preferences));
                }
            }
        }

        let pinned: BTreeSet<PackageIdentity> =
            lockfile.pins.iter().map(|p| p.identity.clone()).collect();
        if visited != pinned {
            debug!("lockfile stale: reachable packages changed");
            return Ok(FastPathResult::Stale(preferences));
        }

        Ok(FastPathResult::Reused(lockfile.to_solution()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_solution() -> Solution {
        let mut solution = Solution::default();
        solution.packages.insert(
            PackageIdentity::new("b"),
            ResolvedVersion {
                version: Version::new(2, 1, 0),
                kind: RequirementKind::Version,
            },
        );
        solution.packages.insert(
            PackageIdentity::new("a"),
            ResolvedVersion {
                version: Version::new(1, 0, 0),
                kind: RequirementKind::Branch,
            },
        );
        solution
    }

    #[test]
    fn serialization_is_sorted_and_stable() {
        let lockfile = Lockfile::from_solution(&sample_solution());
        assert_eq!(lockfile.pins[0].identity, PackageIdentity::new("a"));
        assert_eq!(lockfile.pins[1].identity, PackageIdentity::new("b"));

        let first = lockfile.serialize().unwrap();
        let second = Lockfile::from_solution(&sample_solution())
            .serialize()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_preserves_the_solution() {
        let solution = sample_solution();
        let lockfile = Lockfile::from_solution(&solution);
        let text = lockfile.serialize().unwrap();
        let parsed: Lockfile = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.to_solution(), solution);
    }

    #[test]
    fn persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = LockfileManager::new(dir.path().join("grove.lock"));
        assert!(manager.load().unwrap().is_none());

        let lockfile = Lockfile::from_solution(&sample_solution());
        manager.persist(&lockfile).unwrap();
        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded, lockfile);
    }

    #[test]
    fn unparseable_lockfile_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.lock");
        std::fs::write(&path, "not json").unwrap();
        let manager = LockfileManager::new(path);
        assert!(manager.load().unwrap().is_none());
    }

    #[test]
    fn unknown_format_version_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.lock");
        std::fs::write(&path, r#"{"version": 99, "pins": []}"#).unwrap();
        let manager = LockfileManager::new(path);
        assert!(manager.load().unwrap().is_none());
    }
}
