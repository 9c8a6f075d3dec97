use std::collections::{BTreeMap, BTreeSet, HashMap};

use grove_common::{DeclaredDependency, PackageIdentity, Platform, RequirementKind, VersionSet};
use semver::Version;
use tracing::{debug, trace, warn};

use crate::provider::ProviderCache;

use super::explain;
use super::incompatibility::{Cause, IncompatId, Incompatibility, IncompatibilityStore};
use super::partial_solution::{PartialSolution, Relation};
use super::{root_identity, ResolutionError};

/// Versions are chosen one at a time; a search that makes this many
/// decisions is stuck in pathological backtracking and is aborted rather
/// than left to spin.
const DECISION_LIMIT: usize = 10_000;

/// One resolved package version plus the requirement kind that produced
/// it, so lockfiles can distinguish version pins from branch or revision
/// pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: Version,
    pub kind: RequirementKind,
}

/// The final assignment of one concrete version per reachable package.
/// Ordered by identity so every serialization derived from it is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    pub packages: BTreeMap<PackageIdentity, ResolvedVersion>,
}

impl Solution {
    pub fn version_of(&self, identity: &PackageIdentity) -> Option<&Version> {
        self.packages.get(identity).map(|r| &r.version)
    }
}

/// The conflict-driven resolution engine. One instance serves exactly one
/// `resolve` call; all search state dies with it.
pub struct Resolver<'a> {
    providers: &'a ProviderCache,
    host: Platform,
    /// Pins from a previous lockfile, preferred during decision making to
    /// minimize churn.
    preferred: BTreeMap<PackageIdentity, Version>,
    store: IncompatibilityStore,
    solution: PartialSolution,
    /// Requirement kind per package, recorded when the package is first
    /// referenced. Root requirements win over transitive ones.
    kinds: HashMap<PackageIdentity, RequirementKind>,
    /// Candidate versions excluded because their manifest failed to load.
    unusable: HashMap<PackageIdentity, BTreeSet<Version>>,
    decisions_made: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(providers: &'a ProviderCache, host: Platform) -> Self {
        Self {
            providers,
            host,
            preferred: BTreeMap::new(),
            store: IncompatibilityStore::new(),
            solution: PartialSolution::new(),
            kinds: HashMap::new(),
            unusable: HashMap::new(),
            decisions_made: 0,
        }
    }

    /// Seed decision making with previously pinned versions.
    pub fn with_preferences(mut self, preferred: BTreeMap<PackageIdentity, Version>) -> Self {
        self.preferred = preferred;
        self
    }

    /// Run the search to completion over the given root requirements.
    pub async fn resolve(
        mut self,
        root_requirements: &[DeclaredDependency],
    ) -> Result<Solution, ResolutionError> {
        let root = root_identity();
        self.solution.decide(root.clone(), root_version());
        self.seed_root(&root, root_requirements);
        self.propagate(root.clone())?;

        loop {
            if self.providers.is_cancelled() {
                return Err(ResolutionError::Cancelled);
            }
            let Some(package) = self.choose_package().await? else {
                return Ok(self.extract_solution(&root));
            };
            self.attempt_decision(&package).await?;
            self.propagate(package)?;
        }
    }

    fn seed_root(&mut self, root: &PackageIdentity, requirements: &[DeclaredDependency]) {
        for dependency in requirements {
            if !self.dependency_applies(dependency) {
                continue;
            }
            if dependency.requirement.is_path() {
                // Local-path requirements are satisfied by construction:
                // no version query, no pin, no search.
                debug!(
                    "skipping path requirement for '{}' (asserted immediately)",
                    dependency.identity
                );
                continue;
            }
            let Some(allowed) = dependency.requirement.allowed_set() else {
                continue;
            };
            self.record_kind(&dependency.identity, dependency.requirement.kind());
            self.store.add(Incompatibility::dependency(
                root.clone(),
                VersionSet::singleton(root_version()),
                dependency.identity.clone(),
                allowed,
                Cause::Root,
            ));
        }
    }

    fn dependency_applies(&self, dependency: &DeclaredDependency) -> bool {
        dependency
            .condition
            .as_ref()
            .map(|c| c.applies_to(self.host))
            .unwrap_or(true)
    }

    fn record_kind(&mut self, identity: &PackageIdentity, kind: RequirementKind) {
        self.kinds.entry(identity.clone()).or_insert(kind);
    }

    /// Unit propagation: derive every forced assignment reachable from
    /// `start`, resolving conflicts as they surface.
    fn propagate(&mut self, start: PackageIdentity) -> Result<(), ResolutionError> {
        let mut changed = vec![start];
        while let Some(package) = changed.pop() {
            for id in self.store.mentioning(&package) {
                let incompat = self.store.get(id).clone();
                match self.solution.relation(&incompat) {
                    Relation::Satisfied => {
                        let learned_id = self.resolve_conflict(id)?;
                        let learned = self.store.get(learned_id).clone();
                        match self.solution.relation(&learned) {
                            Relation::AlmostSatisfied(unit) => {
                                let term = learned
                                    .get(&unit)
                                    .expect("almost-satisfied names a member term")
                                    .negate();
                                self.solution.derive(unit.clone(), term, learned_id);
                                changed.clear();
                                changed.push(unit);
                            }
                            relation => {
                                trace!("learned incompatibility left {relation:?} after backtrack")
                            }
                        }
                        break;
                    }
                    Relation::AlmostSatisfied(unit) => {
                        let term = incompat
                            .get(&unit)
                            .expect("almost-satisfied names a member term")
                            .negate();
                        self.solution.derive(unit.clone(), term, id);
                        changed.push(unit);
                    }
                    Relation::Contradicted | Relation::Inconclusive => {}
                }
            }
        }
        Ok(())
    }

    /// Conflict resolution: repeatedly combine the conflicting
    /// incompatibility with the cause of its latest satisfier until the
    /// result backtracks cleanly or proves the whole search impossible.
    fn resolve_conflict(&mut self, conflict: IncompatId) -> Result<IncompatId, ResolutionError> {
        let root = root_identity();
        let mut current_id = conflict;
        loop {
            let current = self.store.get(current_id).clone();
            if current.is_terminal(&root) {
                let explanation = explain::derivation(&self.store, current_id);
                debug!("resolution failed:\n{explanation}");
                return Err(ResolutionError::VersionConflict { explanation });
            }

            let satisfier_index = self.solution.satisfier_index(&current);
            let satisfier = self.solution.assignments()[satisfier_index].clone();
            let previous_level = self
                .solution
                .previous_satisfier_level(&current, satisfier_index);

            match satisfier.cause {
                Some(cause_id) if previous_level == satisfier.decision_level => {
                    let cause = self.store.get(cause_id).clone();
                    let learned =
                        current.prior_cause(&cause, &satisfier.package, current_id, cause_id);
                    trace!("resolution rule learned: {learned}");
                    current_id = self.store.add(learned);
                }
                _ => {
                    self.solution.backtrack(previous_level);
                    return Ok(current_id);
                }
            }
        }
    }

    /// Pick the next package to decide: fewest remaining candidates first,
    /// ties broken by identity order. Version lists for all undecided
    /// packages are fetched concurrently (and memoized).
    async fn choose_package(&self) -> Result<Option<PackageIdentity>, ResolutionError> {
        let undecided = self.solution.undecided_packages();
        if undecided.is_empty() {
            return Ok(None);
        }

        let fetches = undecided
            .iter()
            .map(|package| self.providers.available_versions(package));
        let lists = futures::future::try_join_all(fetches).await?;

        let mut best: Option<(usize, &PackageIdentity)> = None;
        for (package, versions) in undecided.iter().zip(lists.iter()) {
            let count = self.candidate_count(package, versions);
            // Strict < keeps the first (lexicographically smallest) of a
            // tie, since `undecided` is sorted.
            if best.map(|(n, _)| count < n).unwrap_or(true) {
                best = Some((count, package));
            }
        }
        Ok(best.map(|(_, package)| package.clone()))
    }

    fn candidate_count(&self, package: &PackageIdentity, versions: &[Version]) -> usize {
        let Some(term) = self.solution.accumulated(package) else {
            return versions.len();
        };
        let excluded = self.unusable.get(package);
        versions
            .iter()
            .filter(|v| term.contains(v))
            .filter(|v| excluded.map(|set| !set.contains(v)).unwrap_or(true))
            .count()
    }

    /// Try to decide a version for `package`: pick the preferred or
    /// highest candidate, load its manifest, add its dependency
    /// incompatibilities, then commit the decision unless it would violate
    /// one of them on the spot.
    async fn attempt_decision(&mut self, package: &PackageIdentity) -> Result<(), ResolutionError> {
        let versions = self.providers.available_versions(package).await?;
        if versions.is_empty() {
            return Err(ResolutionError::PackageNotFound(package.clone()));
        }

        let term = self
            .solution
            .accumulated(package)
            .cloned()
            .expect("chosen package has positive knowledge");
        let excluded = self.unusable.get(package).cloned().unwrap_or_default();
        // Highest first: version lists come back sorted descending.
        let candidates: Vec<&Version> = versions
            .iter()
            .filter(|v| term.contains(v) && !excluded.contains(v))
            .collect();

        if candidates.is_empty() {
            if versions.iter().all(|v| excluded.contains(v)) {
                return Err(ResolutionError::NoUsableVersion(package.clone()));
            }
            debug!("no candidate version of '{package}' satisfies {term}");
            self.store
                .add(Incompatibility::no_versions(package.clone(), term.set));
            return Ok(());
        }

        let choice = self
            .preferred
            .get(package)
            .filter(|pinned| candidates.iter().any(|c| c == pinned))
            .unwrap_or(candidates[0])
            .clone();

        let manifest = match self.providers.manifest(package, &choice).await {
            Ok(manifest) => manifest,
            Err(crate::provider::ManifestError::Cancelled) => {
                return Err(ResolutionError::Cancelled);
            }
            Err(err) => {
                // This candidate is unusable, not the whole resolution:
                // exclude the version and keep searching.
                warn!("excluding '{package}' {choice}: {err}");
                self.unusable
                    .entry(package.clone())
                    .or_default()
                    .insert(choice.clone());
                self.store
                    .add(Incompatibility::unavailable(package.clone(), choice));
                let all_unusable = {
                    let excluded = &self.unusable[package];
                    versions.iter().all(|v| excluded.contains(v))
                };
                if all_unusable {
                    return Err(ResolutionError::NoUsableVersion(package.clone()));
                }
                return Ok(());
            }
        };

        let mut new_incompats = Vec::new();
        for dependency in &manifest.dependencies {
            if !self.dependency_applies(dependency) || dependency.requirement.is_path() {
                continue;
            }
            let Some(allowed) = dependency.requirement.allowed_set() else {
                continue;
            };
            self.record_kind(&dependency.identity, dependency.requirement.kind());
            let incompat = Incompatibility::dependency(
                package.clone(),
                VersionSet::singleton(choice.clone()),
                dependency.identity.clone(),
                allowed,
                Cause::Dependency {
                    depender: package.clone(),
                    dependee: dependency.identity.clone(),
                },
            );
            new_incompats.push(self.store.add(incompat));
        }

        // Deciding `choice` must not immediately violate one of the new
        // incompatibilities; if it would, leave the decision unmade and
        // let propagation exclude the version instead.
        let immediate_conflict = new_incompats.iter().any(|&id| {
            let incompat = self.store.get(id);
            incompat.terms.iter().all(|(p, t)| {
                if p == package {
                    t.contains(&choice)
                } else {
                    self.solution
                        .accumulated(p)
                        .map(|acc| acc.intersection(t) == *acc)
                        .unwrap_or(false)
                }
            })
        });

        if immediate_conflict {
            debug!("deferring decision on '{package}' {choice}: immediate conflict");
            return Ok(());
        }

        self.decisions_made += 1;
        if self.decisions_made > DECISION_LIMIT {
            return Err(ResolutionError::DecisionLimitExceeded);
        }
        self.solution.decide(package.clone(), choice);
        Ok(())
    }

    fn extract_solution(&self, root: &PackageIdentity) -> Solution {
        let mut packages = BTreeMap::new();
        for assignment in self.solution.assignments() {
            if !assignment.is_decision() || assignment.package == *root {
                continue;
            }
            if let Some(version) = self.solution.decided(&assignment.package) {
                let kind = self
                    .kinds
                    .get(&assignment.package)
                    .copied()
                    .unwrap_or(RequirementKind::Version);
                packages.insert(
                    assignment.package.clone(),
                    ResolvedVersion {
                        version: version.clone(),
                        kind,
                    },
                );
            }
        }
        Solution { packages }
    }
}

/// The synthetic version the root package is decided at.
fn root_version() -> Version {
    Version::new(0, 0, 0)
}
