use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use grove_common::{
    PackageIdentity, PackageManifest, Platform, PlatformCondition, TargetDependency,
};
use semver::Version;
use tracing::debug;

use crate::provider::{ManifestError, ProviderCache};
use crate::resolver::Solution;

use super::{GraphError, Module, PackageGraph, Product, ResolvedPackage, Target};

/// Builds a validated [`PackageGraph`] from a solution. Manifest fetches
/// for distinct packages run concurrently; validation runs afterwards over
/// the complete snapshot.
pub struct GraphBuilder<'a> {
    providers: &'a ProviderCache,
    host: Platform,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(providers: &'a ProviderCache, host: Platform) -> Self {
        Self { providers, host }
    }

    pub async fn build(
        &self,
        root_manifest: &PackageManifest,
        solution: &Solution,
    ) -> Result<PackageGraph, GraphError> {
        let snapshot = self.fetch_manifests(root_manifest, solution).await?;

        let targets = filtered_targets(&snapshot, self.host);
        let owners = check_module_uniqueness(&targets)?;
        let edges = resolve_dependencies(&snapshot, &targets, &owners, self.host)?;
        check_acyclic(root_manifest, &edges)?;

        let reachable = reachable_modules(root_manifest, &targets, &edges);
        debug!(
            "graph: {} of {} modules reachable from '{}'",
            reachable.len(),
            targets.len(),
            root_manifest.identity
        );

        Ok(assemble(
            root_manifest,
            &snapshot,
            &targets,
            &edges,
            &reachable,
            self.host,
        ))
    }

    async fn fetch_manifests(
        &self,
        root_manifest: &PackageManifest,
        solution: &Solution,
    ) -> Result<Vec<(Option<Version>, PackageManifest)>, GraphError> {
        let fetches = solution.packages.iter().map(|(identity, resolved)| {
            self.providers.manifest(identity, &resolved.version)
        });
        let fetched = futures::future::try_join_all(fetches)
            .await
            .map_err(|err| match err {
                ManifestError::Cancelled => GraphError::Cancelled,
                other => GraphError::ManifestUnavailable(other),
            })?;

        let mut snapshot = vec![(None, root_manifest.clone())];
        for (resolved, manifest) in solution.packages.values().zip(fetched) {
            snapshot.push((Some(resolved.version.clone()), (*manifest).clone()));
        }
        Ok(snapshot)
    }
}

fn applies(condition: Option<&PlatformCondition>, host: Platform) -> bool {
    condition.map(|c| c.applies_to(host)).unwrap_or(true)
}

/// Module name → owning package and declaration, restricted to targets
/// whose platform condition matches the host.
type FilteredTargets<'s> = Vec<(&'s PackageManifest, &'s grove_common::TargetDescription)>;

fn filtered_targets(
    snapshot: &[(Option<Version>, PackageManifest)],
    host: Platform,
) -> FilteredTargets<'_> {
    snapshot
        .iter()
        .flat_map(|(_, manifest)| manifest.targets.iter().map(move |t| (manifest, t)))
        .filter(|(_, target)| applies(target.condition.as_ref(), host))
        .collect()
}

fn check_module_uniqueness<'s>(
    targets: &FilteredTargets<'s>,
) -> Result<HashMap<&'s str, &'s PackageIdentity>, GraphError> {
    let mut owners: HashMap<&str, &PackageIdentity> = HashMap::new();
    for (manifest, target) in targets {
        if let Some(first) = owners.insert(target.name.as_str(), &manifest.identity) {
            if *first != manifest.identity {
                return Err(GraphError::DuplicateModule {
                    module: target.name.clone(),
                    first: first.clone(),
                    second: manifest.identity.clone(),
                });
            }
        }
    }
    Ok(owners)
}

/// Expand every target's declared dependencies into module-name edges.
fn resolve_dependencies(
    snapshot: &[(Option<Version>, PackageManifest)],
    targets: &FilteredTargets<'_>,
    owners: &HashMap<&str, &PackageIdentity>,
    host: Platform,
) -> Result<HashMap<String, Vec<String>>, GraphError> {
    let manifests: HashMap<&PackageIdentity, &PackageManifest> = snapshot
        .iter()
        .map(|(_, manifest)| (&manifest.identity, manifest))
        .collect();

    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for (manifest, target) in targets {
        let mut deps = Vec::new();
        for dependency in &target.dependencies {
            if !applies(dependency.condition(), host) {
                continue;
            }
            match dependency {
                TargetDependency::Target { name, .. } => {
                    let owner = owners.get(name.as_str());
                    if owner != Some(&&manifest.identity) {
                        return Err(GraphError::UnknownTargetDependency {
                            target: target.name.clone(),
                            dependency: name.clone(),
                        });
                    }
                    deps.push(name.clone());
                }
                TargetDependency::Product { name, package, .. } => {
                    let product = manifests
                        .get(package)
                        .and_then(|m| m.product(name))
                        .ok_or_else(|| GraphError::UnresolvedProductReference {
                            target: target.name.clone(),
                            product: name.clone(),
                            package: package.clone(),
                        })?;
                    for member in &product.targets {
                        if owners.get(member.as_str()) != Some(&package) {
                            return Err(GraphError::UnknownTargetDependency {
                                target: name.clone(),
                                dependency: member.clone(),
                            });
                        }
                        deps.push(member.clone());
                    }
                }
            }
        }
        edges.insert(target.name.clone(), deps);
    }
    Ok(edges)
}

/// Depth-first search over the module edges reachable from the root's
/// targets, with an explicit stack and a recursion marker; any back edge
/// is a cycle, reported as the full path around it.
fn check_acyclic(
    root_manifest: &PackageManifest,
    edges: &HashMap<String, Vec<String>>,
) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<&str, Color> = HashMap::new();
    for root in root_manifest.targets.iter().map(|t| t.name.as_str()) {
        if colors.get(root).copied().unwrap_or(Color::White) != Color::White {
            continue;
        }
        // (node, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        let mut path: Vec<&str> = vec![root];
        colors.insert(root, Color::Gray);

        while let Some((node, child_index)) = stack.last_mut() {
            let children = edges.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(child) = children.get(*child_index) {
                *child_index += 1;
                match colors.get(child.as_str()).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let start = path
                            .iter()
                            .position(|n| *n == child.as_str())
                            .unwrap_or(0);
                        return Err(GraphError::DependencyCycle {
                            path: path[start..].iter().map(|n| n.to_string()).collect(),
                        });
                    }
                    Color::White => {
                        colors.insert(child.as_str(), Color::Gray);
                        stack.push((child.as_str(), 0));
                        path.push(child.as_str());
                    }
                    Color::Black => {}
                }
            } else {
                colors.insert(*node, Color::Black);
                stack.pop();
                path.pop();
            }
        }
    }
    Ok(())
}

/// Modules transitively required by the root's own targets. Everything
/// else is silently excluded from the graph.
fn reachable_modules(
    root_manifest: &PackageManifest,
    targets: &FilteredTargets<'_>,
    edges: &HashMap<String, Vec<String>>,
) -> HashSet<String> {
    let declared: HashSet<&str> = targets.iter().map(|(_, t)| t.name.as_str()).collect();
    let mut reachable = HashSet::new();
    let mut queue: VecDeque<&str> = root_manifest
        .targets
        .iter()
        .map(|t| t.name.as_str())
        .filter(|name| declared.contains(name))
        .collect();
    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name.to_string()) {
            continue;
        }
        if let Some(deps) = edges.get(name) {
            queue.extend(deps.iter().map(String::as_str));
        }
    }
    reachable
}

fn assemble(
    root_manifest: &PackageManifest,
    snapshot: &[(Option<Version>, PackageManifest)],
    targets: &FilteredTargets<'_>,
    edges: &HashMap<String, Vec<String>>,
    reachable: &HashSet<String>,
    host: Platform,
) -> PackageGraph {
    let mut modules: Vec<Module> = targets
        .iter()
        .filter(|(_, target)| reachable.contains(&target.name))
        .map(|(manifest, target)| Module {
            name: target.name.clone(),
            package: manifest.identity.clone(),
            dependencies: edges.get(&target.name).cloned().unwrap_or_default(),
        })
        .collect();
    modules.sort_by(|a, b| a.name.cmp(&b.name));

    let mut packages = BTreeMap::new();
    for (version, manifest) in snapshot {
        let package_targets: Vec<Target> = manifest
            .targets
            .iter()
            .filter(|t| applies(t.condition.as_ref(), host))
            .map(|t| Target {
                name: t.name.clone(),
                package: manifest.identity.clone(),
            })
            .collect();
        let products: Vec<Product> = manifest
            .products
            .iter()
            .map(|p| Product {
                name: p.name.clone(),
                package: manifest.identity.clone(),
                targets: p.targets.clone(),
            })
            .collect();
        packages.insert(
            manifest.identity.clone(),
            ResolvedPackage {
                identity: manifest.identity.clone(),
                version: version.clone(),
                targets: package_targets,
                products,
            },
        );
    }

    PackageGraph {
        root: root_manifest.identity.clone(),
        packages,
        modules,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use grove_common::{ProductDescription, TargetDescription};
    use tokio_util::sync::CancellationToken;

    use crate::provider::{ManifestProvider, ProviderError, VersionProvider};
    use crate::resolver::{ResolvedVersion, Solution};
    use grove_common::RequirementKind;

    use super::*;

    struct FixedManifests {
        manifests: Vec<PackageManifest>,
    }

    #[async_trait]
    impl VersionProvider for FixedManifests {
        async fn available_versions(
            &self,
            _identity: &PackageIdentity,
        ) -> Result<Vec<Version>, ProviderError> {
            Ok(vec![Version::new(1, 0, 0)])
        }
    }

    #[async_trait]
    impl ManifestProvider for FixedManifests {
        async fn manifest(
            &self,
            identity: &PackageIdentity,
            version: &Version,
        ) -> Result<PackageManifest, ManifestError> {
            self.manifests
                .iter()
                .find(|m| m.identity == *identity)
                .cloned()
                .ok_or_else(|| ManifestError::NotFound {
                    identity: identity.clone(),
                    version: version.clone(),
                })
        }
    }

    fn target(name: &str, deps: Vec<TargetDependency>) -> TargetDescription {
        TargetDescription {
            name: name.to_string(),
            dependencies: deps,
            condition: None,
        }
    }

    fn on_target(name: &str) -> TargetDependency {
        TargetDependency::Target {
            name: name.to_string(),
            condition: None,
        }
    }

    fn on_product(name: &str, package: &str) -> TargetDependency {
        TargetDependency::Product {
            name: name.to_string(),
            package: PackageIdentity::new(package),
            condition: None,
        }
    }

    fn cache(manifests: Vec<PackageManifest>) -> ProviderCache {
        let provider = Arc::new(FixedManifests { manifests });
        ProviderCache::new(provider.clone(), provider, CancellationToken::new())
    }

    fn solution_of(identities: &[&str]) -> Solution {
        let mut solution = Solution::default();
        for identity in identities {
            solution.packages.insert(
                PackageIdentity::new(identity),
                ResolvedVersion {
                    version: Version::new(1, 0, 0),
                    kind: RequirementKind::Version,
                },
            );
        }
        solution
    }

    #[tokio::test]
    async fn builds_and_prunes_unreachable_targets() {
        let mut dep = PackageManifest::new(PackageIdentity::new("dep"));
        dep.targets = vec![target("DepCore", vec![]), target("DepExtras", vec![])];
        dep.products = vec![ProductDescription {
            name: "Dep".to_string(),
            targets: vec!["DepCore".to_string()],
        }];

        let mut root = PackageManifest::new(PackageIdentity::new("app"));
        root.targets = vec![target("App", vec![on_product("Dep", "dep")])];

        let providers = cache(vec![dep]);
        let graph = GraphBuilder::new(&providers, Platform::Linux)
            .build(&root, &solution_of(&["dep"]))
            .await
            .unwrap();

        assert_eq!(graph.root, PackageIdentity::new("app"));
        assert!(graph.module("App").is_some());
        assert!(graph.module("DepCore").is_some());
        // Declared but not required by any root target.
        assert!(graph.module("DepExtras").is_none());
        assert_eq!(
            graph.module("App").unwrap().dependencies,
            vec!["DepCore".to_string()]
        );
    }

    #[tokio::test]
    async fn duplicate_module_names_across_packages_fail() {
        let mut a = PackageManifest::new(PackageIdentity::new("a"));
        a.targets = vec![target("Shared", vec![])];
        let mut b = PackageManifest::new(PackageIdentity::new("b"));
        b.targets = vec![target("Shared", vec![])];

        let root = PackageManifest::new(PackageIdentity::new("app"));
        let providers = cache(vec![a, b]);
        let err = GraphBuilder::new(&providers, Platform::Linux)
            .build(&root, &solution_of(&["a", "b"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GraphError::DuplicateModule { module, .. } if module == "Shared"
        ));
    }

    #[tokio::test]
    async fn missing_product_is_reported() {
        let dep = PackageManifest::new(PackageIdentity::new("dep"));
        let mut root = PackageManifest::new(PackageIdentity::new("app"));
        root.targets = vec![target("App", vec![on_product("Nope", "dep")])];

        let providers = cache(vec![dep]);
        let err = GraphBuilder::new(&providers, Platform::Linux)
            .build(&root, &solution_of(&["dep"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GraphError::UnresolvedProductReference { target, product, .. }
                if target == "App" && product == "Nope"
        ));
    }

    #[tokio::test]
    async fn two_target_cycle_reports_the_full_path() {
        let mut root = PackageManifest::new(PackageIdentity::new("app"));
        root.targets = vec![
            target("T1", vec![on_target("T2")]),
            target("T2", vec![on_target("T1")]),
        ];

        let providers = cache(vec![]);
        let err = GraphBuilder::new(&providers, Platform::Linux)
            .build(&root, &Solution::default())
            .await
            .unwrap_err();

        match err {
            GraphError::DependencyCycle { path } => {
                assert_eq!(path, vec!["T1".to_string(), "T2".to_string()]);
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn platform_conditions_filter_targets_and_edges() {
        let mut root = PackageManifest::new(PackageIdentity::new("app"));
        let mut windows_only = target("WinSupport", vec![]);
        windows_only.condition = Some(PlatformCondition {
            platforms: vec![Platform::Windows],
        });
        let app = target(
            "App",
            vec![TargetDependency::Target {
                name: "WinSupport".to_string(),
                condition: Some(PlatformCondition {
                    platforms: vec![Platform::Windows],
                }),
            }],
        );
        root.targets = vec![app, windows_only];

        let providers = cache(vec![]);
        let graph = GraphBuilder::new(&providers, Platform::Linux)
            .build(&root, &Solution::default())
            .await
            .unwrap();

        assert!(graph.module("App").is_some());
        assert!(graph.module("WinSupport").is_none());
        assert!(graph.module("App").unwrap().dependencies.is_empty());
    }
}
