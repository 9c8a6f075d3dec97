//! Expansion of a resolved version set into a validated module graph.
//!
//! Building runs in two phases: manifests for every resolved package are
//! fetched concurrently, then validation (module uniqueness, product
//! resolution, acyclicity, reachability) runs over the immutable snapshot.

mod builder;

pub use builder::GraphBuilder;

use std::collections::BTreeMap;

use grove_common::PackageIdentity;
use semver::Version;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("module '{module}' is declared by both '{first}' and '{second}'")]
    DuplicateModule {
        module: String,
        first: PackageIdentity,
        second: PackageIdentity,
    },

    #[error("target '{target}' references product '{product}', which '{package}' does not expose")]
    UnresolvedProductReference {
        target: String,
        product: String,
        package: PackageIdentity,
    },

    #[error("'{target}' depends on unknown target '{dependency}'")]
    UnknownTargetDependency { target: String, dependency: String },

    #[error("target dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("manifest unavailable while building the graph: {0}")]
    ManifestUnavailable(crate::provider::ManifestError),

    #[error("graph construction cancelled")]
    Cancelled,
}

/// One compiled unit. Modules correspond 1:1 with reachable targets;
/// their dependency edges are fully expanded to other module names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub package: PackageIdentity,
    pub dependencies: Vec<String>,
}

/// A target as declared by its package, after platform filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub package: PackageIdentity,
}

/// A named set of targets a package exposes to its dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub package: PackageIdentity,
    pub targets: Vec<String>,
}

/// One package in the final graph. The root package carries no version;
/// everything else carries the version the solver chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    pub version: Option<Version>,
    pub targets: Vec<Target>,
    pub products: Vec<Product>,
}

/// The immutable output of graph building. Consumers only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageGraph {
    pub root: PackageIdentity,
    pub packages: BTreeMap<PackageIdentity, ResolvedPackage>,
    /// Reachable modules, sorted by name.
    pub modules: Vec<Module>,
}

impl PackageGraph {
    pub fn package(&self, identity: &PackageIdentity) -> Option<&ResolvedPackage> {
        self.packages.get(identity)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }
}
