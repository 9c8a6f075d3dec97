use std::collections::{BTreeMap, HashMap};
use std::fmt;

use grove_common::{PackageIdentity, VersionSet};
use semver::Version;

use super::term::Term;

pub type IncompatId = usize;

/// A set of terms that cannot all hold at once, annotated with why.
///
/// Root facts come straight from declared requirements and provider
/// answers; derived incompatibilities are produced by the resolution rule
/// from two earlier ones, forming the derivation DAG that conflict
/// explanations walk.
#[derive(Debug, Clone)]
pub struct Incompatibility {
    pub terms: BTreeMap<PackageIdentity, Term>,
    pub cause: Cause,
}

#[derive(Debug, Clone)]
pub enum Cause {
    /// A requirement declared by the root package.
    Root,
    /// `depender` at the versions in its term requires `dependee`.
    Dependency {
        depender: PackageIdentity,
        dependee: PackageIdentity,
    },
    /// No listed version of the package falls in the term's set.
    NoVersions { package: PackageIdentity },
    /// The manifest for this candidate version could not be loaded, so
    /// the version is treated as nonexistent.
    Unavailable {
        package: PackageIdentity,
        version: Version,
    },
    /// Resolution rule applied to two prior incompatibilities.
    Derived { left: IncompatId, right: IncompatId },
}

impl Incompatibility {
    /// "`depender` at `depender_versions` requires `dependee` in `allowed`."
    pub fn dependency(
        depender: PackageIdentity,
        depender_versions: VersionSet,
        dependee: PackageIdentity,
        allowed: VersionSet,
        cause: Cause,
    ) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(depender.clone(), Term::positive(depender_versions));
        terms.insert(dependee, Term::negative(allowed));
        Self { terms, cause }
    }

    pub fn no_versions(package: PackageIdentity, set: VersionSet) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(package.clone(), Term::positive(set));
        Self {
            terms,
            cause: Cause::NoVersions { package },
        }
    }

    pub fn unavailable(package: PackageIdentity, version: Version) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(
            package.clone(),
            Term::positive(VersionSet::singleton(version.clone())),
        );
        Self {
            terms,
            cause: Cause::Unavailable { package, version },
        }
    }

    pub fn get(&self, package: &PackageIdentity) -> Option<&Term> {
        self.terms.get(package)
    }

    /// The resolution rule: combine `self` with the cause of a derivation
    /// for `pivot`, eliminating (or weakening) the pivot's term.
    ///
    /// Shared non-pivot packages keep the conjunction of both terms; the
    /// pivot keeps the union of its two terms unless that union is a
    /// tautology, in which case it drops out entirely.
    pub fn prior_cause(
        &self,
        other: &Incompatibility,
        pivot: &PackageIdentity,
        self_id: IncompatId,
        other_id: IncompatId,
    ) -> Self {
        let mut terms: BTreeMap<PackageIdentity, Term> = BTreeMap::new();
        for (package, term) in self.terms.iter().chain(other.terms.iter()) {
            if package == pivot {
                continue;
            }
            terms
                .entry(package.clone())
                .and_modify(|existing| *existing = existing.intersection(term))
                .or_insert_with(|| term.clone());
        }
        if let (Some(a), Some(b)) = (self.get(pivot), other.get(pivot)) {
            let merged = a.union(b);
            if !merged.is_always() {
                terms.insert(pivot.clone(), merged);
            }
        }
        Self {
            terms,
            cause: Cause::Derived {
                left: self_id,
                right: other_id,
            },
        }
    }

    /// A terminal incompatibility proves resolution impossible: either it
    /// is empty, or its only term pins the root package itself.
    pub fn is_terminal(&self, root: &PackageIdentity) -> bool {
        match self.terms.len() {
            0 => true,
            1 => {
                let (package, term) = self.terms.iter().next().expect("len checked");
                term.positive && package == root
            }
            _ => false,
        }
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (package, term) in &self.terms {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{package} {term}")?;
            first = false;
        }
        Ok(())
    }
}

/// Append-only store of incompatibilities, indexed by the packages their
/// terms mention. Indices double as stable ids for the derivation DAG.
#[derive(Debug, Default)]
pub struct IncompatibilityStore {
    items: Vec<Incompatibility>,
    by_package: HashMap<PackageIdentity, Vec<IncompatId>>,
}

impl IncompatibilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, incompat: Incompatibility) -> IncompatId {
        let id = self.items.len();
        for package in incompat.terms.keys() {
            self.by_package.entry(package.clone()).or_default().push(id);
        }
        self.items.push(incompat);
        id
    }

    pub fn get(&self, id: IncompatId) -> &Incompatibility {
        &self.items[id]
    }

    /// Ids of incompatibilities mentioning `package`, newest first.
    pub fn mentioning(&self, package: &PackageIdentity) -> Vec<IncompatId> {
        let mut ids = self
            .by_package
            .get(package)
            .cloned()
            .unwrap_or_default();
        ids.reverse();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn pkg(s: &str) -> PackageIdentity {
        PackageIdentity::new(s)
    }

    #[test]
    fn prior_cause_eliminates_exact_pivot() {
        // a@1 requires c in [1,2); a learned fact forbids c in [1,2).
        // Resolving over pivot c must drop c's term (the union is a
        // tautology) and keep the remaining terms.
        let left = Incompatibility::dependency(
            pkg("a"),
            VersionSet::singleton(v("1.0.0")),
            pkg("c"),
            VersionSet::range(v("1.0.0"), v("2.0.0")),
            Cause::Dependency {
                depender: pkg("a"),
                dependee: pkg("c"),
            },
        );
        // A learned incompatibility claiming c cannot be inside [1,2),
        // so the union with the left term over c covers everything.
        let mut terms = BTreeMap::new();
        terms.insert(
            pkg("c"),
            Term::positive(VersionSet::range(v("1.0.0"), v("2.0.0"))),
        );
        terms.insert(pkg("b"), Term::exactly(v("1.0.0")));
        let right = Incompatibility {
            terms,
            cause: Cause::Root,
        };

        let resolved = left.prior_cause(&right, &pkg("c"), 0, 1);
        assert!(resolved.get(&pkg("c")).is_none());
        assert!(resolved.get(&pkg("a")).is_some());
        assert!(resolved.get(&pkg("b")).is_some());
        assert!(matches!(resolved.cause, Cause::Derived { left: 0, right: 1 }));
    }

    #[test]
    fn terminal_detection() {
        let root = pkg("(root)");
        let mut terms = BTreeMap::new();
        terms.insert(root.clone(), Term::exactly(v("0.0.0")));
        let incompat = Incompatibility {
            terms,
            cause: Cause::Root,
        };
        assert!(incompat.is_terminal(&root));

        let dep = Incompatibility::dependency(
            root.clone(),
            VersionSet::singleton(v("0.0.0")),
            pkg("a"),
            VersionSet::any(),
            Cause::Root,
        );
        assert!(!dep.is_terminal(&root));
    }
}
