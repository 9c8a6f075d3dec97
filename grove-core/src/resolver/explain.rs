//! Human-readable rendering of a failed resolution's derivation DAG.

use super::incompatibility::{Cause, IncompatId, Incompatibility, IncompatibilityStore};
use super::root_identity;

/// Derivation chains are rarely deep, but a cap keeps a degenerate DAG
/// from producing an unreadable wall of text.
const MAX_DEPTH: usize = 16;

/// Render the chain of reasoning that produced `id`, ending with the
/// terminal conclusion.
pub(crate) fn derivation(store: &IncompatibilityStore, id: IncompatId) -> String {
    let mut lines = Vec::new();
    render(store, id, 0, &mut lines);
    lines.push(format!("So {}.", conclusion(store.get(id))));
    lines.join("\n")
}

fn render(store: &IncompatibilityStore, id: IncompatId, depth: usize, lines: &mut Vec<String>) {
    if depth >= MAX_DEPTH {
        return;
    }
    let incompat = store.get(id);
    if let Cause::Derived { left, right } = incompat.cause {
        render(store, left, depth + 1, lines);
        render(store, right, depth + 1, lines);
        lines.push(format!(
            "Because {} and {}, {}.",
            describe(store.get(left)),
            describe(store.get(right)),
            conclusion(incompat)
        ));
    }
}

/// One clause describing an incompatibility by its origin.
fn describe(incompat: &Incompatibility) -> String {
    match &incompat.cause {
        Cause::Root => {
            let root = root_identity();
            match incompat
                .terms
                .iter()
                .find(|(package, _)| **package != root)
            {
                Some((package, term)) => {
                    format!("the root package requires {package} {}", term.set)
                }
                None => "the root package's requirements are contradictory".to_string(),
            }
        }
        Cause::Dependency { depender, dependee } => {
            let versions = incompat
                .get(depender)
                .map(|t| t.set.to_string())
                .unwrap_or_else(|| "*".to_string());
            let allowed = incompat
                .get(dependee)
                .map(|t| t.set.to_string())
                .unwrap_or_else(|| "*".to_string());
            format!("{depender} {versions} depends on {dependee} {allowed}")
        }
        Cause::NoVersions { package } => {
            let set = incompat
                .get(package)
                .map(|t| t.set.to_string())
                .unwrap_or_else(|| "*".to_string());
            format!("no version of {package} matches {set}")
        }
        Cause::Unavailable { package, version } => {
            format!("{package} {version} is unavailable")
        }
        Cause::Derived { .. } => conclusion(incompat),
    }
}

/// What an incompatibility forbids, phrased as its consequence.
fn conclusion(incompat: &Incompatibility) -> String {
    let root = root_identity();
    if incompat.is_terminal(&root) {
        return "version resolution is impossible".to_string();
    }
    let clauses: Vec<String> = incompat
        .terms
        .iter()
        .filter(|(package, _)| **package != root)
        .map(|(package, term)| {
            if term.positive {
                format!("{package} {}", term.set)
            } else {
                format!("{package} outside {}", term.set)
            }
        })
        .collect();
    match clauses.len() {
        0 => "version resolution is impossible".to_string(),
        1 => format!("{} is forbidden", clauses[0]),
        _ => format!("{} are incompatible", clauses.join(" with ")),
    }
}

#[cfg(test)]
mod tests {
    use grove_common::{PackageIdentity, VersionSet};
    use semver::Version;

    use super::super::incompatibility::Cause;
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn derived_chain_names_both_premises() {
        let mut store = IncompatibilityStore::new();
        let a = PackageIdentity::new("a");
        let b = PackageIdentity::new("b");
        let c = PackageIdentity::new("c");

        let left_id = store.add(Incompatibility::dependency(
            a.clone(),
            VersionSet::singleton(v("1.0.0")),
            c.clone(),
            VersionSet::range(v("1.0.0"), v("2.0.0")),
            Cause::Dependency {
                depender: a.clone(),
                dependee: c.clone(),
            },
        ));
        let right_id = store.add(Incompatibility::dependency(
            b.clone(),
            VersionSet::singleton(v("1.0.0")),
            c.clone(),
            VersionSet::range(v("2.0.0"), v("3.0.0")),
            Cause::Dependency {
                depender: b.clone(),
                dependee: c,
            },
        ));
        let left = store.get(left_id).clone();
        let right = store.get(right_id).clone();
        let derived_id = store.add(left.prior_cause(
            &right,
            &PackageIdentity::new("c"),
            left_id,
            right_id,
        ));

        let text = derivation(&store, derived_id);
        assert!(text.contains("a"), "{text}");
        assert!(text.contains("b"), "{text}");
        assert!(text.contains("depends on c"), "{text}");
    }
}
