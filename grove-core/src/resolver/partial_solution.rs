use std::collections::{BTreeMap, HashMap};

use grove_common::PackageIdentity;
use semver::Version;
use tracing::trace;

use super::incompatibility::{IncompatId, Incompatibility};
use super::term::Term;

/// One entry in the assignment log: a decision (chosen version) or a
/// derivation (term forced by an incompatibility).
#[derive(Debug, Clone)]
pub struct Assignment {
    pub package: PackageIdentity,
    pub term: Term,
    pub decision_level: usize,
    /// `None` marks a decision; derivations record their responsible
    /// incompatibility.
    pub cause: Option<IncompatId>,
}

impl Assignment {
    pub fn is_decision(&self) -> bool {
        self.cause.is_none()
    }
}

/// How an incompatibility relates to the current assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Every term holds: the incompatibility is violated.
    Satisfied,
    /// Every term but this package's holds: its negation can be derived.
    AlmostSatisfied(PackageIdentity),
    /// Some term can no longer hold; the incompatibility is inert.
    Contradicted,
    Inconclusive,
}

/// The ordered log of assignments plus per-package accumulated knowledge.
///
/// Assignments are only ever appended; backtracking truncates the log to
/// a decision level and rebuilds the accumulated view, never splicing.
#[derive(Debug, Default)]
pub struct PartialSolution {
    log: Vec<Assignment>,
    decisions: HashMap<PackageIdentity, Version>,
    accumulated: HashMap<PackageIdentity, Term>,
    decision_level: usize,
}

impl PartialSolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision_level(&self) -> usize {
        self.decision_level
    }

    pub fn decided(&self, package: &PackageIdentity) -> Option<&Version> {
        self.decisions.get(package)
    }

    pub fn accumulated(&self, package: &PackageIdentity) -> Option<&Term> {
        self.accumulated.get(package)
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.log
    }

    /// All packages the log has positive knowledge about, without a
    /// decision yet. These are the packages still awaiting a choice.
    pub fn undecided_packages(&self) -> Vec<PackageIdentity> {
        let mut out: Vec<_> = self
            .accumulated
            .iter()
            .filter(|(package, term)| term.positive && !self.decisions.contains_key(*package))
            .map(|(package, _)| package.clone())
            .collect();
        out.sort();
        out
    }

    pub fn decide(&mut self, package: PackageIdentity, version: Version) {
        self.decision_level += 1;
        trace!(
            "decision level {}: {package} = {version}",
            self.decision_level
        );
        let term = Term::exactly(version.clone());
        self.push(Assignment {
            package: package.clone(),
            term,
            decision_level: self.decision_level,
            cause: None,
        });
        self.decisions.insert(package, version);
    }

    pub fn derive(&mut self, package: PackageIdentity, term: Term, cause: IncompatId) {
        trace!(
            "derived at level {}: {package} {term} (cause {cause})",
            self.decision_level
        );
        self.push(Assignment {
            package,
            term,
            decision_level: self.decision_level,
            cause: Some(cause),
        });
    }

    fn push(&mut self, assignment: Assignment) {
        self.accumulated
            .entry(assignment.package.clone())
            .and_modify(|acc| *acc = acc.intersection(&assignment.term))
            .or_insert_with(|| assignment.term.clone());
        self.log.push(assignment);
    }

    /// Truncate the log to `level`, dropping every later assignment and
    /// rebuilding the accumulated view from what remains.
    pub fn backtrack(&mut self, level: usize) {
        trace!(
            "backtracking from level {} to level {level}",
            self.decision_level
        );
        self.log.retain(|a| a.decision_level <= level);
        self.decision_level = level;
        self.accumulated.clear();
        for assignment in &self.log {
            self.accumulated
                .entry(assignment.package.clone())
                .and_modify(|acc| *acc = acc.intersection(&assignment.term))
                .or_insert_with(|| assignment.term.clone());
        }
        let still_decided: std::collections::HashSet<PackageIdentity> = self
            .log
            .iter()
            .filter(|a| a.is_decision())
            .map(|a| a.package.clone())
            .collect();
        self.decisions
            .retain(|package, _| still_decided.contains(package));
    }

    /// Relation of `incompat` to the assignments made so far.
    pub fn relation(&self, incompat: &Incompatibility) -> Relation {
        relation_with(incompat, |package| self.accumulated.get(package).cloned())
    }

    /// Index of the earliest assignment such that `incompat` is satisfied
    /// by the log up to and including it. Callers must only invoke this
    /// when the incompatibility is currently satisfied.
    pub fn satisfier_index(&self, incompat: &Incompatibility) -> usize {
        let mut partial: BTreeMap<PackageIdentity, Term> = BTreeMap::new();
        for (index, assignment) in self.log.iter().enumerate() {
            if !incompat.terms.contains_key(&assignment.package) {
                continue;
            }
            apply(&mut partial, &assignment.package, &assignment.term);
            if relation_with(incompat, |p| partial.get(p).cloned()) == Relation::Satisfied {
                return index;
            }
        }
        unreachable!("satisfier_index called on an unsatisfied incompatibility")
    }

    /// Decision level of the earliest assignment before `satisfier` that,
    /// together with the satisfier itself, satisfies `incompat`; level 1
    /// (the root level) if no prefix assignment is needed.
    pub fn previous_satisfier_level(
        &self,
        incompat: &Incompatibility,
        satisfier: usize,
    ) -> usize {
        let satisfier_assignment = &self.log[satisfier];
        let mut partial: BTreeMap<PackageIdentity, Term> = BTreeMap::new();
        apply(
            &mut partial,
            &satisfier_assignment.package,
            &satisfier_assignment.term,
        );
        if relation_with(incompat, |p| partial.get(p).cloned()) == Relation::Satisfied {
            return 1;
        }
        for assignment in self.log.iter().take(satisfier) {
            if !incompat.terms.contains_key(&assignment.package) {
                continue;
            }
            apply(&mut partial, &assignment.package, &assignment.term);
            if relation_with(incompat, |p| partial.get(p).cloned()) == Relation::Satisfied {
                return assignment.decision_level.max(1);
            }
        }
        1
    }
}

fn apply(view: &mut BTreeMap<PackageIdentity, Term>, package: &PackageIdentity, term: &Term) {
    view.entry(package.clone())
        .and_modify(|acc| *acc = acc.intersection(term))
        .or_insert_with(|| term.clone());
}

fn relation_with(
    incompat: &Incompatibility,
    lookup: impl Fn(&PackageIdentity) -> Option<Term>,
) -> Relation {
    let mut unsatisfied: Option<&PackageIdentity> = None;
    for (package, term) in &incompat.terms {
        match lookup(package) {
            None => {
                if unsatisfied.is_some() {
                    return Relation::Inconclusive;
                }
                unsatisfied = Some(package);
            }
            Some(accumulated) => {
                let overlap = accumulated.intersection(term);
                if overlap == accumulated {
                    // accumulated ⊆ term: the term necessarily holds.
                } else if overlap.is_never() {
                    return Relation::Contradicted;
                } else {
                    if unsatisfied.is_some() {
                        return Relation::Inconclusive;
                    }
                    unsatisfied = Some(package);
                }
            }
        }
    }
    match unsatisfied {
        None => Relation::Satisfied,
        Some(package) => Relation::AlmostSatisfied(package.clone()),
    }
}

#[cfg(test)]
mod tests {
    use grove_common::VersionSet;

    use super::super::incompatibility::Cause;
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn pkg(s: &str) -> PackageIdentity {
        PackageIdentity::new(s)
    }

    #[test]
    fn backtrack_truncates_to_level() {
        let mut solution = PartialSolution::new();
        solution.decide(pkg("root"), v("0.0.0"));
        solution.derive(
            pkg("a"),
            Term::positive(VersionSet::range(v("1.0.0"), v("2.0.0"))),
            0,
        );
        solution.decide(pkg("a"), v("1.5.0"));
        solution.derive(
            pkg("b"),
            Term::positive(VersionSet::range(v("1.0.0"), v("1.1.0"))),
            1,
        );
        assert_eq!(solution.decision_level(), 2);
        assert!(solution.decided(&pkg("a")).is_some());

        solution.backtrack(1);
        assert_eq!(solution.decision_level(), 1);
        assert!(solution.decided(&pkg("a")).is_none());
        assert!(solution.decided(&pkg("root")).is_some());
        // a's range derivation (level 1) survives; b's (level 2) does not.
        assert!(solution.accumulated(&pkg("a")).is_some());
        assert!(solution.accumulated(&pkg("b")).is_none());
    }

    #[test]
    fn relation_tracks_incompatibility_state() {
        let mut solution = PartialSolution::new();
        let incompat = Incompatibility::dependency(
            pkg("a"),
            VersionSet::singleton(v("1.0.0")),
            pkg("b"),
            VersionSet::range(v("1.0.0"), v("2.0.0")),
            Cause::Root,
        );

        assert_eq!(solution.relation(&incompat), Relation::Inconclusive);

        solution.decide(pkg("a"), v("1.0.0"));
        assert_eq!(
            solution.relation(&incompat),
            Relation::AlmostSatisfied(pkg("b"))
        );

        // b pinned outside the required range: every term holds, the
        // incompatibility is violated.
        solution.decide(pkg("b"), v("2.5.0"));
        assert_eq!(solution.relation(&incompat), Relation::Satisfied);
    }

    #[test]
    fn contradicted_when_a_term_cannot_hold() {
        let mut solution = PartialSolution::new();
        let incompat = Incompatibility::dependency(
            pkg("a"),
            VersionSet::singleton(v("1.0.0")),
            pkg("b"),
            VersionSet::range(v("1.0.0"), v("2.0.0")),
            Cause::Root,
        );
        solution.decide(pkg("a"), v("9.9.9"));
        assert_eq!(solution.relation(&incompat), Relation::Contradicted);
    }

    #[test]
    fn undecided_packages_are_sorted_and_positive_only() {
        let mut solution = PartialSolution::new();
        solution.derive(pkg("zeta"), Term::positive(VersionSet::any()), 0);
        solution.derive(pkg("alpha"), Term::positive(VersionSet::any()), 0);
        solution.derive(
            pkg("omega"),
            Term::negative(VersionSet::singleton(v("1.0.0"))),
            0,
        );
        assert_eq!(
            solution.undecided_packages(),
            vec![pkg("alpha"), pkg("zeta")]
        );
    }
}
