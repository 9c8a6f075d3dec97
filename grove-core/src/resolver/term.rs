use std::fmt;

use grove_common::VersionSet;
use semver::Version;

/// An atomic claim about one package: its version is (positive) or is not
/// (negative) within a set. The package itself is keyed by the containing
/// incompatibility or assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub positive: bool,
    pub set: VersionSet,
}

impl Term {
    pub fn positive(set: VersionSet) -> Self {
        Self {
            positive: true,
            set,
        }
    }

    pub fn negative(set: VersionSet) -> Self {
        Self {
            positive: false,
            set,
        }
    }

    pub fn exactly(version: Version) -> Self {
        Self::positive(VersionSet::singleton(version))
    }

    /// The term that is true exactly when `self` is false.
    pub fn negate(&self) -> Self {
        Self {
            positive: !self.positive,
            set: self.set.clone(),
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        if self.positive {
            self.set.contains(version)
        } else {
            !self.set.contains(version)
        }
    }

    /// Conjunction of two claims about the same package, normalized so the
    /// result is positive whenever either operand is.
    pub fn intersection(&self, other: &Self) -> Self {
        match (self.positive, other.positive) {
            (true, true) => Self::positive(self.set.intersect(&other.set)),
            (false, false) => Self::negative(self.set.union(&other.set)),
            (true, false) => Self::positive(self.set.intersect(&other.set.complement())),
            (false, true) => Self::positive(other.set.intersect(&self.set.complement())),
        }
    }

    /// Disjunction, via De Morgan over [`Term::intersection`].
    pub fn union(&self, other: &Self) -> Self {
        self.negate().intersection(&other.negate()).negate()
    }

    pub fn subset_of(&self, other: &Self) -> bool {
        self.intersection(other) == *self
    }

    /// No version satisfies this claim: positive over the empty set, or
    /// negative over the full set.
    pub fn is_never(&self) -> bool {
        if self.positive {
            self.set.is_empty()
        } else {
            self.set.complement().is_empty()
        }
    }

    /// Every version satisfies this claim: negative over the empty set, or
    /// positive over the full set.
    pub fn is_always(&self) -> bool {
        if self.positive {
            self.set.complement().is_empty()
        } else {
            self.set.is_empty()
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.set)
        } else {
            write!(f, "not {}", self.set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(lo: &str, hi: &str) -> VersionSet {
        VersionSet::range(v(lo), v(hi))
    }

    #[test]
    fn negation_flips_membership() {
        let t = Term::positive(range("1.0.0", "2.0.0"));
        assert!(t.contains(&v("1.5.0")));
        assert!(!t.negate().contains(&v("1.5.0")));
        assert!(t.negate().contains(&v("2.5.0")));
    }

    #[test]
    fn intersection_of_mixed_polarity_is_positive() {
        let pos = Term::positive(range("1.0.0", "3.0.0"));
        let neg = Term::negative(range("2.0.0", "3.0.0"));
        let both = pos.intersection(&neg);
        assert!(both.positive);
        assert!(both.contains(&v("1.5.0")));
        assert!(!both.contains(&v("2.5.0")));
    }

    #[test]
    fn union_of_exact_complements_is_always() {
        let t = Term::positive(range("1.0.0", "2.0.0"));
        assert!(t.union(&t.negate()).is_always());
    }

    #[test]
    fn full_and_empty_sets_are_tautology_and_contradiction() {
        assert!(Term::positive(VersionSet::any()).is_always());
        assert!(Term::negative(VersionSet::any()).is_never());
        assert!(Term::positive(VersionSet::empty()).is_never());
        assert!(Term::negative(VersionSet::empty()).is_always());
    }

    #[test]
    fn subset_relation() {
        let narrow = Term::positive(range("1.2.0", "1.4.0"));
        let wide = Term::positive(range("1.0.0", "2.0.0"));
        assert!(narrow.subset_of(&wide));
        assert!(!wide.subset_of(&narrow));

        let decision = Term::exactly(v("1.3.0"));
        assert!(decision.subset_of(&narrow));
        assert!(decision.subset_of(&wide.negate().negate()));
    }
}
