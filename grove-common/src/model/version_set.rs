use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use semver::Version;
use serde::{Deserialize, Serialize};

/// A set of versions, stored as a sorted union of disjoint intervals.
///
/// Every operation the solver needs is closed over this representation:
/// intersection, union, complement, containment and emptiness checks.
/// Normalization (sorted, disjoint, gap-separated segments) is maintained
/// by construction, so structural equality is set equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSet {
    segments: Vec<(Bound<Version>, Bound<Version>)>,
}

impl VersionSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self { segments: vec![] }
    }

    /// The set of all versions.
    pub fn any() -> Self {
        Self {
            segments: vec![(Bound::Unbounded, Bound::Unbounded)],
        }
    }

    /// The set containing exactly one version.
    pub fn singleton(v: Version) -> Self {
        Self {
            segments: vec![(Bound::Included(v.clone()), Bound::Included(v))],
        }
    }

    /// The half-open range `[lower, upper)`.
    pub fn range(lower: Version, upper: Version) -> Self {
        Self::from_bounds(Bound::Included(lower), Bound::Excluded(upper))
    }

    /// `[v, ∞)`.
    pub fn at_least(v: Version) -> Self {
        Self::from_bounds(Bound::Included(v), Bound::Unbounded)
    }

    /// `(-∞, v)`.
    pub fn strictly_below(v: Version) -> Self {
        Self::from_bounds(Bound::Unbounded, Bound::Excluded(v))
    }

    /// A single interval from explicit bounds. Empty intervals collapse to
    /// the empty set.
    pub fn from_bounds(lower: Bound<Version>, upper: Bound<Version>) -> Self {
        if interval_is_valid(&lower, &upper) {
            Self {
                segments: vec![(lower, upper)],
            }
        } else {
            Self::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn contains(&self, v: &Version) -> bool {
        self.segments.iter().any(|(lo, hi)| {
            let above = match lo {
                Bound::Unbounded => true,
                Bound::Included(l) => v >= l,
                Bound::Excluded(l) => v > l,
            };
            let below = match hi {
                Bound::Unbounded => true,
                Bound::Included(h) => v <= h,
                Bound::Excluded(h) => v < h,
            };
            above && below
        })
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.segments.len() && j < other.segments.len() {
            let (a_lo, a_hi) = &self.segments[i];
            let (b_lo, b_hi) = &other.segments[j];
            let lo = max_lower(a_lo, b_lo).clone();
            let hi = min_upper(a_hi, b_hi).clone();
            if interval_is_valid(&lo, &hi) {
                out.push((lo, hi));
            }
            // Advance whichever interval ends first.
            if cmp_upper(a_hi, b_hi) == Ordering::Less {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { segments: out }
    }

    pub fn complement(&self) -> Self {
        let mut segments = Vec::new();
        let mut cursor: Option<Bound<Version>> = Some(Bound::Unbounded);
        for (lo, hi) in &self.segments {
            if let Some(start) = cursor.take() {
                match lo {
                    Bound::Unbounded => {}
                    Bound::Included(v) => segments.push((start, Bound::Excluded(v.clone()))),
                    Bound::Excluded(v) => segments.push((start, Bound::Included(v.clone()))),
                }
            }
            cursor = match hi {
                Bound::Unbounded => None,
                Bound::Included(v) => Some(Bound::Excluded(v.clone())),
                Bound::Excluded(v) => Some(Bound::Included(v.clone())),
            };
        }
        if let Some(start) = cursor {
            segments.push((start, Bound::Unbounded));
        }
        Self { segments }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersect(&other.complement())
            .complement()
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersect(other).is_empty()
    }

    pub fn subset_of(&self, other: &Self) -> bool {
        self.intersect(other) == *self
    }
}

/// Does `[lower, upper]` describe a non-empty interval?
fn interval_is_valid(lower: &Bound<Version>, upper: &Bound<Version>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
    }
}

fn cmp_lower(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        // At the same version an inclusive lower bound admits more.
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

fn cmp_upper(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        // At the same version an inclusive upper bound admits more.
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

fn max_lower<'a>(a: &'a Bound<Version>, b: &'a Bound<Version>) -> &'a Bound<Version> {
    if cmp_lower(a, b) == Ordering::Less {
        b
    } else {
        a
    }
}

fn min_upper<'a>(a: &'a Bound<Version>, b: &'a Bound<Version>) -> &'a Bound<Version> {
    if cmp_upper(a, b) == Ordering::Greater {
        b
    } else {
        a
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "∅");
        }
        for (idx, (lo, hi)) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, " or ")?;
            }
            match (lo, hi) {
                (Bound::Unbounded, Bound::Unbounded) => write!(f, "*")?,
                (Bound::Included(l), Bound::Included(h)) if l == h => write!(f, "{l}")?,
                (lo, hi) => {
                    let mut parts = Vec::new();
                    match lo {
                        Bound::Unbounded => {}
                        Bound::Included(l) => parts.push(format!(">={l}")),
                        Bound::Excluded(l) => parts.push(format!(">{l}")),
                    }
                    match hi {
                        Bound::Unbounded => {}
                        Bound::Included(h) => parts.push(format!("<={h}")),
                        Bound::Excluded(h) => parts.push(format!("<{h}")),
                    }
                    write!(f, "{}", parts.join(", "))?;
                }
            }
        }
        Ok(())
    }
}
