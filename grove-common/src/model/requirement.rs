use std::fmt;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::version_set::VersionSet;

/// A constraint on the versions a dependency may resolve to.
///
/// Branch and revision requirements pin a package to a single candidate
/// the version provider reports for them; path requirements short-circuit
/// resolution entirely and are never pinned in a lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Exact(Version),
    Range(VersionSet),
    Branch(String),
    Revision(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Version,
    Branch,
    Revision,
    Path,
}

impl Requirement {
    /// The half-open range `[lower, upper)`.
    pub fn range(lower: Version, upper: Version) -> Self {
        Self::Range(VersionSet::range(lower, upper))
    }

    pub fn kind(&self) -> RequirementKind {
        match self {
            Self::Exact(_) | Self::Range(_) => RequirementKind::Version,
            Self::Branch(_) => RequirementKind::Branch,
            Self::Revision(_) => RequirementKind::Revision,
            Self::Path(_) => RequirementKind::Path,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// The set of versions this requirement admits, or `None` for path
    /// requirements (which are never version-resolved).
    ///
    /// Branch and revision requirements admit exactly their synthetic
    /// version, so the solver can treat them uniformly as singletons.
    pub fn allowed_set(&self) -> Option<VersionSet> {
        match self {
            Self::Exact(v) => Some(VersionSet::singleton(v.clone())),
            Self::Range(set) => Some(set.clone()),
            Self::Branch(_) | Self::Revision(_) => {
                self.synthetic_version().map(VersionSet::singleton)
            }
            Self::Path(_) => None,
        }
    }

    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self.allowed_set() {
            Some(set) => set.contains(version),
            // Path requirements are trivially satisfied.
            None => true,
        }
    }

    /// The placeholder version a branch or revision requirement occupies in
    /// the version ordering. Providers report the same placeholder from
    /// `available_versions` for a package addressed this way.
    pub fn synthetic_version(&self) -> Option<Version> {
        let (tag, name) = match self {
            Self::Branch(name) => ("branch", name),
            Self::Revision(rev) => ("rev", rev),
            _ => return None,
        };
        Some(synthetic_version(tag, name))
    }
}

/// `0.0.0-<tag>.<label>` with the label reduced to semver-safe characters.
///
/// Prerelease identifiers must be non-empty and, when purely numeric, free
/// of leading zeros. Labels that would violate that get an `x` prefix so
/// distinct labels never collapse onto the same placeholder.
pub fn synthetic_version(tag: &str, label: &str) -> Version {
    let mut safe: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let numeric_with_leading_zero =
        safe.len() > 1 && safe.starts_with('0') && safe.chars().all(|c| c.is_ascii_digit());
    if safe.is_empty() || numeric_with_leading_zero {
        safe.insert(0, 'x');
    }
    let mut version = Version::new(0, 0, 0);
    version.pre = semver::Prerelease::new(&format!("{tag}.{safe}"))
        .expect("sanitized label is a valid prerelease identifier");
    version
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "{v}"),
            Self::Range(set) => write!(f, "{set}"),
            Self::Branch(name) => write!(f, "branch '{name}'"),
            Self::Revision(rev) => write!(f, "revision '{rev}'"),
            Self::Path(path) => write!(f, "path '{}'", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn range_requirement_matches_half_open() {
        let req = Requirement::range(v("1.0.0"), v("2.0.0"));
        assert!(req.satisfied_by(&v("1.5.0")));
        assert!(!req.satisfied_by(&v("2.0.0")));
        assert_eq!(req.kind(), RequirementKind::Version);
    }

    #[test]
    fn branch_requirement_is_a_singleton() {
        let req = Requirement::Branch("main".into());
        let pinned = req.synthetic_version().unwrap();
        assert!(req.satisfied_by(&pinned));
        assert!(!req.satisfied_by(&v("1.0.0")));
        assert_eq!(pinned.to_string(), "0.0.0-branch.main");
    }

    #[test]
    fn branch_names_are_sanitized() {
        let req = Requirement::Branch("feature/fast-path".into());
        assert_eq!(
            req.synthetic_version().unwrap().to_string(),
            "0.0.0-branch.feature-fast-path"
        );
    }

    #[test]
    fn awkward_branch_labels_stay_distinct() {
        let padded = Requirement::Branch("007".into()).synthetic_version().unwrap();
        let plain = Requirement::Branch("7".into()).synthetic_version().unwrap();
        assert_ne!(padded, plain);
        assert_eq!(padded.to_string(), "0.0.0-branch.x007");
        assert_eq!(plain.to_string(), "0.0.0-branch.7");

        let empty = Requirement::Branch(String::new()).synthetic_version().unwrap();
        assert_eq!(empty.to_string(), "0.0.0-branch.x");
        assert_ne!(empty, Version::new(0, 0, 0));
    }

    #[test]
    fn path_requirement_never_constrains_versions() {
        let req = Requirement::Path(PathBuf::from("../local"));
        assert!(req.allowed_set().is_none());
        assert!(req.satisfied_by(&v("0.1.0")));
        assert!(req.is_path());
    }
}
