//! Conflict-driven version resolution.
//!
//! The engine searches over partial assignments of package → version,
//! pruning with learned incompatibilities in the manner of PubGrub: unit
//! propagation forces assignments, conflicts combine two prior
//! incompatibilities into a more general one, and backtracking truncates
//! the assignment log to a decision level.

mod explain;
mod incompatibility;
mod partial_solution;
mod solver;
mod term;

pub use incompatibility::{Cause, Incompatibility, IncompatibilityStore};
pub use partial_solution::{Assignment, PartialSolution, Relation};
pub use solver::{ResolvedVersion, Resolver, Solution};
pub use term::Term;

use grove_common::PackageIdentity;
use thiserror::Error;

use crate::provider::ProviderError;

/// Why a resolution failed. Every variant carries exactly what its
/// user-facing explanation needs.
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("version conflict:\n{explanation}")]
    VersionConflict { explanation: String },

    #[error("package '{0}' not found")]
    PackageNotFound(PackageIdentity),

    #[error("no version of '{0}' has a usable manifest")]
    NoUsableVersion(PackageIdentity),

    #[error("provider error: {0}")]
    Provider(ProviderError),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("resolution exceeded the decision limit")]
    DecisionLimitExceeded,
}

impl From<ProviderError> for ResolutionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(identity) => Self::PackageNotFound(identity),
            ProviderError::Cancelled => Self::Cancelled,
            other => Self::Provider(other),
        }
    }
}

/// Synthetic package standing for the set of root requirements. It is
/// decided first, at a version no real package can collide with, and is
/// excluded from solutions and lockfiles.
pub(crate) fn root_identity() -> PackageIdentity {
    PackageIdentity::new("(root)")
}
