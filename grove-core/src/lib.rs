// grove-core/src/lib.rs
//! Version resolution and package-graph construction for grove.
//!
//! The crate is organized around three cooperating pieces:
//! - [`resolver`]: a conflict-driven (PubGrub-style) search that maps a set
//!   of root requirements onto one consistent version per package,
//! - [`graph`]: expansion of a resolved version set into a validated graph
//!   of targets, products and modules,
//! - [`lockfile`]: persistence of a resolution as a deterministic pin list
//!   with a fast re-validation path.
//!
//! Provider traits in [`provider`] are the only way any of this touches
//! the outside world; implementations are injected, never looked up.
pub mod graph;
pub mod lockfile;
pub mod provider;
pub mod resolver;
pub mod session;

pub use graph::{GraphError, Module, PackageGraph, Product, ResolvedPackage, Target};
pub use lockfile::{FastPathResult, Lockfile, LockfileError, LockfileManager, Pin};
pub use provider::{
    ManifestError, ManifestProvider, ProviderCache, ProviderError, VersionProvider,
};
pub use resolver::{ResolutionError, ResolvedVersion, Resolver, Solution};
pub use session::{Outcome, Session, SessionError};
