// grove-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;

// Re-export key types
pub use config::Config;
pub use error::{GroveError, Result};
pub use model::{
    DeclaredDependency, PackageIdentity, PackageManifest, Platform, PlatformCondition,
    ProductDescription, Requirement, RequirementKind, TargetDependency, TargetDescription,
    VersionSet,
};
