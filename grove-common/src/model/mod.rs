// grove-common/src/model/mod.rs
pub mod identity;
pub mod manifest;
pub mod platform;
pub mod requirement;
pub mod version_set;

pub use identity::PackageIdentity;
pub use manifest::{
    DeclaredDependency, PackageManifest, ProductDescription, TargetDependency, TargetDescription,
};
pub use platform::{Platform, PlatformCondition};
pub use requirement::{Requirement, RequirementKind};
pub use version_set::VersionSet;
