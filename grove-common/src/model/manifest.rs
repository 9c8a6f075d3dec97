use serde::{Deserialize, Serialize};

use super::identity::PackageIdentity;
use super::platform::PlatformCondition;
use super::requirement::Requirement;

/// Structured description of one package at one concrete version, as
/// returned by a manifest provider. This is pure data; evaluating whatever
/// source format produced it is somebody else's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub identity: PackageIdentity,
    #[serde(default)]
    pub dependencies: Vec<DeclaredDependency>,
    #[serde(default)]
    pub targets: Vec<TargetDescription>,
    #[serde(default)]
    pub products: Vec<ProductDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub identity: PackageIdentity,
    pub requirement: Requirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<PlatformCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescription {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<PlatformCondition>,
}

/// A target depends either on a sibling target of the same package or on a
/// product exposed by a dependency package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDependency {
    Target {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<PlatformCondition>,
    },
    Product {
        name: String,
        package: PackageIdentity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<PlatformCondition>,
    },
}

impl TargetDependency {
    pub fn condition(&self) -> Option<&PlatformCondition> {
        match self {
            Self::Target { condition, .. } | Self::Product { condition, .. } => condition.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDescription {
    pub name: String,
    pub targets: Vec<String>,
}

impl PackageManifest {
    pub fn new(identity: PackageIdentity) -> Self {
        Self {
            identity,
            dependencies: Vec::new(),
            targets: Vec::new(),
            products: Vec::new(),
        }
    }

    pub fn product(&self, name: &str) -> Option<&ProductDescription> {
        self.products.iter().find(|p| p.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&TargetDescription> {
        self.targets.iter().find(|t| t.name == name)
    }
}
