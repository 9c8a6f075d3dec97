use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Self::Macos
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        };
        write!(f, "{name}")
    }
}

/// Restricts a dependency edge or target to a set of platforms. An empty
/// platform list means "no platform satisfies this", which manifests
/// should never produce; absence of a condition means unconditional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCondition {
    pub platforms: Vec<Platform>,
}

impl PlatformCondition {
    pub fn only(platforms: Vec<Platform>) -> Self {
        Self { platforms }
    }

    pub fn applies_to(&self, host: Platform) -> bool {
        self.platforms.contains(&host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_filters_by_host() {
        let cond = PlatformCondition::only(vec![Platform::Linux, Platform::Macos]);
        assert!(cond.applies_to(Platform::Linux));
        assert!(!cond.applies_to(Platform::Windows));
    }
}
