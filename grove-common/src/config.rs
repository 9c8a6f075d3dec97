// grove-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{GroveError, Result};

const LOCKFILE_NAME: &str = "grove.lock";
const REGISTRY_DIR_NAME: &str = "registry";

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_root: PathBuf,
    pub registry_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading grove configuration");

        // GROVE_ROOT overrides the workspace root, falling back to the
        // current directory.
        let workspace_root = match env::var("GROVE_ROOT").ok().filter(|s| !s.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => env::current_dir().map_err(|e| {
                GroveError::Config(format!("Could not determine working directory: {e}"))
            })?,
        };
        debug!("Effective GROVE_ROOT set to: {}", workspace_root.display());

        let registry_dir = match env::var("GROVE_REGISTRY").ok().filter(|s| !s.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let base = dirs::data_dir().unwrap_or_else(|| workspace_root.clone());
                base.join("grove").join(REGISTRY_DIR_NAME)
            }
        };
        debug!("Registry directory set to: {}", registry_dir.display());

        Ok(Self {
            workspace_root,
            registry_dir,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn registry_dir(&self) -> &Path {
        &self.registry_dir
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.workspace_root.join(LOCKFILE_NAME)
    }

    pub fn root_manifest_path(&self) -> PathBuf {
        self.workspace_root.join("grove.json")
    }
}
