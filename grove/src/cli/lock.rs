use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use grove_common::config::Config;
use grove_common::error::{GroveError, Result};
use grove_common::Platform;
use grove_core::{FastPathResult, LockfileManager, ProviderCache, Session};
use tokio_util::sync::CancellationToken;

use crate::cli::resolve::load_root_manifest;
use crate::registry::FsRegistry;

#[derive(Args, Debug)]
pub struct LockArgs {
    /// Verify the lockfile against the current requirements without
    /// writing anything; exits nonzero when it is stale
    #[arg(long)]
    pub check: bool,
}

impl LockArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let root = load_root_manifest(config)?;
        let registry = Arc::new(FsRegistry::new(config.registry_dir()));

        if self.check {
            let providers =
                ProviderCache::new(registry.clone(), registry, CancellationToken::new());
            let manager = LockfileManager::new(config.lockfile_path());
            let result = manager
                .reconcile(&root.dependencies, &providers, Platform::host())
                .await
                .map_err(|e| GroveError::Generic(format!("{e}")))?;
            return match result {
                FastPathResult::Reused(solution) => {
                    println!(
                        "{} ({} pins)",
                        "Lockfile is up to date".green().bold(),
                        solution.packages.len()
                    );
                    Ok(())
                }
                FastPathResult::Stale(_) => Err(GroveError::Generic(
                    "lockfile is stale; run 'grove lock' to update it".to_string(),
                )),
                FastPathResult::Missing => Err(GroveError::Generic(
                    "no lockfile found; run 'grove lock' to create one".to_string(),
                )),
            };
        }

        let session = Session::new(registry.clone(), registry, config.lockfile_path());
        let outcome = session
            .resolve(&root)
            .await
            .map_err(|e| GroveError::Generic(format!("{e}")))?;

        if outcome.reused_lockfile {
            println!("{}", "Lockfile already up to date".green().bold());
        } else {
            println!(
                "{} ({} pins written to {})",
                "Lockfile updated".green().bold(),
                outcome.solution.packages.len(),
                config.lockfile_path().display()
            );
        }
        Ok(())
    }
}
