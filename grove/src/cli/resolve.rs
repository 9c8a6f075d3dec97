use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use grove_common::config::Config;
use grove_common::error::{GroveError, Result};
use grove_common::PackageManifest;
use grove_core::Session;
use prettytable::{format, Cell, Row, Table};

use crate::registry::FsRegistry;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Also print the reachable modules and their dependencies
    #[arg(long)]
    pub modules: bool,
}

impl ResolveArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let root = load_root_manifest(config)?;
        let registry = Arc::new(FsRegistry::new(config.registry_dir()));
        let session = Session::new(registry.clone(), registry, config.lockfile_path());

        let outcome = session
            .resolve(&root)
            .await
            .map_err(|e| GroveError::Generic(format!("{e}")))?;

        if outcome.reused_lockfile {
            println!(
                "{} ({} packages, lockfile reused)",
                "Resolved".green().bold(),
                outcome.solution.packages.len()
            );
        } else {
            println!(
                "{} ({} packages, lockfile updated)",
                "Resolved".green().bold(),
                outcome.solution.packages.len()
            );
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        table.add_row(Row::new(vec![
            Cell::new("Package").style_spec("b"),
            Cell::new("Version").style_spec("b"),
        ]));
        for (identity, resolved) in &outcome.solution.packages {
            table.add_row(Row::new(vec![
                Cell::new(&identity.to_string()),
                Cell::new(&resolved.version.to_string()),
            ]));
        }
        table.printstd();

        if self.modules {
            println!();
            println!("{}", "Modules".bold());
            for module in &outcome.graph.modules {
                if module.dependencies.is_empty() {
                    println!("  {}", module.name);
                } else {
                    println!("  {} -> {}", module.name, module.dependencies.join(", "));
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn load_root_manifest(config: &Config) -> Result<PackageManifest> {
    let path = config.root_manifest_path();
    let text = std::fs::read_to_string(&path).map_err(|e| {
        GroveError::Config(format!(
            "Could not read root manifest at {}: {e}",
            path.display()
        ))
    })?;
    let manifest: PackageManifest = serde_json::from_str(&text)?;
    Ok(manifest)
}
