//! Kinds command - show the catalog in use

use clap::Args;
use console::style;
use gantry_core::Catalog;

use super::Session;
use crate::config::GantryConfig;
use crate::error::Result;

#[derive(Debug, Clone, Args)]
pub struct KindsArgs {
    /// Use the bundled catalogs without contacting any backend
    #[arg(long)]
    pub offline: bool,

    /// Require a priority and complete metadata schemas in API descriptions
    #[arg(long)]
    pub strict_catalog: bool,
}

/// Run the kinds command
pub async fn run(config: &GantryConfig, args: &KindsArgs) -> Result<()> {
    let session = Session::connect(config, args.offline, args.strict_catalog).await?;
    print_catalog(&session.catalog);
    Ok(())
}

fn print_catalog(catalog: &Catalog) {
    println!(
        "{:<32} {:<8} {:<9} {:<8} {}",
        style("KIND").bold(),
        style("VERSION").bold(),
        style("PRIORITY").bold(),
        style("BACKEND").bold(),
        style("PARENTS").bold()
    );
    for kind in catalog.kinds() {
        for version in kind.versions() {
            let parents: Vec<&str> = version
                .parent_path_params
                .iter()
                .chain(&version.parent_query_params)
                .map(String::as_str)
                .collect();
            println!(
                "{:<32} {:<8} {:<9} {:<8} {}",
                kind.name,
                format!("v{}", version.version),
                version.priority.to_string(),
                version.backend.backend().to_string(),
                parents.join(",")
            );
        }
    }

    let runs: Vec<_> = catalog.runs().collect();
    if !runs.is_empty() {
        println!();
        println!(
            "{:<32} {:<8} {}",
            style("RUN").bold(),
            style("METHOD").bold(),
            style("PATH").bold()
        );
        for run in runs {
            println!("{:<32} {:<8} {}", run.name, run.method, run.path);
        }
    }
}
