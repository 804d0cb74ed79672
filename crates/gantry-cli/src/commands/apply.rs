//! Apply command - create or update resources, then prune removed ones

use clap::Args;
use console::style;
use gantry_client::{ApplyOptions, ReconcileOptions, reconcile};

use super::{ManifestArgs, Session, check_failures};
use crate::config::GantryConfig;
use crate::display::{print_apply_results, print_delete_results};
use crate::error::Result;

#[derive(Debug, Clone, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifests: ManifestArgs,

    /// Validate on the backend without persisting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Show the difference with the remote version of each resource
    #[arg(long)]
    pub diff: bool,

    /// Concurrent backend calls (defaults to the configured parallelism)
    #[arg(short, long)]
    pub parallelism: Option<usize>,

    /// Do not read or update the state, and never delete anything
    #[arg(long)]
    pub no_state: bool,

    /// Require a priority and complete metadata schemas in API descriptions
    #[arg(long)]
    pub strict_catalog: bool,
}

/// Run the apply command
pub async fn run(config: &GantryConfig, args: &ApplyArgs) -> Result<()> {
    let resources = args.manifests.load(config)?;
    let session = Session::connect(config, false, args.strict_catalog).await?;
    let storage = if args.no_state {
        None
    } else {
        config.state_storage()?
    };

    let options = ReconcileOptions {
        apply: ApplyOptions {
            dry_run: args.dry_run,
            diff: args.diff,
        },
        max_parallel: args.parallelism.unwrap_or(config.parallelism),
    };

    let report = reconcile(
        session.dispatcher.clone(),
        &session.catalog,
        resources,
        storage.as_deref(),
        options,
    )
    .await?;

    print_apply_results(&report.applied, args.dry_run);
    if !report.deleted.is_empty() {
        let verb = if args.dry_run { "Would remove" } else { "Removing" };
        println!(
            "{} {} {} resource(s) no longer in the manifests",
            style("→").blue().bold(),
            verb,
            report.deleted.len()
        );
        print_delete_results(&report.deleted, args.dry_run);
    }

    check_failures(
        report.failure_count(),
        report.applied.len() + report.deleted.len(),
    )
}
