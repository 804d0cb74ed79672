//! Batch-apply command - let the console apply the whole set as one job

use clap::Args;
use gantry_client::{BatchOptions, CancelFlag, batch_apply};
use gantry_core::Backend;

use super::{ManifestArgs, check_failures};
use crate::config::GantryConfig;
use crate::display::BatchProgress;
use crate::error::Result;

#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    #[command(flatten)]
    pub manifests: ManifestArgs,

    /// fail-fast or continue-on-error
    #[arg(long, default_value = "fail-fast")]
    pub strategy: String,

    #[arg(long)]
    pub dry_run: bool,

    /// Ask the server for a diff of each resource
    #[arg(long)]
    pub print_diff: bool,

    /// Confirm batches of more than 50 resources
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the batch-apply command
pub async fn run(config: &GantryConfig, args: &BatchArgs) -> Result<()> {
    let resources = args.manifests.load(config)?;
    let client = config.require_client(Backend::Console)?;

    let options = BatchOptions {
        dry_run: args.dry_run,
        print_diff: args.print_diff,
        strategy: args.strategy.clone(),
        confirm_large: args.yes,
        cancel_timeout: config.cancel_timeout,
        ..Default::default()
    };

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let progress = BatchProgress::new(resources.len(), args.print_diff);
    let outcome = batch_apply(&client, &resources, &options, &cancel, &progress).await;
    progress.finish();

    let results = outcome?;
    let failed = results.iter().filter(|r| !r.is_success()).count();
    check_failures(failed, results.len())
}
