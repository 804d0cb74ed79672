//! Delete command - remove the resources described by manifests

use clap::Args;
use gantry_client::delete_all;
use gantry_core::sort_for_delete;

use super::{ManifestArgs, Session, check_failures};
use crate::config::GantryConfig;
use crate::display::print_delete_results;
use crate::error::Result;

#[derive(Debug, Clone, Args)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub manifests: ManifestArgs,

    /// Show what would be deleted without calling the backend
    #[arg(long)]
    pub dry_run: bool,

    /// Concurrent backend calls (defaults to the configured parallelism)
    #[arg(short, long)]
    pub parallelism: Option<usize>,

    /// Do not untrack deleted resources from the state
    #[arg(long)]
    pub no_state: bool,
}

/// Run the delete command
pub async fn run(config: &GantryConfig, args: &DeleteArgs) -> Result<()> {
    let resources = args.manifests.load(config)?;
    let session = Session::connect(config, false, false).await?;
    let storage = if args.no_state || args.dry_run {
        None
    } else {
        config.state_storage()?
    };

    // Load first so a broken state fails before anything is deleted
    let state = match &storage {
        Some(storage) => Some(storage.load().await?),
        None => None,
    };

    let sorted = sort_for_delete(&session.catalog, resources);
    let results = delete_all(
        session.dispatcher.clone(),
        sorted,
        args.dry_run,
        args.parallelism.unwrap_or(config.parallelism),
    )
    .await;
    print_delete_results(&results, args.dry_run);

    if let (Some(storage), Some(mut state)) = (storage, state) {
        for result in results.iter().filter(|r| r.is_success()) {
            state.remove_managed(&result.resource);
        }
        storage.save(&state).await?;
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    check_failures(failed, results.len())
}
