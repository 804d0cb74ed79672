//! State commands - inspect and edit the managed resource record

use clap::Subcommand;
use console::style;
use gantry_state::StateStorage;

use crate::config::GantryConfig;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Subcommand)]
pub enum StateCommand {
    /// List managed resources
    Show {
        /// Print the raw state document
        #[arg(long)]
        json: bool,
    },

    /// Stop managing a resource without deleting it
    Untrack {
        /// Kind name
        kind: String,
        /// Resource name
        name: String,
    },
}

/// Run a state subcommand
pub async fn run(config: &GantryConfig, command: &StateCommand) -> Result<()> {
    let storage = config.state_storage()?.ok_or_else(|| {
        CliError::input_with_help(
            "no state location configured",
            "pass --state <path or URI> or set GANTRY_STATE",
        )
    })?;

    match command {
        StateCommand::Show { json } => show(storage.as_ref(), *json).await,
        StateCommand::Untrack { kind, name } => untrack(storage.as_ref(), kind, name).await,
    }
}

async fn show(storage: &dyn StateStorage, json: bool) -> Result<()> {
    let state = storage.load().await?;

    if json {
        let text = serde_json::to_string_pretty(&state).map_err(|e| CliError::State {
            message: e.to_string(),
            help: None,
        })?;
        println!("{}", text);
        return Ok(());
    }

    if state.is_empty() {
        println!("No managed resources in {}", storage.describe());
        return Ok(());
    }

    println!(
        "{:<28} {:<10} {:<32} {}",
        style("KIND").bold(),
        style("VERSION").bold(),
        style("NAME").bold(),
        style("SCOPE").bold()
    );
    for record in &state.resources {
        let scope: Vec<String> = record
            .metadata
            .iter()
            .filter(|(k, _)| k.as_str() != "name" && k.as_str() != "labels")
            .map(|(k, v)| match v.as_str() {
                Some(s) => format!("{}={}", k, s),
                None => format!("{}={}", k, v),
            })
            .collect();
        println!(
            "{:<28} {:<10} {:<32} {}",
            record.kind,
            record.api_version,
            record.name().unwrap_or("<unnamed>"),
            scope.join(",")
        );
    }
    println!(
        "\n{} resource(s), last updated {}",
        state.len(),
        state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

async fn untrack(storage: &dyn StateStorage, kind: &str, name: &str) -> Result<()> {
    let mut state = storage.load().await?;
    let removed = state.untrack(kind, name);
    if removed == 0 {
        return Err(CliError::input(format!("{}/{} is not managed", kind, name)));
    }
    storage.save(&state).await?;
    println!(
        "{} No longer managing {}/{} ({} record(s))",
        style("✓").green().bold(),
        kind,
        name,
        removed
    );
    Ok(())
}
