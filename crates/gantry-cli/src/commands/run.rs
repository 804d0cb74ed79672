//! Run command - execute a non-CRUD backend action

use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

use super::{Session, lookup, parse_pairs, print_yaml};
use crate::config::GantryConfig;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Run name, as listed by `gantry kinds`
    pub name: String,

    /// Path parameters, e.g. --param appInstance=orders-prod
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Query parameters
    #[arg(long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Request body, YAML or JSON
    #[arg(long)]
    pub body: Option<PathBuf>,
}

/// Run the run command
pub async fn run(config: &GantryConfig, args: &RunArgs) -> Result<()> {
    let session = Session::connect(config, false, false).await?;
    let action = session.catalog.run(&args.name).cloned().ok_or_else(|| {
        CliError::input_with_help(
            format!("unknown run '{}'", args.name),
            "list available runs with `gantry kinds`",
        )
    })?;
    let client = session.dispatcher.client(action.backend)?;

    let params = parse_pairs(&args.params)?;
    let mut path_values = Vec::new();
    for (name, value) in action.path_params.iter().zip(lookup(&params, &action.path_params)) {
        path_values.push(value.ok_or_else(|| {
            CliError::input_with_help(
                format!("run {} needs '{}'", action.name, name),
                format!("pass --param {}=<value>", name),
            )
        })?);
    }
    let query = parse_pairs(&args.query)?;
    let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let body = match &args.body {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let value: Value = serde_yaml::from_str(&text).map_err(|e| {
                CliError::input(format!("invalid body {}: {}", path.display(), e))
            })?;
            Some(value)
        }
        None => None,
    };

    let response = client.run(&action, &path_values, &query, body.as_ref()).await?;
    if !response.is_null() {
        print_yaml(&response)?;
    }
    Ok(())
}
