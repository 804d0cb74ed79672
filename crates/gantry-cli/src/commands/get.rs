//! Get command - list or show remote resources of a kind

use clap::Args;

use super::{Session, lookup, parse_pairs, print_yaml};
use crate::config::GantryConfig;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Args)]
pub struct GetArgs {
    /// Kind name, case-insensitive
    pub kind: String,

    /// Resource name; lists the kind when omitted
    pub name: Option<String>,

    /// Parent identifiers, e.g. --param cluster=prod
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Extra query options, e.g. --option showDefaults=true
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Print JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

/// Run the get command
pub async fn run(config: &GantryConfig, args: &GetArgs) -> Result<()> {
    let session = Session::connect(config, false, false).await?;
    let found = session.catalog.find_kind(&args.kind)?;
    let kind = found.latest().cloned().ok_or_else(|| CliError::Catalog {
        message: format!("kind '{}' has no versions", found.name),
        help: None,
    })?;
    let client = session.dispatcher.client(kind.backend.backend())?;

    let params = parse_pairs(&args.params)?;
    let options = parse_pairs(&args.options)?;

    let mut path_values = Vec::new();
    for (name, value) in kind.parent_path_params.iter().zip(lookup(&params, &kind.parent_path_params)) {
        let value = value.ok_or_else(|| {
            CliError::input_with_help(
                format!("{} needs its parent '{}'", kind.name, name),
                format!("pass --param {}=<value>", name),
            )
        })?;
        path_values.push(value);
    }
    let query_values: Vec<&str> = lookup(&params, &kind.parent_query_params)
        .into_iter()
        .map(|v| v.unwrap_or_default())
        .collect();
    let options: Vec<(&str, &str)> = options.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let value = match &args.name {
        Some(name) => client
            .get_one(&kind, &path_values, &query_values, name, &options)
            .await?
            .ok_or_else(|| not_found(&kind.name, name))?,
        None => serde_json::Value::Array(
            client
                .list(&kind, &path_values, &query_values, &options)
                .await?,
        ),
    };

    if args.json {
        let text = serde_json::to_string_pretty(&value).map_err(|e| CliError::Backend {
            message: format!("cannot render response: {}", e),
            help: None,
        })?;
        println!("{}", text);
        Ok(())
    } else {
        print_yaml(&value)
    }
}

fn not_found(kind: &str, name: &str) -> CliError {
    CliError::input_with_help(
        format!("{}/{} not found", kind, name),
        format!("list existing resources with `gantry get {}`", kind),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;

    #[test]
    fn test_missing_resource_is_input_error() {
        let err = not_found("Topic", "orders");
        assert_eq!(err.exit_code(), exit_codes::INPUT_ERROR);
        assert_eq!(err.to_string(), "Topic/orders not found");
    }
}
