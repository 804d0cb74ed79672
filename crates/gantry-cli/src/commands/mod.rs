//! CLI commands

use clap::Args;
use gantry_client::{CatalogSource, Dispatcher, fetch_catalog};
use gantry_core::{
    Backend, Catalog, LoadOptions, ParseOptions, Resource, embedded_catalog, load_paths,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::GantryConfig;
use crate::error::{CliError, Result};

pub mod apply;
pub mod batch;
pub mod delete;
pub mod get;
pub mod kinds;
pub mod run;
pub mod state;

/// Manifest selection shared by apply, delete and batch-apply
#[derive(Debug, Clone, Args)]
pub struct ManifestArgs {
    /// Manifest files or directories
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Fail on undefined environment variables
    #[arg(long)]
    pub strict: bool,
}

impl ManifestArgs {
    pub fn load(&self, config: &GantryConfig) -> Result<Vec<Resource>> {
        let options = LoadOptions {
            strict: self.strict || config.strict,
        };
        let resources = load_paths(&self.files, options)?;
        if resources.is_empty() {
            return Err(CliError::input_with_help(
                "no resources found",
                "manifests are .yaml, .yml or .json files with apiVersion, kind and metadata.name",
            ));
        }
        tracing::debug!(count = resources.len(), "loaded manifests");
        Ok(resources)
    }
}

/// Catalog and clients for one invocation
pub struct Session {
    pub catalog: Arc<Catalog>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Session {
    /// Build clients for configured backends and discover their catalogs
    ///
    /// Backends without a URL contribute their bundled catalog, so their
    /// kinds still sort and resolve; calls to them fail per resource.
    pub async fn connect(config: &GantryConfig, offline: bool, strict_catalog: bool) -> Result<Self> {
        let mut catalog = Catalog::new();
        let mut clients = Vec::new();

        for backend in [Backend::Console, Backend::Gateway] {
            let client = config.client(backend)?;
            match client {
                Some(client) if !offline => {
                    let (discovered, source) =
                        fetch_catalog(&client, ParseOptions { strict: strict_catalog }).await?;
                    if source == CatalogSource::Embedded {
                        tracing::debug!(%backend, "using bundled catalog");
                    }
                    catalog.merge(discovered);
                    clients.push(Arc::new(client));
                }
                client => {
                    catalog.merge(embedded_catalog(backend)?);
                    if let Some(client) = client {
                        clients.push(Arc::new(client));
                    }
                }
            }
        }

        let catalog = Arc::new(catalog);
        let dispatcher = clients
            .into_iter()
            .fold(Dispatcher::new(catalog.clone()), Dispatcher::with_client);
        Ok(Self {
            catalog,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// Parse repeated `key=value` flags
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    CliError::input_with_help(format!("invalid parameter '{}'", pair), "expected key=value")
                })
        })
        .collect()
}

/// Values of `names` from `pairs`, in order; `None` for absent names
pub fn lookup<'a>(pairs: &'a [(String, String)], names: &[String]) -> Vec<Option<&'a str>> {
    names
        .iter()
        .map(|name| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        })
        .collect()
}

/// Fail unless every resource succeeded
pub fn check_failures(failed: usize, total: usize) -> Result<()> {
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::ResourcesFailed { failed, total })
    }
}

/// Print a JSON value as YAML
pub fn print_yaml(value: &serde_json::Value) -> Result<()> {
    let text = serde_yaml::to_string(value).map_err(|e| CliError::Backend {
        message: format!("cannot render response: {}", e),
        help: None,
    })?;
    print!("{}", text);
    Ok(())
}
