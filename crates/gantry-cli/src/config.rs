//! CLI configuration
//!
//! Read from `<config dir>/gantry/config.yaml` (or `--config`), then
//! overridden by command-line flags and their `GANTRY_*` environment
//! variables.

use clap::Args;
use gantry_client::{Auth, BackendClient, ClientConfig};
use gantry_core::Backend;
use gantry_state::{StateLocation, StateStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CliError, Result};

/// Connection of one backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path of the API description when not the default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_path: Option<String>,
}

impl BackendConfig {
    fn auth(&self) -> Auth {
        match (&self.token, &self.user, &self.password) {
            (Some(token), _, _) => Auth::Bearer(token.clone()),
            (None, Some(user), Some(password)) => Auth::Basic {
                username: user.clone(),
                password: password.clone(),
            },
            _ => Auth::None,
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GantryConfig {
    pub console: Option<BackendConfig>,
    pub gateway: Option<BackendConfig>,
    /// State location: a file path or an object store URI
    pub state: Option<String>,
    /// Concurrent backend calls during apply and delete
    pub parallelism: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub cancel_timeout: Duration,
    /// Fail on undefined environment variables in manifests
    pub strict: bool,
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            console: None,
            gateway: None,
            state: None,
            parallelism: 1,
            request_timeout: gantry_client::client::DEFAULT_REQUEST_TIMEOUT,
            cancel_timeout: gantry_client::batch::DEFAULT_CANCEL_TIMEOUT,
            strict: false,
        }
    }
}

/// Connection flags shared by every command
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Configuration file
    #[arg(long, global = true, env = "GANTRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Console API base URL
    #[arg(long, global = true, env = "GANTRY_CONSOLE_URL")]
    pub console_url: Option<String>,

    /// Console API token
    #[arg(long, global = true, env = "GANTRY_CONSOLE_TOKEN", hide_env_values = true)]
    pub console_token: Option<String>,

    /// Gateway API base URL
    #[arg(long, global = true, env = "GANTRY_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    #[arg(long, global = true, env = "GANTRY_GATEWAY_USER")]
    pub gateway_user: Option<String>,

    #[arg(long, global = true, env = "GANTRY_GATEWAY_PASSWORD", hide_env_values = true)]
    pub gateway_password: Option<String>,

    /// State location (file path, s3://, gs://, az://, memory://)
    #[arg(long, global = true, env = "GANTRY_STATE")]
    pub state: Option<String>,

    /// Timeout of each backend request, in seconds
    #[arg(long, global = true, env = "GANTRY_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,
}

impl GantryConfig {
    /// Load the configuration file; a missing file is the default configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            CliError::input_with_help(
                format!("invalid configuration {}: {}", path.display(), e),
                "known keys: console, gateway, state, parallelism, requestTimeout, cancelTimeout, strict",
            )
        })
    }

    /// File plus flag and environment overrides
    pub fn resolve(args: &ConnectionArgs) -> Result<Self> {
        let mut config = Self::load(args.config.as_deref())?;
        config.apply(args);
        Ok(config)
    }

    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gantry").join("config.yaml"))
    }

    fn apply(&mut self, args: &ConnectionArgs) {
        if let Some(url) = &args.console_url {
            self.console.get_or_insert_with(BackendConfig::default).url = url.clone();
        }
        if let Some(token) = &args.console_token
            && let Some(console) = self.console.as_mut()
        {
            console.token = Some(token.clone());
        }
        if let Some(url) = &args.gateway_url {
            self.gateway.get_or_insert_with(BackendConfig::default).url = url.clone();
        }
        if let Some(gateway) = self.gateway.as_mut() {
            if let Some(user) = &args.gateway_user {
                gateway.user = Some(user.clone());
            }
            if let Some(password) = &args.gateway_password {
                gateway.password = Some(password.clone());
            }
        }
        if let Some(state) = &args.state {
            self.state = Some(state.clone());
        }
        if let Some(seconds) = args.request_timeout {
            self.request_timeout = Duration::from_secs(seconds);
        }
    }

    pub fn backend(&self, backend: Backend) -> Option<&BackendConfig> {
        match backend {
            Backend::Console => self.console.as_ref(),
            Backend::Gateway => self.gateway.as_ref(),
        }
    }

    /// Client for a backend, if its URL is configured
    pub fn client(&self, backend: Backend) -> Result<Option<BackendClient>> {
        let Some(settings) = self.backend(backend).filter(|b| !b.url.is_empty()) else {
            return Ok(None);
        };
        let mut config = ClientConfig::new(settings.url.clone())
            .with_auth(settings.auth())
            .with_timeout(self.request_timeout);
        config.description_path = settings.description_path.clone();
        Ok(Some(BackendClient::new(backend, config)?))
    }

    /// Client for a backend that must be configured
    pub fn require_client(&self, backend: Backend) -> Result<BackendClient> {
        self.client(backend)?.ok_or_else(|| {
            CliError::input_with_help(
                format!("no {} URL configured", backend),
                format!(
                    "pass --{}-url or set GANTRY_{}_URL",
                    backend,
                    backend.to_string().to_uppercase()
                ),
            )
        })
    }

    /// State storage, if a location is configured
    pub fn state_storage(&self) -> Result<Option<Box<dyn StateStorage>>> {
        match &self.state {
            Some(location) => Ok(Some(StateLocation::parse(location)?.open()?)),
            None => Ok(None),
        }
    }
}
