//! CLI error type and its exit codes
//!
//! Library errors carry remediation as a trailing `Hint:` line; it is split
//! off here and shown as miette help.

use gantry_client::{BatchError, ClientError};
use gantry_core::{CatalogError, CoreError};
use gantry_state::StateError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Manifests, arguments or configuration are invalid
    #[error("{message}")]
    #[diagnostic(code(gantry::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(gantry::catalog))]
    Catalog {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("{message}")]
    #[diagnostic(code(gantry::state))]
    State {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A backend call failed outside of any per-resource operation
    #[error("{message}")]
    #[diagnostic(code(gantry::backend))]
    Backend {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(gantry::io))]
    Io { message: String },

    #[error("{failed} of {total} resource(s) failed")]
    #[diagnostic(code(gantry::failed))]
    ResourcesFailed { failed: usize, total: usize },

    #[error("cancelled after {completed} completed result(s)")]
    #[diagnostic(code(gantry::cancelled))]
    Cancelled { completed: usize },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Catalog { .. } => exit_codes::CATALOG_ERROR,
            CliError::State { .. } => exit_codes::STATE_ERROR,
            CliError::Backend { .. } | CliError::ResourcesFailed { .. } => exit_codes::RESOURCE_FAILURE,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Cancelled { .. } => exit_codes::CANCELLED,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Split a `...\nHint: ...` message into message and help
fn split_hint(text: &str) -> (String, Option<String>) {
    match text.split_once("\nHint: ") {
        Some((message, hint)) => (message.to_string(), Some(hint.to_string())),
        None => (text.to_string(), None),
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            other => {
                let (message, help) = split_hint(&other.to_string());
                CliError::Input { message, help }
            }
        }
    }
}

impl From<CatalogError> for CliError {
    fn from(err: CatalogError) -> Self {
        let (message, help) = split_hint(&err.to_string());
        if err.is_resolution_error() {
            CliError::Input { message, help }
        } else {
            CliError::Catalog { message, help }
        }
    }
}

impl From<StateError> for CliError {
    fn from(err: StateError) -> Self {
        let (message, help) = split_hint(&err.to_string());
        CliError::State { message, help }
    }
}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Resolution(e) => e.into(),
            ClientError::InvalidConfig(message) => CliError::Input {
                message: format!("invalid client configuration: {}", message),
                help: None,
            },
            unconfigured @ ClientError::BackendNotConfigured { .. } => {
                let (message, help) = split_hint(&unconfigured.to_string());
                CliError::Input { message, help }
            }
            other => {
                let (message, help) = split_hint(&other.to_string());
                CliError::Backend { message, help }
            }
        }
    }
}

impl From<BatchError> for CliError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Client(e) => e.into(),
            BatchError::Cancelled { partial } => CliError::Cancelled {
                completed: partial.len(),
            },
            other => {
                let (message, help) = split_hint(&other.to_string());
                CliError::Input { message, help }
            }
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
