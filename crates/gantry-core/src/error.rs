//! Core error types

use thiserror::Error;

/// Errors raised while loading manifests
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: String },

    #[error("Invalid manifest {source_name}: {message}")]
    InvalidManifest { source_name: String, message: String },

    #[error("Missing required field '{field}' in {source_name}")]
    MissingField { field: String, source_name: String },

    #[error("Environment variable '{name}' is not set and has no default\nHint: export {name} or use ${{{name}:-default}}")]
    UndefinedVariable { name: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building a catalog or resolving paths against it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    /// The API description could not be parsed at all
    #[error("invalid API description: {0}")]
    InvalidDescription(String),

    /// A `cli_` tag that does not follow the naming convention
    #[error("malformed catalog tag '{tag}' on {path}: {reason}")]
    MalformedTag {
        tag: String,
        path: String,
        reason: String,
    },

    /// Strict-mode consistency violation
    #[error("inconsistent API description for {kind} v{version}: {reason}")]
    Inconsistent {
        kind: String,
        version: u32,
        reason: String,
    },

    #[error("kind name mismatch: cannot add version of '{found}' to kind '{expected}'")]
    KindMismatch { expected: String, found: String },

    #[error("unknown kind '{kind}'{}", suggestion_suffix(.suggestion))]
    UnknownKind {
        kind: String,
        suggestion: Option<String>,
    },

    #[error("kind '{kind}' has no version {version}")]
    UnknownVersion { kind: String, version: u32 },

    #[error("invalid apiVersion '{api_version}': expected a version like 'v1'")]
    InvalidApiVersion { api_version: String },

    #[error("{kind}/{name}: missing required parameter metadata.{parameter}")]
    MissingParameter {
        kind: String,
        name: String,
        parameter: String,
    },

    /// Caller passed the wrong number of parent values; this is a bug, not bad input
    #[error("internal error: {0}")]
    Internal(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{}'?)", s),
        None => String::new(),
    }
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Whether this error belongs to a single resource rather than the whole catalog
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            CatalogError::UnknownKind { .. }
                | CatalogError::UnknownVersion { .. }
                | CatalogError::InvalidApiVersion { .. }
                | CatalogError::MissingParameter { .. }
        )
    }
}
