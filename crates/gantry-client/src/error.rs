//! Error types for gantry-client

use gantry_core::CatalogError;
use serde_json::Value;
use thiserror::Error;

/// Result type for backend calls
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to a backend
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Non-2xx response
    #[error("{method} {path} failed with {status}: {message}")]
    Api {
        status: u16,
        method: String,
        path: String,
        message: String,
    },

    #[error("{method} {path} timed out after {seconds}s\nHint: raise --request-timeout or check connectivity")]
    Timeout {
        method: String,
        path: String,
        seconds: u64,
    },

    #[error("cannot reach {url}: {message}")]
    Network { url: String, message: String },

    /// The server refuses this client version
    #[error("server does not support this client ({client_version}): {message}\nHint: upgrade gantry")]
    UnsupportedVersion {
        client_version: String,
        message: String,
    },

    /// The resource cannot be mapped to a request
    #[error(transparent)]
    Resolution(#[from] CatalogError),

    #[error("cannot compute diff for {resource}: {message}")]
    Diff { resource: String, message: String },

    #[error("invalid response from {path}: {message}")]
    InvalidResponse { path: String, message: String },

    /// No client is configured for the backend a kind lives on
    #[error("no {backend} client configured\nHint: set the {backend} URL in the config file or environment")]
    BackendNotConfigured { backend: String },

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// A worker task ended without producing a result
    #[error("worker task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Whether the server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

/// Message for a non-2xx response body
///
/// Structured bodies carry `title`, `msg` and `cause`; the most specific
/// non-empty one wins. Anything else is shown as raw text.
pub fn render_api_error(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(trimmed) {
        let specific = ["cause", "msg", "message", "title"]
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty());
        if let Some(message) = specific {
            return message.to_string();
        }
    }
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.to_string()
    }
}
