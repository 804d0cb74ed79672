//! Error types for gantry-state

use thiserror::Error;

/// Result type for gantry-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors raised by state storage
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
    /// A storage backend failed to read or write the state
    #[error("{backend} state storage: {message}{}", hint_line(.hint))]
    Backend {
        backend: &'static str,
        message: String,
        hint: Option<String>,
    },

    /// The configured location cannot be used
    #[error("invalid state location '{location}': {reason}\nHint: use a file path or s3://, gs://, az:// or memory:// URI")]
    InvalidLocation { location: String, reason: String },

    /// A recorded resource can no longer be turned back into a resource
    #[error("invalid state record {kind}: {message}")]
    InvalidRecord { kind: String, message: String },
}

fn hint_line(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\nHint: {}", h),
        None => String::new(),
    }
}

impl StateError {
    pub(crate) fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        StateError::Backend {
            backend,
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            StateError::Backend {
                backend, message, ..
            } => StateError::Backend {
                backend,
                message,
                hint: Some(hint.into()),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_hint_line() {
        let err = StateError::backend("local", "cannot read /tmp/x").with_hint("check permissions");
        assert_eq!(
            err.to_string(),
            "local state storage: cannot read /tmp/x\nHint: check permissions"
        );

        let err = StateError::backend("remote", "timeout");
        assert_eq!(err.to_string(), "remote state storage: timeout");
    }
}
