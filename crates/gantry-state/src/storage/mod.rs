//! Storage backends for the managed-resource state
//!
//! - **Local**: a JSON file on disk
//! - **Remote**: a JSON object in S3, GCS or Azure Blob storage
//! - **Mock**: in memory, for tests
//!
//! Saves overwrite the whole document. Concurrent writers are last-write-wins.

mod local;
mod mock;
mod remote;

pub use local::LocalFileStorage;
pub use mock::{MockStateStorage, OperationCounts};
pub use remote::{REMOTE_SCHEMES, RemoteLocation, RemoteStorage, parse_remote_uri};

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{Result, StateError};
use crate::state::State;

/// File name used when a location names a directory or prefix
pub const STATE_FILE_NAME: &str = "state.json";

/// Storage backend trait for state persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Read the state; a missing document is an empty state
    async fn load(&self) -> Result<State>;

    /// Replace the stored state
    async fn save(&self, state: &State) -> Result<()>;

    /// Human-readable location, for messages
    fn describe(&self) -> String;
}

/// Where the state lives, as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLocation {
    Local(PathBuf),
    Remote(String),
}

impl StateLocation {
    /// Classify a configured location
    ///
    /// `file://` URIs and plain paths are local; object store schemes are remote.
    pub fn parse(location: &str) -> Result<Self> {
        if let Some(path) = location.strip_prefix("file://") {
            return Ok(StateLocation::Local(PathBuf::from(path)));
        }
        match location.split_once("://") {
            Some((scheme, _)) if REMOTE_SCHEMES.contains(&scheme) => {
                Ok(StateLocation::Remote(location.to_string()))
            }
            Some((scheme, _)) => Err(StateError::InvalidLocation {
                location: location.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }),
            None if location.trim().is_empty() => Err(StateError::InvalidLocation {
                location: location.to_string(),
                reason: "empty location".to_string(),
            }),
            None => Ok(StateLocation::Local(PathBuf::from(location))),
        }
    }

    /// Open the backend for this location
    pub fn open(&self) -> Result<Box<dyn StateStorage>> {
        match self {
            StateLocation::Local(path) => Ok(Box::new(LocalFileStorage::new(path.clone()))),
            StateLocation::Remote(uri) => Ok(Box::new(RemoteStorage::from_uri(uri)?)),
        }
    }
}

impl std::fmt::Display for StateLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateLocation::Local(path) => write!(f, "{}", path.display()),
            StateLocation::Remote(uri) => write!(f, "{}", uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            StateLocation::parse("./state.json").unwrap(),
            StateLocation::Local(PathBuf::from("./state.json"))
        );
        assert_eq!(
            StateLocation::parse("file:///var/lib/gantry/state.json").unwrap(),
            StateLocation::Local(PathBuf::from("/var/lib/gantry/state.json"))
        );
        assert_eq!(
            StateLocation::parse("s3://bucket/prefix").unwrap(),
            StateLocation::Remote("s3://bucket/prefix".to_string())
        );
        assert!(matches!(
            StateLocation::parse("ftp://host/x"),
            Err(StateError::InvalidLocation { .. })
        ));
        assert!(StateLocation::parse("  ").is_err());
    }

    #[test]
    fn test_open_local() {
        let storage = StateLocation::parse("/tmp/gantry-test/state.json")
            .unwrap()
            .open()
            .unwrap();
        assert!(storage.describe().contains("/tmp/gantry-test/state.json"));
    }
}
