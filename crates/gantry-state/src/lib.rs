//! Gantry State - which resources Gantry manages
//!
//! The state is used to delete resources that disappeared from the manifests.
//! It can live in a local file or in an object store bucket.

pub mod error;
pub mod state;
pub mod storage;

pub use error::{Result, StateError};
pub use state::{ManagedResource, STATE_VERSION, State};
pub use storage::{
    LocalFileStorage, MockStateStorage, RemoteStorage, StateLocation, StateStorage, parse_remote_uri,
};
