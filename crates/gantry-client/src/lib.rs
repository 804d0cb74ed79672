//! Gantry Client - talking to the console and gateway backends
//!
//! - `BackendClient`: HTTP calls with versioned headers and structured errors
//! - `discovery`: live catalog with a bundled fallback
//! - `orchestrator`: bounded-parallel apply and delete, one result per resource
//! - `Dispatcher`: routes resources to the right backend client
//! - `reconcile`: apply plus deletion of resources dropped from the manifests
//! - `batch`: server-side batch apply with polling and cancellation

pub mod batch;
pub mod client;
pub mod diff;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod reconcile;

pub use batch::{
    BatchError, BatchObserver, BatchOptions, BatchResultItem, BatchStrategy, CancelFlag, JobStatus,
    PollPolicy, batch_apply,
};
pub use client::{Auth, BackendClient, ClientConfig, UpsertResult};
pub use discovery::{CatalogSource, fetch_catalog};
pub use dispatcher::Dispatcher;
pub use error::{ClientError, Result};
pub use orchestrator::{
    ApplyOptions, ApplyOutcome, ApplyResult, DeleteResult, ResourceHandler, apply_all, delete_all,
};
pub use reconcile::{ReconcileOptions, ReconcileReport, reconcile};
