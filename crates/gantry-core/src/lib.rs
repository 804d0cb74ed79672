//! Gantry Core - resources, manifests and the API catalog
//!
//! This crate provides the pieces that need no network access:
//! - `Resource`: a declarative document with its identity
//! - `loader`: manifest files, env interpolation and file includes
//! - `Catalog`: kinds, versions and request paths discovered from an API description
//! - `openapi`: the description parser
//! - `sort`: apply/delete ordering by kind priority

pub mod catalog;
pub mod defaults;
pub mod error;
pub mod interpolate;
pub mod loader;
pub mod openapi;
pub mod resource;
pub mod sort;

pub use catalog::{
    Backend, BackendKind, Catalog, DEFAULT_PRIORITY, DeleteTarget, GatewayDeleteMode, Kind,
    KindVersion, Priority, QueryOption, QueryValueType, Run, parse_api_version,
};
pub use defaults::{default_catalog, embedded_catalog};
pub use error::{CatalogError, CatalogResult, CoreError, Result};
pub use loader::{LoadOptions, load_file, load_paths, load_str};
pub use openapi::{ParseOptions, parse_catalog};
pub use resource::Resource;
pub use sort::{sort_for_apply, sort_for_delete};
