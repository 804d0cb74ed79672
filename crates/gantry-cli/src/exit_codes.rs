//! Process exit codes

/// Every resource succeeded
pub const SUCCESS: i32 = 0;

/// At least one resource failed, or a backend call failed outright
pub const RESOURCE_FAILURE: i32 = 1;

/// Invalid manifests, arguments or configuration
pub const INPUT_ERROR: i32 = 2;

/// The API description could not be turned into a catalog
pub const CATALOG_ERROR: i32 = 3;

/// State storage could not be read or written
pub const STATE_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Interrupted by the user (128 + SIGINT)
pub const CANCELLED: i32 = 130;
