//! API descriptions bundled with the binary
//!
//! Used when the live description cannot be fetched, and as the second
//! source of priorities when sorting.

use std::sync::OnceLock;

use crate::catalog::{Backend, Catalog};
use crate::error::CatalogResult;
use crate::openapi::{ParseOptions, parse_catalog};

/// Console description shipped with this release
pub const CONSOLE_OPENAPI: &str = include_str!("../data/console-openapi.yaml");

/// Gateway description shipped with this release
pub const GATEWAY_OPENAPI: &str = include_str!("../data/gateway-openapi.yaml");

/// Embedded description for one backend
pub fn embedded_description(backend: Backend) -> &'static str {
    match backend {
        Backend::Console => CONSOLE_OPENAPI,
        Backend::Gateway => GATEWAY_OPENAPI,
    }
}

/// Parse the embedded description of one backend
pub fn embedded_catalog(backend: Backend) -> CatalogResult<Catalog> {
    parse_catalog(embedded_description(backend), backend, ParseOptions::default())
}

/// Console and gateway embedded catalogs merged, parsed once
///
/// A bundled description that fails to parse yields an empty catalog and a
/// warning; sorting then treats every kind as unordered.
pub fn default_catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let mut catalog = Catalog::new();
        for backend in [Backend::Console, Backend::Gateway] {
            match embedded_catalog(backend) {
                Ok(parsed) => catalog.merge(parsed),
                Err(e) => tracing::warn!(%backend, error = %e, "embedded API description is unusable"),
            }
        }
        catalog
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GatewayDeleteMode, Priority};

    #[test]
    fn test_embedded_descriptions_parse_strictly() {
        for backend in [Backend::Console, Backend::Gateway] {
            let catalog = parse_catalog(
                embedded_description(backend),
                backend,
                ParseOptions { strict: true },
            )
            .unwrap();
            assert!(!catalog.is_empty());
        }
    }

    #[test]
    fn test_default_catalog_contents() {
        let catalog = default_catalog();

        assert_eq!(catalog.priority_of("KafkaCluster", "v2"), Some(Priority::Explicit(2)));
        assert_eq!(catalog.priority_of("Topic", "v2"), Some(Priority::Explicit(4)));
        assert_eq!(
            catalog.priority_of("ApplicationInstance", "v1"),
            Some(Priority::Explicit(6))
        );

        let alias = catalog.kind("AliasTopic").unwrap().latest().unwrap();
        assert_eq!(
            alias.backend,
            crate::catalog::BackendKind::Gateway {
                delete: GatewayDeleteMode::ByNameAndScope
            }
        );
        assert!(catalog.kind("Interceptor").unwrap().latest().unwrap().backend.interceptor_delete());
        assert!(catalog.kind("VirtualCluster").unwrap().latest().unwrap().backend.identified_by_name());

        assert!(catalog.run("generate-token").is_some());
        assert!(catalog.run("reset-service-account-password").is_some());
    }

    #[test]
    fn test_default_catalog_query_options() {
        let catalog = default_catalog();
        let permission = catalog.kind("ApplicationInstancePermission").unwrap().latest().unwrap();
        let flags: Vec<_> = permission
            .list_query_options
            .iter()
            .map(|o| o.flag_name.as_str())
            .collect();
        assert_eq!(flags, vec!["application", "application-instance", "granted-to"]);

        let connector = catalog.kind("Connector").unwrap().latest().unwrap();
        assert_eq!(connector.parent_path_params, vec!["cluster", "connectCluster"]);
    }
}
