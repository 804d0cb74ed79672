//! Catalog discovery from a live backend

use gantry_core::{Catalog, CatalogError, ParseOptions, embedded_catalog, parse_catalog};

use crate::client::BackendClient;
use crate::error::{ClientError, Result};

/// Where a catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Live,
    Embedded,
}

/// Fetch and parse a backend's API description
///
/// When the backend cannot be reached, or does not publish a description,
/// the description bundled with this release is used instead. A description
/// that is served but fails to parse is an error.
pub async fn fetch_catalog(client: &BackendClient, options: ParseOptions) -> Result<(Catalog, CatalogSource)> {
    let backend = client.backend();
    match client.fetch_description().await {
        Ok(text) => {
            let catalog = parse_catalog(&text, backend, options)?;
            tracing::debug!(%backend, kinds = catalog.kinds().count(), "parsed live API description");
            Ok((catalog, CatalogSource::Live))
        }
        Err(e) if is_unreachable(&e) => {
            tracing::warn!(%backend, error = %e, "cannot fetch API description, using the bundled one");
            let catalog = embedded_catalog(backend).map_err(|e| match e {
                CatalogError::InvalidDescription(message) => {
                    CatalogError::InvalidDescription(format!("bundled description: {}", message))
                }
                other => other,
            })?;
            Ok((catalog, CatalogSource::Embedded))
        }
        Err(e) => Err(e),
    }
}

fn is_unreachable(error: &ClientError) -> bool {
    matches!(error, ClientError::Network { .. } | ClientError::Timeout { .. }) || error.is_not_found()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use gantry_core::Backend;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DESCRIPTION: &str = r#"
openapi: 3.0.0
paths:
  /public/iam/v2/user:
    put:
      tags: [cli_user_self-serve_v2_0]
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                metadata:
                  type: object
                  properties:
                    name: {type: string}
                  required: [name]
    get:
      tags: [user]
"#;

    #[tokio::test]
    async fn test_live_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public/openapi.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DESCRIPTION))
            .mount(&server)
            .await;

        let client = BackendClient::new(Backend::Console, ClientConfig::new(server.uri())).unwrap();
        let (catalog, source) = fetch_catalog(&client, ParseOptions::default()).await.unwrap();

        assert_eq!(source, CatalogSource::Live);
        assert!(catalog.kind("User").is_some());
        assert!(catalog.kind("Topic").is_none());
    }

    #[tokio::test]
    async fn test_missing_description_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = BackendClient::new(Backend::Console, ClientConfig::new(server.uri())).unwrap();
        let (catalog, source) = fetch_catalog(&client, ParseOptions::default()).await.unwrap();

        assert_eq!(source, CatalogSource::Embedded);
        assert!(catalog.kind("Topic").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_falls_back() {
        let client = BackendClient::new(
            Backend::Gateway,
            ClientConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let (catalog, source) = fetch_catalog(&client, ParseOptions::default()).await.unwrap();

        assert_eq!(source, CatalogSource::Embedded);
        assert!(catalog.kind("VirtualCluster").is_some());
    }

    #[tokio::test]
    async fn test_unparseable_description_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("paths: [not, a, map"))
            .mount(&server)
            .await;

        let client = BackendClient::new(Backend::Console, ClientConfig::new(server.uri())).unwrap();
        let err = fetch_catalog(&client, ParseOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Resolution(CatalogError::InvalidDescription(_))));
    }
}
