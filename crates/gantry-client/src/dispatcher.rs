//! Routes each resource to the backend client that serves its kind

use async_trait::async_trait;
use gantry_core::{Backend, Catalog, KindVersion, Resource};
use std::sync::Arc;

use crate::client::BackendClient;
use crate::diff::resource_diff;
use crate::error::{ClientError, Result};
use crate::orchestrator::{ApplyOptions, ApplyOutcome, ResourceHandler};

/// [`ResourceHandler`] backed by real console and gateway clients
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    console: Option<Arc<BackendClient>>,
    gateway: Option<Arc<BackendClient>>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            console: None,
            gateway: None,
        }
    }

    pub fn with_client(mut self, client: Arc<BackendClient>) -> Self {
        match client.backend() {
            Backend::Console => self.console = Some(client),
            Backend::Gateway => self.gateway = Some(client),
        }
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Client configured for a backend
    pub fn client(&self, backend: Backend) -> Result<&BackendClient> {
        let client = match backend {
            Backend::Console => self.console.as_deref(),
            Backend::Gateway => self.gateway.as_deref(),
        };
        client.ok_or_else(|| ClientError::BackendNotConfigured {
            backend: backend.to_string(),
        })
    }

    fn route(&self, resource: &Resource) -> Result<(&KindVersion, &BackendClient)> {
        let kind = self.catalog.kind_version_for(resource)?;
        let client = self.client(kind.backend.backend())?;
        Ok((kind, client))
    }
}

#[async_trait]
impl ResourceHandler for Dispatcher {
    async fn apply(&self, resource: &Resource, options: ApplyOptions) -> Result<ApplyOutcome> {
        let (kind, client) = self.route(resource)?;

        let diff = if options.diff {
            let current = client.describe(kind, resource).await?;
            resource_diff(current.as_ref(), &resource.document, &resource.key()).map_err(|message| {
                ClientError::Diff {
                    resource: resource.key(),
                    message,
                }
            })?
        } else {
            None
        };

        tracing::debug!(resource = %resource.key(), backend = %client.backend(), dry_run = options.dry_run, "applying");
        let upsert = client.apply(kind, resource, options.dry_run).await?;
        Ok(ApplyOutcome { upsert, diff })
    }

    async fn delete(&self, resource: &Resource, dry_run: bool) -> Result<()> {
        let (kind, client) = self.route(resource)?;
        if dry_run {
            // Resolve the target so bad metadata still fails, but send nothing
            kind.delete_target(resource)?;
            tracing::debug!(resource = %resource.key(), "dry run, skipping delete");
            return Ok(());
        }
        tracing::debug!(resource = %resource.key(), backend = %client.backend(), "deleting");
        client.delete_resource(kind, resource).await
    }
}
