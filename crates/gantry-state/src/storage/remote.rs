//! Object storage state backend
//!
//! The location is a URI of the form `<scheme>://<bucket>[/<prefix>][?<options>]`.
//! The object key is `<prefix>/state.json`, or the prefix itself when it
//! already names a `.json` object. Query options are passed to the store
//! builder (e.g. `?region=eu-west-1&endpoint=http://minio:9000`); provider
//! credentials are read from the usual `AWS_*`, `GOOGLE_*` and `AZURE_*`
//! environment variables.

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use url::Url;

use super::{STATE_FILE_NAME, StateStorage};
use crate::error::{Result, StateError};
use crate::state::State;

const BACKEND: &str = "remote";

/// URI schemes handled by [`RemoteStorage`]
pub const REMOTE_SCHEMES: [&str; 8] = ["s3", "s3a", "gs", "az", "azure", "abfs", "abfss", "memory"];

/// Environment variable prefixes forwarded to the store builders
const CREDENTIAL_ENV_PREFIXES: [&str; 3] = ["AWS_", "GOOGLE_", "AZURE_"];

/// A remote location split into store and object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// `<scheme>://<bucket>` plus the original query string
    pub bucket_uri: String,
    /// Object key inside the bucket
    pub key: String,
}

/// Split a remote state URI into bucket URI and object key
pub fn parse_remote_uri(uri: &str) -> Result<RemoteLocation> {
    let invalid = |reason: String| StateError::InvalidLocation {
        location: uri.to_string(),
        reason,
    };

    let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
    let scheme = url.scheme();
    if !REMOTE_SCHEMES.contains(&scheme) {
        return Err(invalid(format!("unsupported scheme '{}'", scheme)));
    }

    let bucket = url.host_str().unwrap_or_default();
    if bucket.is_empty() && scheme != "memory" {
        return Err(invalid("missing bucket name".to_string()));
    }

    let mut bucket_uri = format!("{}://{}", scheme, bucket);
    if let Some(query) = url.query() {
        bucket_uri.push('?');
        bucket_uri.push_str(query);
    }

    let prefix = url.path().trim_matches('/');
    let key = if prefix.is_empty() {
        STATE_FILE_NAME.to_string()
    } else if prefix.ends_with(".json") {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, STATE_FILE_NAME)
    };

    Ok(RemoteLocation { bucket_uri, key })
}

/// State kept as one object in a bucket
#[derive(Debug, Clone)]
pub struct RemoteStorage {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    uri: String,
}

impl RemoteStorage {
    /// Open the store named by a remote URI
    pub fn from_uri(uri: &str) -> Result<Self> {
        let location = parse_remote_uri(uri)?;
        let mut bucket_url = Url::parse(&location.bucket_uri).map_err(|e| StateError::InvalidLocation {
            location: uri.to_string(),
            reason: e.to_string(),
        })?;

        let mut options: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| CREDENTIAL_ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        options.extend(bucket_url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())));
        bucket_url.set_query(None);

        let (store, _) = object_store::parse_url_opts(&bucket_url, options).map_err(|e| {
            StateError::backend(BACKEND, format!("cannot open {}: {}", location.bucket_uri, e))
                .with_hint("check the bucket URI and its options")
        })?;

        Self::with_store(Arc::from(store), &location.key, uri)
    }

    /// Use an already configured store
    pub fn with_store(store: Arc<dyn ObjectStore>, key: &str, uri: &str) -> Result<Self> {
        let path = ObjectPath::parse(key).map_err(|e| StateError::InvalidLocation {
            location: uri.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            store,
            path,
            uri: uri.to_string(),
        })
    }

    pub fn object_path(&self) -> &ObjectPath {
        &self.path
    }
}

#[async_trait]
impl StateStorage for RemoteStorage {
    async fn load(&self) -> Result<State> {
        let result = match self.store.get(&self.path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(uri = %self.uri, "no remote state, starting empty");
                return Ok(State::new());
            }
            Err(e) => {
                return Err(StateError::backend(BACKEND, format!("cannot read {}: {}", self.uri, e))
                    .with_hint("check the credentials and that the bucket exists"));
            }
        };

        let data = result.bytes().await.map_err(|e| {
            StateError::backend(BACKEND, format!("cannot read {}: {}", self.uri, e))
        })?;

        State::from_json(&data).map_err(|e| {
            StateError::backend(BACKEND, format!("{} is not a state file: {}", self.uri, e))
                .with_hint("delete or rename the object to start with an empty state")
        })
    }

    async fn save(&self, state: &State) -> Result<()> {
        let data = state
            .to_json()
            .map_err(|e| StateError::backend(BACKEND, format!("cannot serialize state: {}", e)))?;

        self.store
            .put(&self.path, PutPayload::from(data))
            .await
            .map_err(|e| {
                StateError::backend(BACKEND, format!("cannot write {}: {}", self.uri, e))
                    .with_hint("check the credentials and write permissions on the bucket")
            })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("remote object {}", self.uri)
    }
}
