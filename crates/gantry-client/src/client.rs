//! HTTP client for one backend
//!
//! Every request carries the client version header and is bounded by a
//! timeout. Non-2xx responses become [`ClientError::Api`] with the message
//! taken from the structured error body.

use gantry_core::catalog::SCOPE_FIELDS;
use gantry_core::{Backend, KindVersion, Resource, Run};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{ClientError, Result, render_api_error};

/// Header carrying the client release
pub const CLIENT_VERSION_HEADER: &str = "x-gantry-client-version";

/// Header carrying the API contract version, sent and answered
pub const API_VERSION_HEADER: &str = "x-gantry-api-version";

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// API contract version this client speaks
pub const SUPPORTED_API_VERSION: &str = "v1";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query parameter asking the backend to validate without persisting
const DRY_MODE_PARAM: &str = "dryMode";

/// Credentials sent with every request
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
            Auth::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
        }
    }
}

/// Connection settings of one backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub auth: Auth,
    pub request_timeout: Duration,
    /// Path of the API description, relative to `base_url`
    pub description_path: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: Auth::None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            description_path: None,
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Outcome of an upsert as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertResult {
    Created,
    Updated,
    NotChanged,
}

impl UpsertResult {
    /// Read `upsertResult` from a write response; absent means updated
    pub fn from_response(response: &Value) -> Self {
        response
            .get("upsertResult")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(UpsertResult::Updated)
    }
}

impl std::fmt::Display for UpsertResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertResult::Created => write!(f, "Created"),
            UpsertResult::Updated => write!(f, "Updated"),
            UpsertResult::NotChanged => write!(f, "NotChanged"),
        }
    }
}

/// Client for the console or gateway API
#[derive(Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    backend: Backend,
    base_url: String,
    auth: Auth,
    request_timeout: Duration,
    description_path: String,
    version_warned: AtomicBool,
}

impl BackendClient {
    pub fn new(backend: Backend, config: ClientConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("{} URL '{}': {}", backend, config.base_url, e)))?;

        let http = reqwest::Client::builder()
            .user_agent(format!("gantry/{}", CLIENT_VERSION))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        let description_path = config
            .description_path
            .unwrap_or_else(|| default_description_path(backend).to_string());

        Ok(Self {
            http,
            backend,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth,
            request_timeout: config.request_timeout,
            description_path,
            version_warned: AtomicBool::new(false),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None, None).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.send(Method::PUT, path, Some(body), None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, path, body, None).await
    }

    pub async fn delete(&self, path: &str, body: Option<&Value>) -> Result<()> {
        self.send(Method::DELETE, path, body, None).await.map(|_| ())
    }

    /// DELETE bounded by its own timeout instead of the request timeout
    pub async fn delete_with_timeout(&self, path: &str, timeout: Duration) -> Result<()> {
        self.send(Method::DELETE, path, None, Some(timeout)).await.map(|_| ())
    }

    /// Raw API description text
    pub async fn fetch_description(&self) -> Result<String> {
        let path = self.description_path.clone();
        self.execute(Method::GET, &path, None, None).await
    }

    /// Upsert a resource at its resolved path
    pub async fn apply(&self, kind: &KindVersion, resource: &Resource, dry_run: bool) -> Result<UpsertResult> {
        let path = kind.apply_path(resource)?;
        let path = append_query(path, &[(DRY_MODE_PARAM, if dry_run { "true" } else { "false" })]);
        let response = self.put(&path, &resource.document).await?;
        Ok(UpsertResult::from_response(&response))
    }

    /// Current remote version of a resource, `None` if it does not exist
    ///
    /// Gateway kinds have no single-resource endpoint: the collection is
    /// listed and searched for a matching identity.
    pub async fn describe(&self, kind: &KindVersion, resource: &Resource) -> Result<Option<Value>> {
        if kind.backend.supports_describe() {
            let path = kind.resource_path(resource)?;
            return match self.get(&path).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            };
        }

        let path = kind.apply_path(resource)?;
        let listed = self.get(&path).await?;
        Ok(items(&listed)
            .into_iter()
            .find(|item| same_gateway_identity(resource, item))
            .cloned())
    }

    /// Delete a resource using its kind's delete semantics
    pub async fn delete_resource(&self, kind: &KindVersion, resource: &Resource) -> Result<()> {
        let target = kind.delete_target(resource)?;
        self.delete(&target.path, target.body.as_ref()).await
    }

    /// List a kind under the given parents, with extra query options
    pub async fn list(
        &self,
        kind: &KindVersion,
        parent_path_values: &[&str],
        parent_query_values: &[&str],
        options: &[(&str, &str)],
    ) -> Result<Vec<Value>> {
        let path = kind.list_path(parent_path_values, parent_query_values)?;
        let path = append_query(path, options);
        let listed = self.get(&path).await?;
        Ok(items(&listed).into_iter().cloned().collect())
    }

    /// Fetch one resource by name
    pub async fn get_one(
        &self,
        kind: &KindVersion,
        parent_path_values: &[&str],
        parent_query_values: &[&str],
        name: &str,
        options: &[(&str, &str)],
    ) -> Result<Option<Value>> {
        if kind.backend.supports_describe() {
            let path = kind.describe_path(parent_path_values, parent_query_values, name)?;
            let path = append_query(path, options);
            return match self.get(&path).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            };
        }

        let listed = self
            .list(kind, parent_path_values, parent_query_values, options)
            .await?;
        Ok(listed
            .into_iter()
            .find(|item| item.pointer("/metadata/name").and_then(Value::as_str) == Some(name)))
    }

    /// Execute a run
    pub async fn run(
        &self,
        run: &Run,
        path_values: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let method = Method::from_bytes(run.method.as_bytes())
            .map_err(|e| ClientError::InvalidConfig(format!("run {}: {}", run.name, e)))?;
        let path = run.path(path_values, query)?;
        self.send(method, &path, body, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let text = self.execute(method, path, body, timeout).await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let timeout = timeout.unwrap_or(self.request_timeout);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .timeout(timeout)
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
            .header(API_VERSION_HEADER, SUPPORTED_API_VERSION);
        request = match &self.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(backend = %self.backend, %method, path, "sending request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout {
                    method: method.to_string(),
                    path: path.to_string(),
                    seconds: timeout.as_secs(),
                }
            } else {
                ClientError::Network {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        self.check_api_version(&response);
        let status = response.status();
        let text = response.text().await.map_err(|e| ClientError::Network {
            url: url.clone(),
            message: e.to_string(),
        })?;

        if status.is_success() {
            return Ok(text);
        }

        let message = render_api_error(&text);
        if text.to_lowercase().contains("unsupported version") {
            return Err(ClientError::UnsupportedVersion {
                client_version: CLIENT_VERSION.to_string(),
                message,
            });
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            method: method.to_string(),
            path: path.to_string(),
            message,
        })
    }

    fn check_api_version(&self, response: &reqwest::Response) {
        let Some(server) = response
            .headers()
            .get(API_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        if server != SUPPORTED_API_VERSION && !self.version_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                backend = %self.backend,
                server_version = server,
                client_version = SUPPORTED_API_VERSION,
                "backend speaks a different API version, some operations may fail"
            );
        }
    }
}

/// Where each backend publishes its API description
pub fn default_description_path(backend: Backend) -> &'static str {
    match backend {
        Backend::Console => "/public/openapi.json",
        Backend::Gateway => "/gateway/openapi.json",
    }
}

/// Append query pairs, skipping empty values
pub fn append_query(path: String, query: &[(&str, &str)]) -> String {
    let pairs: Vec<_> = query.iter().filter(|(_, v)| !v.is_empty()).collect();
    if pairs.is_empty() {
        return path;
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}", path, separator, encoded)
}

/// Elements of a list response: a bare array or an object with `items`
fn items(listed: &Value) -> Vec<&Value> {
    match listed {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Whether a listed gateway item is the given resource
fn same_gateway_identity(resource: &Resource, item: &Value) -> bool {
    let Some(metadata) = item.get("metadata") else {
        return false;
    };
    if metadata.get("name").and_then(Value::as_str) != Some(resource.name.as_str()) {
        return false;
    }
    if let Some(scope) = resource.metadata.get("scope") {
        return metadata.get("scope") == Some(scope);
    }
    SCOPE_FIELDS.iter().all(|field| match resource.metadata.get(*field) {
        Some(expected) => metadata.get(*field) == Some(expected),
        None => true,
    })
}
