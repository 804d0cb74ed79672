//! In-memory catalog of the kinds and runs a backend exposes
//!
//! The catalog is pure data: it knows how to turn a resource (or a kind plus
//! parent identifiers) into request paths, but performs no I/O. It is built by
//! [`crate::openapi`] from an API description and may be merged across
//! backends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CatalogError, CatalogResult};
use crate::resource::Resource;

/// Sort key used for kinds whose description carries no priority
pub const DEFAULT_PRIORITY: u32 = 1000;

/// Metadata fields that scope gateway deletes
pub const SCOPE_FIELDS: [&str; 3] = ["vCluster", "group", "username"];

/// Ordering key of a kind version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Priority declared in the API description
    Explicit(u32),
    /// No ordering information
    #[default]
    Unspecified,
}

impl Priority {
    /// Key used for sorting; unspecified kinds go last on apply
    pub fn sort_key(self) -> u32 {
        match self {
            Priority::Explicit(p) => p,
            Priority::Unspecified => DEFAULT_PRIORITY,
        }
    }

    pub fn is_explicit(self) -> bool {
        matches!(self, Priority::Explicit(_))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Explicit(p) => write!(f, "{}", p),
            Priority::Unspecified => write!(f, "default"),
        }
    }
}

/// Which backend client serves a kind or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Console,
    Gateway,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Console => write!(f, "console"),
            Backend::Gateway => write!(f, "gateway"),
        }
    }
}

/// How a gateway resource is identified when deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayDeleteMode {
    /// `DELETE <list>/<name>`
    ByName,
    /// `DELETE <list>` with `{name, vCluster}` body
    ByNameAndScope,
    /// `DELETE <list>/<name>` with the `metadata.scope` body
    InterceptorScope,
}

/// Capability record of a kind version, fixed when the catalog is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    Console,
    Gateway { delete: GatewayDeleteMode },
}

impl BackendKind {
    pub fn backend(self) -> Backend {
        match self {
            BackendKind::Console => Backend::Console,
            BackendKind::Gateway { .. } => Backend::Gateway,
        }
    }

    /// Whether a single resource can be fetched at `<list>/<name>`
    pub fn supports_describe(self) -> bool {
        matches!(self, BackendKind::Console)
    }

    pub fn identified_by_name(self) -> bool {
        matches!(
            self,
            BackendKind::Console
                | BackendKind::Gateway {
                    delete: GatewayDeleteMode::ByName
                }
        )
    }

    pub fn identified_by_name_and_scope(self) -> bool {
        matches!(
            self,
            BackendKind::Gateway {
                delete: GatewayDeleteMode::ByNameAndScope
            }
        )
    }

    pub fn interceptor_delete(self) -> bool {
        matches!(
            self,
            BackendKind::Gateway {
                delete: GatewayDeleteMode::InterceptorScope
            }
        )
    }
}

/// Scalar type of a query option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryValueType {
    String,
    Boolean,
    Integer,
    Number,
}

/// An optional query parameter exposed as a command-line flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOption {
    /// Name on the wire
    pub query_name: String,
    /// Name as a flag
    pub flag_name: String,
    pub value_type: QueryValueType,
}

/// Path and parameter shape of one kind at one API version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindVersion {
    pub name: String,
    pub version: u32,
    /// Collection path template with `{param}` placeholders
    pub list_path: String,
    /// Required path parameters, in template order
    pub parent_path_params: Vec<String>,
    /// Required query parameters
    pub parent_query_params: Vec<String>,
    pub list_query_options: Vec<QueryOption>,
    pub describe_query_options: Vec<QueryOption>,
    pub priority: Priority,
    pub example: Option<Value>,
    pub backend: BackendKind,
}

impl KindVersion {
    /// Collection path with parents substituted
    ///
    /// Values are positional and percent-encoded as single path segments. A
    /// count mismatch is a caller bug and reported as
    /// [`CatalogError::Internal`]. Empty query values are omitted.
    pub fn list_path(
        &self,
        parent_path_values: &[&str],
        parent_query_values: &[&str],
    ) -> CatalogResult<String> {
        if parent_path_values.len() != self.parent_path_params.len() {
            return Err(CatalogError::Internal(format!(
                "{} v{}: expected {} parent path values, got {}",
                self.name,
                self.version,
                self.parent_path_params.len(),
                parent_path_values.len()
            )));
        }
        if parent_query_values.len() != self.parent_query_params.len() {
            return Err(CatalogError::Internal(format!(
                "{} v{}: expected {} parent query values, got {}",
                self.name,
                self.version,
                self.parent_query_params.len(),
                parent_query_values.len()
            )));
        }

        let mut path = self.list_path.clone();
        for (param, value) in self.parent_path_params.iter().zip(parent_path_values) {
            path = path.replace(&format!("{{{}}}", param), &urlencoding::encode(value));
        }

        let query: Vec<(&str, &str)> = self
            .parent_query_params
            .iter()
            .zip(parent_query_values)
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), *v))
            .collect();

        Ok(append_query(path, &query))
    }

    /// Single-resource path: list path + `/` + name
    pub fn describe_path(
        &self,
        parent_path_values: &[&str],
        parent_query_values: &[&str],
        name: &str,
    ) -> CatalogResult<String> {
        let list = self.list_path(parent_path_values, &vec![""; self.parent_query_params.len()])?;
        let path = format!("{}/{}", list, urlencoding::encode(name));
        let query: Vec<(&str, &str)> = self
            .parent_query_params
            .iter()
            .zip(parent_query_values)
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        Ok(append_query(path, &query))
    }

    /// Read parent values for `resource` from its metadata
    fn parent_values(&self, resource: &Resource) -> CatalogResult<(Vec<String>, Vec<String>)> {
        let path_values = self
            .parent_path_params
            .iter()
            .map(|param| {
                metadata_value(&resource.metadata, param).ok_or_else(|| {
                    CatalogError::MissingParameter {
                        kind: resource.kind.clone(),
                        name: resource.name.clone(),
                        parameter: param.clone(),
                    }
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;

        let query_values = self
            .parent_query_params
            .iter()
            .map(|param| metadata_value(&resource.metadata, param).unwrap_or_default())
            .collect();

        Ok((path_values, query_values))
    }

    /// Path a resource is upserted to
    pub fn apply_path(&self, resource: &Resource) -> CatalogResult<String> {
        let (path_values, query_values) = self.parent_values(resource)?;
        self.list_path(&as_strs(&path_values), &as_strs(&query_values))
    }

    /// Path a resource is read back from (console kinds only)
    pub fn resource_path(&self, resource: &Resource) -> CatalogResult<String> {
        let (path_values, query_values) = self.parent_values(resource)?;
        self.describe_path(&as_strs(&path_values), &as_strs(&query_values), &resource.name)
    }

    /// Request shape that deletes `resource`
    pub fn delete_target(&self, resource: &Resource) -> CatalogResult<DeleteTarget> {
        let (path_values, query_values) = self.parent_values(resource)?;
        let path_values = as_strs(&path_values);
        let query_values = as_strs(&query_values);

        let target = match self.backend {
            BackendKind::Console
            | BackendKind::Gateway {
                delete: GatewayDeleteMode::ByName,
            } => DeleteTarget {
                path: self.describe_path(&path_values, &query_values, &resource.name)?,
                body: None,
            },
            BackendKind::Gateway {
                delete: GatewayDeleteMode::ByNameAndScope,
            } => {
                let mut body = Map::new();
                body.insert("name".to_string(), Value::String(resource.name.clone()));
                for field in SCOPE_FIELDS {
                    if let Some(value) = resource.metadata.get(field) {
                        body.insert(field.to_string(), value.clone());
                    }
                }
                DeleteTarget {
                    path: self.list_path(&path_values, &query_values)?,
                    body: Some(Value::Object(body)),
                }
            }
            BackendKind::Gateway {
                delete: GatewayDeleteMode::InterceptorScope,
            } => {
                let scope = resource
                    .metadata
                    .get("scope")
                    .and_then(Value::as_object)
                    .map(|scope| {
                        SCOPE_FIELDS
                            .iter()
                            .filter_map(|f| scope.get(*f).map(|v| (f.to_string(), v.clone())))
                            .collect::<Map<String, Value>>()
                    })
                    .unwrap_or_default();
                DeleteTarget {
                    path: self.describe_path(&path_values, &query_values, &resource.name)?,
                    body: Some(Value::Object(scope)),
                }
            }
        };

        Ok(target)
    }
}

/// Request shape of a delete
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTarget {
    pub path: String,
    /// JSON body carrying scope parameters, for gateway kinds that need one
    pub body: Option<Value>,
}

/// All versions of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    pub name: String,
    versions: BTreeMap<u32, KindVersion>,
}

impl Kind {
    pub fn new(version: KindVersion) -> Self {
        let mut versions = BTreeMap::new();
        let name = version.name.clone();
        versions.insert(version.version, version);
        Self { name, versions }
    }

    /// Add (or replace) a version; its name must match this kind
    pub fn add_version(&mut self, version: KindVersion) -> CatalogResult<()> {
        if version.name != self.name {
            return Err(CatalogError::KindMismatch {
                expected: self.name.clone(),
                found: version.name,
            });
        }
        self.versions.insert(version.version, version);
        Ok(())
    }

    /// Highest known version, `None` only for a kind deserialized without versions
    pub fn latest(&self) -> Option<&KindVersion> {
        self.versions.values().next_back()
    }

    pub fn version(&self, version: u32) -> Option<&KindVersion> {
        self.versions.get(&version)
    }

    /// Version matching a declared `apiVersion` such as `v2`
    pub fn version_for(&self, api_version: &str) -> CatalogResult<&KindVersion> {
        let number = parse_api_version(api_version)?;
        self.version(number).ok_or_else(|| CatalogError::UnknownVersion {
            kind: self.name.clone(),
            version: number,
        })
    }

    pub fn versions(&self) -> impl Iterator<Item = &KindVersion> {
        self.versions.values()
    }
}

/// A non-CRUD action exposed by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub name: String,
    pub backend: Backend,
    /// Upper-case HTTP method
    pub method: String,
    pub path: String,
    pub path_params: Vec<String>,
    pub query_params: Vec<QueryOption>,
    pub has_body: bool,
}

impl Run {
    /// Concrete path for positional path values and named query values
    pub fn path(&self, path_values: &[&str], query: &[(&str, &str)]) -> CatalogResult<String> {
        if path_values.len() != self.path_params.len() {
            return Err(CatalogError::Internal(format!(
                "run {}: expected {} path values, got {}",
                self.name,
                self.path_params.len(),
                path_values.len()
            )));
        }
        let mut path = self.path.clone();
        for (param, value) in self.path_params.iter().zip(path_values) {
            path = path.replace(&format!("{{{}}}", param), &urlencoding::encode(value));
        }
        let query: Vec<(&str, &str)> = query.iter().filter(|(_, v)| !v.is_empty()).copied().collect();
        Ok(append_query(path, &query))
    }
}

/// Kinds and runs of one or more backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    kinds: BTreeMap<String, Kind>,
    runs: BTreeMap<String, Run>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind version, accumulating versions of the same kind
    pub fn add_kind_version(&mut self, version: KindVersion) -> CatalogResult<()> {
        match self.kinds.get_mut(&version.name) {
            Some(kind) => kind.add_version(version),
            None => {
                self.kinds.insert(version.name.clone(), Kind::new(version));
                Ok(())
            }
        }
    }

    pub fn add_run(&mut self, run: Run) {
        self.runs.insert(run.name.clone(), run);
    }

    /// Merge another catalog into this one; on name collision `other` wins
    pub fn merge(&mut self, other: Catalog) {
        for (name, kind) in other.kinds {
            if self.kinds.contains_key(&name) {
                tracing::debug!(kind = %name, "kind defined by several backends, last one wins");
            }
            self.kinds.insert(name, kind);
        }
        for (name, run) in other.runs {
            if self.runs.contains_key(&name) {
                tracing::debug!(run = %name, "run defined by several backends, last one wins");
            }
            self.runs.insert(name, run);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.runs.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.values()
    }

    pub fn runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    pub fn run(&self, name: &str) -> Option<&Run> {
        self.runs.get(name)
    }

    /// Exact kind lookup
    pub fn kind(&self, name: &str) -> Option<&Kind> {
        self.kinds.get(name)
    }

    /// Case-insensitive kind lookup with a suggestion on miss
    pub fn find_kind(&self, name: &str) -> CatalogResult<&Kind> {
        if let Some(kind) = self.kinds.get(name) {
            return Ok(kind);
        }
        self.kinds
            .values()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CatalogError::UnknownKind {
                kind: name.to_string(),
                suggestion: self.suggest_kind(name),
            })
    }

    fn suggest_kind(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        self.kinds
            .keys()
            .map(|k| (k, strsim::jaro_winkler(&lower, &k.to_lowercase())))
            .filter(|(_, score)| *score > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(k, _)| k.clone())
    }

    /// Kind version matching a resource's kind and apiVersion
    pub fn kind_version_for(&self, resource: &Resource) -> CatalogResult<&KindVersion> {
        let kind = self.kind(&resource.kind).ok_or_else(|| CatalogError::UnknownKind {
            kind: resource.kind.clone(),
            suggestion: self.suggest_kind(&resource.kind),
        })?;
        kind.version_for(&resource.api_version)
    }

    /// Priority of `(kind, apiVersion)` if both are known
    pub fn priority_of(&self, kind: &str, api_version: &str) -> Option<Priority> {
        let number = parse_api_version(api_version).ok()?;
        self.kind(kind)?.version(number).map(|kv| kv.priority)
    }

    pub fn apply_path(&self, resource: &Resource) -> CatalogResult<String> {
        self.kind_version_for(resource)?.apply_path(resource)
    }

    pub fn delete_target(&self, resource: &Resource) -> CatalogResult<DeleteTarget> {
        self.kind_version_for(resource)?.delete_target(resource)
    }
}

/// Extract the numeric version from an apiVersion such as `v2` or `gateway/v2`
pub fn parse_api_version(api_version: &str) -> CatalogResult<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"v(\d+)").expect("version pattern is valid"));

    pattern
        .captures(api_version)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| CatalogError::InvalidApiVersion {
            api_version: api_version.to_string(),
        })
}

fn metadata_value(metadata: &Map<String, Value>, field: &str) -> Option<String> {
    match metadata.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn append_query(path: String, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path;
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish();
    format!("{}?{}", path, encoded)
}
