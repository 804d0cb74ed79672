//! Build a [`Catalog`] from an OpenAPI description
//!
//! Kinds are discovered by convention: the write operation (PUT, else POST) of
//! a collection path carries a tag
//!
//! ```text
//! cli_<kind>_<family>_v<version>[_<priority>]
//! ```
//!
//! e.g. `cli_topic_kafka_v2_3`. Paths without such a tag are ignored. Non-CRUD
//! actions are tagged `run_<name>_<family>` on any operation.

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::catalog::{
    Backend, BackendKind, Catalog, GatewayDeleteMode, KindVersion, Priority, QueryOption,
    QueryValueType, Run,
};
use crate::error::{CatalogError, CatalogResult};

/// Query parameters that control server behaviour rather than identify a parent
const CONTROL_QUERY_PARAMS: [&str; 2] = ["dryMode", "dryRun"];

/// Kebab names whose kind name is not the plain PascalCase conversion
const KIND_NAME_OVERRIDES: [(&str, &str); 3] = [
    ("service-accounts", "ServiceAccount"),
    ("gateway-service-accounts", "GatewayServiceAccount"),
    ("alias-topics", "AliasTopic"),
];

/// Bound on schemas visited through composition, against reference cycles
const MAX_COMPOSED_SCHEMAS: usize = 64;

/// Prefixes removed from query parameter names to form flag names
const FLAG_PREFIXES: [&str; 1] = ["filter-by-"];

/// Abbreviations expanded in flag names
const FLAG_EXPANSIONS: [(&str, &str); 1] = [("app-instance", "application-instance")];

/// Parser options
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Require metadata schemas to declare parent parameters and every kind to
    /// carry a priority
    pub strict: bool,
}

/// Parse an OpenAPI document (JSON or YAML) describing one backend
pub fn parse_catalog(source: &str, backend: Backend, options: ParseOptions) -> CatalogResult<Catalog> {
    let document: Document = serde_yaml::from_str(source)
        .map_err(|e| CatalogError::InvalidDescription(e.to_string()))?;
    CatalogBuilder {
        document: &document,
        backend,
        options,
    }
    .build()
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    paths: IndexMap<String, PathItem>,
    #[serde(default)]
    components: Components,
}

#[derive(Debug, Default, Deserialize)]
struct Components {
    #[serde(default)]
    schemas: IndexMap<String, Value>,
    #[serde(default)]
    parameters: IndexMap<String, Parameter>,
}

#[derive(Debug, Default, Deserialize)]
struct PathItem {
    get: Option<Operation>,
    put: Option<Operation>,
    post: Option<Operation>,
    patch: Option<Operation>,
    delete: Option<Operation>,
    #[serde(default)]
    parameters: Vec<ParameterOrRef>,
}

impl PathItem {
    fn operations(&self) -> impl Iterator<Item = (&'static str, &Operation)> {
        [
            ("GET", self.get.as_ref()),
            ("PUT", self.put.as_ref()),
            ("POST", self.post.as_ref()),
            ("PATCH", self.patch.as_ref()),
            ("DELETE", self.delete.as_ref()),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.map(|op| (method, op)))
    }

    fn write(&self) -> Option<&Operation> {
        self.put.as_ref().or(self.post.as_ref())
    }
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parameters: Vec<ParameterOrRef>,
    #[serde(rename = "requestBody")]
    request_body: Option<RequestBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParameterOrRef {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Item(Parameter),
}

#[derive(Debug, Clone, Deserialize)]
struct Parameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestBody {
    #[serde(default)]
    content: IndexMap<String, MediaType>,
}

#[derive(Debug, Deserialize)]
struct MediaType {
    schema: Option<Value>,
    example: Option<Value>,
}

/// Components of a parsed `cli_` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindTag {
    pub kind: String,
    pub family: String,
    pub version: u32,
    pub priority: Priority,
}

/// Parse a `cli_<kind>_<family>_v<version>[_<priority>]` tag
///
/// Returns `Ok(None)` for tags that are not catalog tags at all.
pub fn parse_kind_tag(tag: &str) -> Result<Option<KindTag>, String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^cli_([a-z0-9-]+)_([a-z0-9-]+)_v(\d+)(?:_(\d+))?$").expect("tag pattern is valid")
    });

    if !tag.starts_with("cli_") {
        return Ok(None);
    }
    let caps = pattern
        .captures(tag)
        .ok_or_else(|| "expected cli_<kind>_<family>_v<version>[_<priority>]".to_string())?;

    let version = caps[3]
        .parse()
        .map_err(|e| format!("invalid version: {}", e))?;
    let priority = match caps.get(4) {
        Some(p) => Priority::Explicit(
            p.as_str()
                .parse()
                .map_err(|e| format!("invalid priority: {}", e))?,
        ),
        None => Priority::Unspecified,
    };

    Ok(Some(KindTag {
        kind: kind_name(&caps[1]),
        family: caps[2].to_string(),
        version,
        priority,
    }))
}

/// Parse a `run_<name>_<family>` tag into the run name
fn parse_run_tag(tag: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^run_([a-z0-9-]+)_([a-z0-9-]+)$").expect("run pattern is valid"));
    pattern.captures(tag).map(|c| c[1].to_string())
}

/// Kebab-case tag segment to kind name
pub fn kind_name(kebab: &str) -> String {
    if let Some((_, name)) = KIND_NAME_OVERRIDES.iter().find(|(k, _)| *k == kebab) {
        return name.to_string();
    }
    kebab
        .split('-')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Query parameter name to flag name
pub fn flag_name(query_name: &str) -> String {
    let mut kebab = String::with_capacity(query_name.len() + 4);
    for (i, c) in query_name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                kebab.push('-');
            }
            kebab.extend(c.to_lowercase());
        } else if c == '_' {
            kebab.push('-');
        } else {
            kebab.push(c);
        }
    }

    for prefix in FLAG_PREFIXES {
        if let Some(stripped) = kebab.strip_prefix(prefix) {
            kebab = stripped.to_string();
        }
    }
    for (short, long) in FLAG_EXPANSIONS {
        if kebab.contains(short) && !kebab.contains(long) {
            kebab = kebab.replace(short, long);
        }
    }
    kebab
}

struct CatalogBuilder<'a> {
    document: &'a Document,
    backend: Backend,
    options: ParseOptions,
}

impl<'a> CatalogBuilder<'a> {
    fn build(&self) -> CatalogResult<Catalog> {
        let mut catalog = Catalog::new();
        let document: &'a Document = self.document;

        for (path, item) in &document.paths {
            if let (Some(write), Some(read)) = (item.write(), item.get.as_ref()) {
                for tag in &write.tags {
                    let parsed = parse_kind_tag(tag).map_err(|reason| CatalogError::MalformedTag {
                        tag: tag.clone(),
                        path: path.clone(),
                        reason,
                    })?;
                    if let Some(parsed) = parsed {
                        let version = self.kind_version(path, item, write, read, parsed)?;
                        tracing::debug!(
                            kind = %version.name,
                            version = version.version,
                            priority = %version.priority,
                            "discovered kind"
                        );
                        catalog.add_kind_version(version)?;
                    }
                }
            }

            for (method, operation) in item.operations() {
                for tag in &operation.tags {
                    if let Some(name) = parse_run_tag(tag) {
                        catalog.add_run(self.run(name, method, path, item, operation));
                    }
                }
            }
        }

        Ok(catalog)
    }

    fn kind_version(
        &self,
        path: &str,
        item: &'a PathItem,
        write: &'a Operation,
        read: &'a Operation,
        tag: KindTag,
    ) -> CatalogResult<KindVersion> {
        let write_params = self.parameters(item, write);
        let parent_path_params = ordered_path_params(path, &write_params);
        let parent_query_params: Vec<String> = write_params
            .iter()
            .filter(|p| p.location == "query" && p.required)
            .filter(|p| !CONTROL_QUERY_PARAMS.contains(&p.name.as_str()))
            .map(|p| p.name.clone())
            .collect();

        let list_query_options = self.query_options(&self.parameters(item, read));
        let describe_query_options = self
            .describe_operation(path)
            .map(|(item, op)| self.query_options(&self.parameters(item, op)))
            .unwrap_or_default();

        let body_schema = write.request_body.as_ref().and_then(|b| self.body_schema(b));
        let metadata = body_schema.and_then(|s| self.property(s, "metadata"));
        let example = write.request_body.as_ref().and_then(|b| self.body_example(b));

        if self.options.strict {
            let required = metadata.map(|m| self.required_fields(m)).unwrap_or_default();
            for param in &parent_path_params {
                if !required.contains(&param.as_str()) {
                    return Err(CatalogError::Inconsistent {
                        kind: tag.kind,
                        version: tag.version,
                        reason: format!(
                            "path parameter '{}' is not a required field of metadata",
                            param
                        ),
                    });
                }
            }
            if !tag.priority.is_explicit() {
                return Err(CatalogError::Inconsistent {
                    kind: tag.kind,
                    version: tag.version,
                    reason: "no priority in catalog tag".to_string(),
                });
            }
        }

        let backend = match self.backend {
            Backend::Console => BackendKind::Console,
            Backend::Gateway => BackendKind::Gateway {
                delete: self.gateway_delete_mode(metadata),
            },
        };

        Ok(KindVersion {
            name: tag.kind,
            version: tag.version,
            list_path: path.to_string(),
            parent_path_params,
            parent_query_params,
            list_query_options,
            describe_query_options,
            priority: tag.priority,
            example,
            backend,
        })
    }

    fn run(&self, name: String, method: &str, path: &str, item: &PathItem, operation: &Operation) -> Run {
        let params = self.parameters(item, operation);
        Run {
            name,
            backend: self.backend,
            method: method.to_string(),
            path: path.to_string(),
            path_params: ordered_path_params(path, &params),
            query_params: self.query_options(&params),
            has_body: operation.request_body.is_some(),
        }
    }

    fn gateway_delete_mode(&self, metadata: Option<&'a Value>) -> GatewayDeleteMode {
        let has = |field: &str| {
            metadata
                .and_then(|m| self.property(m, field))
                .is_some()
        };
        if has("scope") {
            GatewayDeleteMode::InterceptorScope
        } else if has("vCluster") {
            GatewayDeleteMode::ByNameAndScope
        } else {
            GatewayDeleteMode::ByName
        }
    }

    /// Path-level and operation-level parameters, refs resolved
    fn parameters(&self, item: &PathItem, operation: &Operation) -> Vec<Parameter> {
        item.parameters
            .iter()
            .chain(&operation.parameters)
            .filter_map(|p| match p {
                ParameterOrRef::Item(p) => Some(p.clone()),
                ParameterOrRef::Ref { reference } => reference
                    .strip_prefix("#/components/parameters/")
                    .and_then(|name| self.document.components.parameters.get(name))
                    .cloned(),
            })
            .collect()
    }

    fn query_options(&self, params: &[Parameter]) -> Vec<QueryOption> {
        params
            .iter()
            .filter(|p| p.location == "query" && !p.required)
            .filter_map(|p| {
                let schema = self.resolve(p.schema.as_ref()?);
                let value_type = match schema.get("type").and_then(Value::as_str)? {
                    "string" => QueryValueType::String,
                    "boolean" => QueryValueType::Boolean,
                    "integer" => QueryValueType::Integer,
                    "number" => QueryValueType::Number,
                    _ => return None,
                };
                Some(QueryOption {
                    query_name: p.name.clone(),
                    flag_name: flag_name(&p.name),
                    value_type,
                })
            })
            .collect()
    }

    /// GET operation on `<path>/{name}`, if the backend has one
    fn describe_operation(&self, path: &str) -> Option<(&'a PathItem, &'a Operation)> {
        let prefix = format!("{}/{{", path);
        self.document.paths.iter().find_map(|(p, item)| {
            let rest = p.strip_prefix(&prefix)?;
            if rest.ends_with('}') && !rest.contains('/') {
                item.get.as_ref().map(|op| (item, op))
            } else {
                None
            }
        })
    }

    fn body_schema(&self, body: &'a RequestBody) -> Option<&'a Value> {
        let media = body
            .content
            .get("application/json")
            .or_else(|| body.content.values().next())?;
        media.schema.as_ref().map(|s| self.resolve(s))
    }

    fn body_example(&self, body: &'a RequestBody) -> Option<Value> {
        let media = body
            .content
            .get("application/json")
            .or_else(|| body.content.values().next())?;
        media
            .example
            .clone()
            .or_else(|| self.body_schema(body)?.get("example").cloned())
    }

    fn property(&self, schema: &'a Value, name: &str) -> Option<&'a Value> {
        self.composed(schema)
            .into_iter()
            .find_map(|s| s.get("properties").and_then(|p| p.get(name)))
            .map(|s| self.resolve(s))
    }

    /// Required property names, merged across composed members
    fn required_fields(&self, schema: &'a Value) -> Vec<&'a str> {
        self.composed(schema)
            .into_iter()
            .filter_map(|s| s.get("required").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .collect()
    }

    /// A schema followed by its `allOf`/`oneOf`/`anyOf` members, depth first
    fn composed(&self, schema: &'a Value) -> Vec<&'a Value> {
        let mut found = Vec::new();
        let mut pending = vec![self.resolve(schema)];
        while let Some(schema) = pending.pop() {
            if found.len() >= MAX_COMPOSED_SCHEMAS {
                break;
            }
            found.push(schema);
            for key in ["anyOf", "oneOf", "allOf"] {
                if let Some(members) = schema.get(key).and_then(Value::as_array) {
                    pending.extend(members.iter().rev().map(|m| self.resolve(m)));
                }
            }
        }
        found
    }

    /// Follow local `$ref`s into `components.schemas`
    fn resolve(&self, mut schema: &'a Value) -> &'a Value {
        for _ in 0..16 {
            let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
                return schema;
            };
            match reference
                .strip_prefix("#/components/schemas/")
                .and_then(|name| self.document.components.schemas.get(name))
            {
                Some(target) => schema = target,
                None => return schema,
            }
        }
        schema
    }
}

/// Required path parameters in the order their placeholders appear in `path`
fn ordered_path_params(path: &str, params: &[Parameter]) -> Vec<String> {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^}/]+)\}").expect("placeholder pattern is valid"));

    placeholder
        .captures_iter(path)
        .map(|c| c[1].to_string())
        .filter(|name| {
            params
                .iter()
                .any(|p| p.location == "path" && p.required && &p.name == name)
        })
        .collect()
}
