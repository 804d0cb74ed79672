//! Declarative resources as read from manifests
//!
//! A resource is an order-preserving JSON document with the three fields every
//! backend requires: `apiVersion`, `kind` and `metadata.name`. The document is
//! kept verbatim so it can be re-serialized for the wire exactly as written.

use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{CoreError, Result};

/// Metadata key excluded from resource identity
pub const LABELS_KEY: &str = "labels";

/// A declarative resource loaded from a manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Declared API version, e.g. `v2`
    pub api_version: String,
    /// Kind name, e.g. `Topic`
    pub kind: String,
    /// `metadata.name`
    pub name: String,
    /// Full metadata map (may carry parent-scoping fields like `cluster`)
    pub metadata: Map<String, Value>,
    /// The whole document
    pub document: Value,
    /// File the resource was read from, if any
    pub source: Option<PathBuf>,
}

impl Resource {
    /// Build a resource from a parsed document
    pub fn from_value(document: Value, source_name: &str) -> Result<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| CoreError::InvalidManifest {
                source_name: source_name.to_string(),
                message: "document is not a mapping".to_string(),
            })?;

        let api_version = required_str(object.get("apiVersion"), "apiVersion", source_name)?;
        let kind = required_str(object.get("kind"), "kind", source_name)?;

        let metadata = object
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata".to_string(),
                source_name: source_name.to_string(),
            })?;
        let name = required_str(metadata.get("name"), "metadata.name", source_name)?;

        Ok(Self {
            api_version,
            kind,
            name,
            metadata,
            document,
            source: None,
        })
    }

    /// Parse a single JSON or YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value, "<inline>")
    }

    /// Attach the file the resource came from
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Short unique-ish key used in messages: `Kind/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }

    /// Read a string field from metadata
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }

    /// Metadata without `labels`, the part that takes part in identity
    pub fn identity_metadata(&self) -> Map<String, Value> {
        identity_metadata(&self.metadata)
    }

    /// Whether this resource has the identity `(api_version, kind, metadata)`
    pub fn has_identity(&self, api_version: &str, kind: &str, metadata: &Map<String, Value>) -> bool {
        self.api_version == api_version
            && self.kind == kind
            && self.identity_metadata() == identity_metadata(metadata)
    }

    /// Compact JSON body sent to the backend
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.document)?)
    }

    /// Mutable access to the `spec` object
    pub(crate) fn spec_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.document.get_mut("spec")?.as_object_mut()
    }
}

/// Strip `labels` from a metadata map
pub fn identity_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    metadata
        .iter()
        .filter(|(k, _)| k.as_str() != LABELS_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn required_str(value: Option<&Value>, field: &str, source_name: &str) -> Result<String> {
    match value.and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(CoreError::MissingField {
            field: field.to_string(),
            source_name: source_name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_resource() {
        let yaml = r#"
apiVersion: v2
kind: Topic
metadata:
  name: orders
  cluster: prod
  labels:
    team: payments
spec:
  partitions: 3
"#;

        let resource = Resource::from_yaml(yaml).unwrap();
        assert_eq!(resource.api_version, "v2");
        assert_eq!(resource.kind, "Topic");
        assert_eq!(resource.name, "orders");
        assert_eq!(resource.metadata_str("cluster"), Some("prod"));
        assert_eq!(resource.key(), "Topic/orders");
    }

    #[test]
    fn test_missing_name() {
        let yaml = "apiVersion: v1\nkind: Topic\nmetadata:\n  cluster: prod\n";
        let err = Resource::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { ref field, .. } if field == "metadata.name"));
    }

    #[test]
    fn test_missing_kind() {
        let err = Resource::from_value(json!({"apiVersion": "v1", "metadata": {"name": "a"}}), "a.yaml")
            .unwrap_err();
        assert!(err.to_string().contains("'kind'"));
        assert!(err.to_string().contains("a.yaml"));
    }

    #[test]
    fn test_identity_ignores_labels() {
        let resource = Resource::from_value(
            json!({
                "apiVersion": "v2",
                "kind": "Topic",
                "metadata": {"name": "orders", "cluster": "prod", "labels": {"a": "1"}}
            }),
            "t",
        )
        .unwrap();

        let other = json!({"name": "orders", "cluster": "prod", "labels": {"b": "2"}});
        assert!(resource.has_identity("v2", "Topic", other.as_object().unwrap()));

        let different = json!({"name": "orders", "cluster": "dev"});
        assert!(!resource.has_identity("v2", "Topic", different.as_object().unwrap()));
        assert!(!resource.has_identity("v1", "Topic", other.as_object().unwrap()));
    }

    #[test]
    fn test_document_order_preserved() {
        let yaml = "apiVersion: v1\nkind: User\nmetadata:\n  name: bob\nspec:\n  zeta: 1\n  alpha: 2\n";
        let resource = Resource::from_yaml(yaml).unwrap();
        let json = resource.to_json().unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
    }
}
