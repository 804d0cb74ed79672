//! Manifest loading
//!
//! Reads YAML/JSON files (or directories of them), interpolates environment
//! variables, splits multi-document streams and expands file includes.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::interpolate::interpolate_env;
use crate::resource::Resource;

/// Field under `spec` naming a file whose content replaces it as `schema`
const SCHEMA_FILE_FIELD: &str = "schemaFile";
const SCHEMA_FIELD: &str = "schema";

/// Options controlling manifest loading
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Fail on undefined environment variables without default
    pub strict: bool,
}

/// Load every resource from the given files and directories, in path order
pub fn load_paths(paths: &[PathBuf], options: LoadOptions) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();
    for path in paths {
        for file in manifest_files(path)? {
            resources.extend(load_file(&file, options)?);
        }
    }
    Ok(resources)
}

/// Load all resources from one file
pub fn load_file(path: &Path, options: LoadOptions) -> Result<Vec<Resource>> {
    let content = std::fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let resources = load_str(&content, &path.display().to_string(), base_dir, options)?;
    Ok(resources
        .into_iter()
        .map(|r| r.with_source(path))
        .collect())
}

/// Load all resources from a multi-document string
pub fn load_str(
    content: &str,
    source_name: &str,
    base_dir: &Path,
    options: LoadOptions,
) -> Result<Vec<Resource>> {
    let content = interpolate_env(content, options.strict)?;
    let mut resources = Vec::new();

    for document in serde_yaml::Deserializer::from_str(&content) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue; // empty document between separators
        }
        let mut resource = Resource::from_value(value, source_name)?;
        expand_includes(&mut resource, base_dir)?;
        resources.push(resource);
    }

    Ok(resources)
}

/// Replace `spec.schemaFile` with the file's content under `spec.schema`
fn expand_includes(resource: &mut Resource, base_dir: &Path) -> Result<()> {
    let Some(spec) = resource.spec_mut() else {
        return Ok(());
    };
    let Some(file) = spec.get(SCHEMA_FILE_FIELD).and_then(Value::as_str) else {
        return Ok(());
    };

    let path = base_dir.join(file);
    let schema = std::fs::read_to_string(&path).map_err(|e| CoreError::InvalidManifest {
        source_name: path.display().to_string(),
        message: format!("cannot read {}: {}", SCHEMA_FILE_FIELD, e),
    })?;

    spec.remove(SCHEMA_FILE_FIELD);
    spec.insert(SCHEMA_FIELD.to_string(), Value::String(schema));
    Ok(())
}

fn manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(CoreError::ManifestNotFound {
            path: path.display().to_string(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_manifest_file(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWO_DOCS: &str = r#"
apiVersion: v2
kind: Topic
metadata:
  name: orders
  cluster: prod
spec:
  partitions: 3
---
---
apiVersion: v1
kind: Application
metadata:
  name: shop
spec:
  title: Shop
"#;

    #[test]
    fn test_multi_document() {
        let resources = load_str(TWO_DOCS, "test", Path::new("."), LoadOptions::default()).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].key(), "Topic/orders");
        assert_eq!(resources[1].key(), "Application/shop");
    }

    #[test]
    fn test_schema_file_expansion() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("orders.avsc"), "{\"type\":\"string\"}").unwrap();

        let yaml = r#"
apiVersion: v2
kind: Subject
metadata:
  name: orders-value
  cluster: prod
spec:
  format: AVRO
  schemaFile: orders.avsc
"#;
        let resources = load_str(yaml, "test", tmp.path(), LoadOptions::default()).unwrap();
        let spec = resources[0].document.get("spec").unwrap();
        assert!(spec.get("schemaFile").is_none());
        assert_eq!(spec.get("schema").unwrap(), "{\"type\":\"string\"}");
    }

    #[test]
    fn test_missing_schema_file() {
        let yaml = "apiVersion: v2\nkind: Subject\nmetadata:\n  name: s\nspec:\n  schemaFile: nope.avsc\n";
        let tmp = TempDir::new().unwrap();
        let err = load_str(yaml, "test", tmp.path(), LoadOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidManifest { .. }));
    }

    #[test]
    fn test_load_directory_sorted() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(
            tmp.path().join("b.yaml"),
            "apiVersion: v1\nkind: User\nmetadata:\n  name: b\n",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("nested/a.json"),
            r#"{"apiVersion":"v1","kind":"User","metadata":{"name":"a"}}"#,
        )
        .unwrap();
        std::fs::write(tmp.path().join("README.md"), "# not a manifest").unwrap();

        let resources = load_paths(&[tmp.path().to_path_buf()], LoadOptions::default()).unwrap();
        let names: Vec<_> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(resources[0].source.is_some());
    }

    #[test]
    fn test_missing_path() {
        let err = load_paths(&[PathBuf::from("/definitely/not/here")], LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::ManifestNotFound { .. }));
    }
}
