//! Record of the resources Gantry manages
//!
//! The state lists every resource successfully applied with state enabled.
//! A resource present in the state but absent from the current manifests was
//! removed by the user and is deleted on the next apply.

use chrono::{DateTime, Utc};
use gantry_core::Resource;
use gantry_core::resource::identity_metadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StateError};

/// Current state file format
pub const STATE_VERSION: &str = "v1";

/// Identity of one managed resource
///
/// Equality ignores `metadata.labels`: relabelling a resource does not make
/// it a different resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResource {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ManagedResource {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
            metadata: resource.metadata.clone(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(Value::as_str)
    }

    /// `Kind/name` for messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.kind, self.name().unwrap_or("<unnamed>"))
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        resource.has_identity(&self.api_version, &self.kind, &self.metadata)
    }

    /// Rebuild a minimal resource, enough to resolve a delete request
    pub fn to_resource(&self) -> Result<Resource> {
        let document = serde_json::json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "metadata": self.metadata,
        });
        Resource::from_value(document, "state").map_err(|e| StateError::InvalidRecord {
            kind: self.kind.clone(),
            message: e.to_string(),
        })
    }
}

impl PartialEq for ManagedResource {
    fn eq(&self, other: &Self) -> bool {
        self.api_version == other.api_version
            && self.kind == other.kind
            && identity_metadata(&self.metadata) == identity_metadata(&other.metadata)
    }
}

/// Persisted set of managed resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub resources: Vec<ManagedResource>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Empty state at the current format version
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            last_updated: Utc::now(),
            resources: Vec::new(),
        }
    }

    /// Parse state JSON, rejecting unknown format versions
    pub fn from_json(data: &[u8]) -> std::result::Result<Self, String> {
        let state: State = serde_json::from_slice(data).map_err(|e| e.to_string())?;
        if state.version != STATE_VERSION {
            return Err(format!(
                "unsupported state version '{}' (expected '{}')",
                state.version, STATE_VERSION
            ));
        }
        Ok(state)
    }

    /// Pretty JSON with a refreshed timestamp
    pub fn to_json(&self) -> std::result::Result<Vec<u8>, String> {
        let mut stamped = self.clone();
        stamped.last_updated = Utc::now();
        serde_json::to_vec_pretty(&stamped).map_err(|e| e.to_string())
    }

    pub fn is_managed(&self, resource: &Resource) -> bool {
        self.resources.iter().any(|r| r.matches(resource))
    }

    /// Record a resource; an identity-equal record is replaced so its labels
    /// stay current and no duplicate is added
    pub fn add_managed(&mut self, resource: &Resource) {
        let record = ManagedResource::from_resource(resource);
        match self.resources.iter_mut().find(|r| r.matches(resource)) {
            Some(existing) => *existing = record,
            None => self.resources.push(record),
        }
    }

    /// Forget a resource; returns whether it was recorded
    pub fn remove_managed(&mut self, resource: &Resource) -> bool {
        let before = self.resources.len();
        self.resources.retain(|r| !r.matches(resource));
        self.resources.len() != before
    }

    /// Forget every record of `kind` named `name`, whatever its scope
    pub fn untrack(&mut self, kind: &str, name: &str) -> usize {
        let before = self.resources.len();
        self.resources
            .retain(|r| !(r.kind == kind && r.name() == Some(name)));
        before - self.resources.len()
    }

    /// Recorded resources with no counterpart in `active`, in record order
    pub fn removed_resources(&self, active: &[Resource]) -> Vec<ManagedResource> {
        self.resources
            .iter()
            .filter(|record| !active.iter().any(|r| record.matches(r)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
