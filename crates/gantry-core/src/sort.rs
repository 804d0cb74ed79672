//! Apply and delete ordering
//!
//! Kinds that others depend on carry a lower priority and are applied first,
//! then deleted last. Priorities come from the active catalog, then from the
//! bundled one; anything still unknown sorts as [`Priority::Unspecified`].
//! Both sorts are stable so manifest order is kept within a priority.

use std::cmp::Reverse;

use crate::catalog::{Catalog, Priority};
use crate::defaults::default_catalog;
use crate::resource::Resource;

/// Priority of a resource's kind version
pub fn priority_of(catalog: &Catalog, resource: &Resource) -> Priority {
    catalog
        .priority_of(&resource.kind, &resource.api_version)
        .or_else(|| default_catalog().priority_of(&resource.kind, &resource.api_version))
        .unwrap_or(Priority::Unspecified)
}

/// Order resources for creation: ascending priority
pub fn sort_for_apply(catalog: &Catalog, mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by_cached_key(|r| priority_of(catalog, r).sort_key());
    resources
}

/// Order resources for removal: descending priority
pub fn sort_for_delete(catalog: &Catalog, mut resources: Vec<Resource>) -> Vec<Resource> {
    resources.sort_by_cached_key(|r| Reverse(priority_of(catalog, r).sort_key()));
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BackendKind, KindVersion};
    use serde_json::json;

    fn kind(name: &str, priority: Priority) -> KindVersion {
        KindVersion {
            name: name.to_string(),
            version: 1,
            list_path: format!("/public/v1/{}", name.to_lowercase()),
            parent_path_params: vec![],
            parent_query_params: vec![],
            list_query_options: vec![],
            describe_query_options: vec![],
            priority,
            example: None,
            backend: BackendKind::Console,
        }
    }

    fn resource(kind: &str, name: &str) -> Resource {
        Resource::from_value(
            json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name}}),
            "test",
        )
        .unwrap()
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_kind_version(kind("Alpha", Priority::Explicit(3))).unwrap();
        catalog.add_kind_version(kind("Beta", Priority::Explicit(1))).unwrap();
        catalog.add_kind_version(kind("Gamma", Priority::Explicit(2))).unwrap();
        catalog
    }

    fn kinds(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.kind.as_str()).collect()
    }

    #[test]
    fn test_apply_and_delete_order() {
        let catalog = catalog();
        let input = vec![resource("Alpha", "a"), resource("Beta", "b"), resource("Gamma", "c")];

        let apply = sort_for_apply(&catalog, input.clone());
        assert_eq!(kinds(&apply), vec!["Beta", "Gamma", "Alpha"]);

        let delete = sort_for_delete(&catalog, input);
        assert_eq!(kinds(&delete), vec!["Alpha", "Gamma", "Beta"]);
    }

    #[test]
    fn test_stable_within_priority() {
        let catalog = catalog();
        let input = vec![
            resource("Alpha", "first"),
            resource("Beta", "x"),
            resource("Alpha", "second"),
            resource("Alpha", "third"),
        ];

        let names: Vec<_> = sort_for_apply(&catalog, input.clone())
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["x", "first", "second", "third"]);

        let names: Vec<_> = sort_for_delete(&catalog, input)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third", "x"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let catalog = catalog();
        let input = vec![
            resource("Gamma", "1"),
            resource("Unknown", "2"),
            resource("Alpha", "3"),
            resource("Beta", "4"),
        ];

        let once = sort_for_apply(&catalog, input.clone());
        assert_eq!(sort_for_apply(&catalog, once.clone()), once);

        let once = sort_for_delete(&catalog, input);
        assert_eq!(sort_for_delete(&catalog, once.clone()), once);
    }

    #[test]
    fn test_unknown_kind_sorts_last_on_apply_first_on_delete() {
        let catalog = catalog();
        let input = vec![resource("Mystery", "m"), resource("Alpha", "a")];

        assert_eq!(kinds(&sort_for_apply(&catalog, input.clone())), vec!["Alpha", "Mystery"]);
        assert_eq!(kinds(&sort_for_delete(&catalog, input)), vec!["Mystery", "Alpha"]);
        assert_eq!(
            priority_of(&catalog, &resource("Mystery", "m")),
            Priority::Unspecified
        );
    }

    #[test]
    fn test_falls_back_to_bundled_priorities() {
        let empty = Catalog::new();
        let cluster = Resource::from_value(
            json!({"apiVersion": "v2", "kind": "KafkaCluster", "metadata": {"name": "prod"}}),
            "t",
        )
        .unwrap();
        let topic = Resource::from_value(
            json!({"apiVersion": "v2", "kind": "Topic", "metadata": {"name": "t", "cluster": "prod"}}),
            "t",
        )
        .unwrap();

        let sorted = sort_for_apply(&empty, vec![topic, cluster]);
        assert_eq!(kinds(&sorted), vec!["KafkaCluster", "Topic"]);
    }
}
