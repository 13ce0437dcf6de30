// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for context.rs

#[cfg(test)]
mod tests {
    use crate::context::stores;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::watcher;
    use std::collections::BTreeMap;

    fn pod(name: &str, namespace: &str, app: &str, node: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_config_map_by_namespace_and_name() {
        let (stores, mut writers) = stores();
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(cm));

        assert!(stores.get_config_map("settings", "team-a").is_some());
        assert!(stores.get_config_map("settings", "team-b").is_none());
        assert!(stores.get_secret("settings", "team-a").is_none());
    }

    #[test]
    fn test_pods_matching_selector_is_namespace_scoped() {
        let (stores, mut writers) = stores();
        for p in [
            pod("web-1", "default", "web", "node-a"),
            pod("web-2", "default", "web", "node-b"),
            pod("db-1", "default", "db", "node-a"),
            pod("web-x", "other", "web", "node-a"),
        ] {
            writers.pods.apply_watcher_event(&watcher::Event::Apply(p));
        }

        let selector = BTreeMap::from([("app".to_string(), "web".to_string())]);
        let mut names: Vec<String> = stores
            .pods_matching("default", &selector)
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["web-1", "web-2"]);

        assert!(stores.pods_matching("default", &BTreeMap::new()).is_empty());
        assert_eq!(stores.pods_on_node("node-a").len(), 3);
    }

    #[test]
    fn test_deployments_in_namespace() {
        let (stores, mut writers) = stores();
        for (name, namespace) in [("web", "default"), ("api", "default"), ("web", "other")] {
            writers
                .deployments
                .apply_watcher_event(&watcher::Event::Apply(Deployment {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }));
        }

        let mut names: Vec<String> = stores
            .deployments_in("default")
            .iter()
            .filter_map(|d| d.metadata.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["api", "web"]);
        assert!(stores.deployments_in("empty").is_empty());
    }
}
