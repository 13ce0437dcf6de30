// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `workload.rs`

#[cfg(test)]
mod tests {
    use crate::workload::{
        ConfigData, ConfigKind, ConfigObject, ConfigRef, WorkloadController, WorkloadKind,
    };
    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
    use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::jiff::Timestamp;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn test_workload_key_renders_kind_slash_name() {
        let sts = StatefulSet {
            metadata: ObjectMeta {
                name: Some("db".to_string()),
                namespace: Some("data".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(BTreeMap::from([(
                            "config-hash".to_string(),
                            "abc".to_string(),
                        )])),
                        ..Default::default()
                    }),
                    spec: None,
                },
                ..Default::default()
            }),
            status: None,
        };

        let workload = WorkloadController::from(Arc::new(sts));
        assert_eq!(workload.kind(), WorkloadKind::StatefulSet);
        assert_eq!(workload.namespace(), "data");
        assert_eq!(workload.key().to_string(), "StatefulSet/db");
        assert_eq!(
            workload
                .template_annotations()
                .and_then(|a| a.get("config-hash"))
                .map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_config_ref_ordering_is_kind_then_name() {
        let mut refs = vec![
            ConfigRef::secret("a"),
            ConfigRef::config_map("z"),
            ConfigRef::config_map("b"),
        ];
        refs.sort();
        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["ConfigMap/b", "ConfigMap/z", "Secret/a"]);
    }

    #[test]
    fn test_config_object_accessors() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                namespace: Some("default".to_string()),
                finalizers: Some(vec!["cluster-agent.io/config-in-use".to_string()]),
                deletion_timestamp: Some(Time(Timestamp::now())),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("a".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let config = ConfigObject::from(Arc::new(cm));

        assert_eq!(config.kind(), ConfigKind::ConfigMap);
        assert_eq!(config.config_ref(), ConfigRef::config_map("settings"));
        assert!(config.has_finalizer("cluster-agent.io/config-in-use"));
        assert!(config.is_pending_deletion());
        assert_eq!(
            config.data(),
            ConfigData::Strings(BTreeMap::from([("a".to_string(), "1".to_string())]))
        );
    }

    #[test]
    fn test_secret_without_data_yields_empty_bytes() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("creds".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = ConfigObject::from(Arc::new(secret));
        assert_eq!(config.data(), ConfigData::Bytes(BTreeMap::new()));
        assert!(!config.is_pending_deletion());
        assert!(config.finalizers().is_empty());
    }
}
