// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::constants::CONFIG_FINALIZER;
    use crate::context::{stores, StoreWriters, Stores};
    use crate::informer::{relay, ClusterEvent, EventBus, EventTracker, ResourceEvent};
    use crate::reconcilers::config::{is_opted_in, ConfigReconciler};
    use crate::workload::{ConfigObject, ConfigRef, WorkloadController};
    use crate::writer::{RecordingWriter, WriteCall};
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{
        ConfigMap, ConfigMapEnvSource, Container, EnvFromSource, PodSpec, PodTemplateSpec, Secret,
        SecretVolumeSource, Volume,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::jiff::Timestamp;
    use k8s_openapi::ByteString;
    use kube::runtime::watcher;
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const NS: &str = "default";

    fn deployment(name: &str, opted_in: bool, hash: Option<&str>) -> Deployment {
        let annotations = opted_in.then(|| {
            BTreeMap::from([(
                "update-on-config-change".to_string(),
                "true".to_string(),
            )])
        });
        let template_annotations =
            hash.map(|h| BTreeMap::from([("config-hash".to_string(), h.to_string())]));

        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NS.to_string()),
                annotations,
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: template_annotations,
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        volumes: Some(vec![Volume {
                            name: "creds".to_string(),
                            secret: Some(SecretVolumeSource {
                                secret_name: Some("y".to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        containers: vec![Container {
                            name: "app".to_string(),
                            env_from: Some(vec![EnvFromSource {
                                config_map_ref: Some(ConfigMapEnvSource {
                                    name: "x".to_string(),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn config_map(value: &str, deleting: bool, finalized: bool) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("x".to_string()),
                namespace: Some(NS.to_string()),
                deletion_timestamp: deleting.then(|| Time(Timestamp::now())),
                finalizers: finalized.then(|| vec![CONFIG_FINALIZER.to_string()]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("a".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn secret() -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("y".to_string()),
                namespace: Some(NS.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "b".to_string(),
                ByteString(b"f".to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn setup() -> (Stores, StoreWriters, Arc<RecordingWriter>, ConfigReconciler) {
        let (stores, writers) = stores();
        let writer = Arc::new(RecordingWriter::default());
        let reconciler = ConfigReconciler::new(stores.clone(), writer.clone());
        (stores, writers, writer, reconciler)
    }

    fn workload(d: Deployment) -> Arc<WorkloadController> {
        Arc::new(WorkloadController::from(Arc::new(d)))
    }

    fn config(cm: ConfigMap) -> Arc<ConfigObject> {
        Arc::new(ConfigObject::from(Arc::new(cm)))
    }

    fn sha256(s: &str) -> String {
        format!("{:x}", Sha256::digest(s.as_bytes()))
    }

    #[test]
    fn test_opt_in_requires_literal_true() {
        assert!(is_opted_in(&workload(deployment("d", true, None))));
        assert!(!is_opted_in(&workload(deployment("d", false, None))));
    }

    #[tokio::test]
    async fn test_data_change_rolls_out_new_hash() {
        let (_stores, mut writers, writer, reconciler) = setup();
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, false)));
        writers
            .secrets
            .apply_watcher_event(&watcher::Event::Apply(secret()));
        writers
            .deployments
            .apply_watcher_event(&watcher::Event::Apply(deployment("d", true, None)));

        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment("d", true, None))))
            .await;

        let h1 = sha256(r#"{"configMaps":{"x":{"a":"1"}},"secrets":{"y":{"b":"Zg=="}}}"#);
        assert_eq!(
            writer.calls(),
            vec![
                WriteCall::AddFinalizer {
                    namespace: NS.to_string(),
                    config: "ConfigMap/x".to_string()
                },
                WriteCall::AddFinalizer {
                    namespace: NS.to_string(),
                    config: "Secret/y".to_string()
                },
                WriteCall::SetConfigHash {
                    namespace: NS.to_string(),
                    workload: "Deployment/d".to_string(),
                    hash: h1.clone()
                },
            ]
        );

        // The hash patch lands and the config data changes.
        writers
            .deployments
            .apply_watcher_event(&watcher::Event::Apply(deployment("d", true, Some(&h1))));
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("2", false, true)));
        writer.clear();

        reconciler
            .on_config(ResourceEvent::Updated {
                old: config(config_map("1", false, true)),
                new: config(config_map("2", false, true)),
            })
            .await;

        let h2 = sha256(r#"{"configMaps":{"x":{"a":"2"}},"secrets":{"y":{"b":"Zg=="}}}"#);
        assert_ne!(h1, h2);
        assert_eq!(writer.hashes(), vec![h2]);
    }

    #[tokio::test]
    async fn test_unchanged_hash_is_not_rewritten() {
        let (_stores, mut writers, writer, reconciler) = setup();
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, true)));
        writers
            .secrets
            .apply_watcher_event(&watcher::Event::Apply(secret()));

        let h1 = sha256(r#"{"configMaps":{"x":{"a":"1"}},"secrets":{"y":{"b":"Zg=="}}}"#);
        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment(
                "d",
                true,
                Some(&h1),
            ))))
            .await;

        assert!(writer.hashes().is_empty());
        // Only the secret was missing the finalizer
        assert_eq!(
            writer.calls(),
            vec![WriteCall::AddFinalizer {
                namespace: NS.to_string(),
                config: "Secret/y".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_workload_not_opted_in_is_ignored() {
        let (_stores, mut writers, writer, reconciler) = setup();
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, false)));

        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment("d", false, None))))
            .await;

        assert!(writer.calls().is_empty());
        assert!(reconciler
            .users_of(NS, &ConfigRef::config_map("x"))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_config_in_use_keeps_finalizer_until_last_user_is_deleted() {
        let (_stores, mut writers, writer, reconciler) = setup();
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, true)));
        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment("d", true, None))))
            .await;
        writer.clear();

        // Deletion requested while the deployment still uses it.
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", true, true)));
        reconciler
            .on_config(ResourceEvent::Updated {
                old: config(config_map("1", false, true)),
                new: config(config_map("1", true, true)),
            })
            .await;
        assert!(writer.calls().is_empty());

        // Last user goes away: the finalizer is stripped.
        reconciler
            .on_workload(ResourceEvent::Deleted(workload(deployment("d", true, None))))
            .await;
        assert_eq!(
            writer.calls(),
            vec![WriteCall::RemoveFinalizer {
                namespace: NS.to_string(),
                config: "ConfigMap/x".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unused_config_pending_deletion_is_released() {
        let (_stores, _writers, writer, reconciler) = setup();

        reconciler
            .on_config(ResourceEvent::Updated {
                old: config(config_map("1", false, true)),
                new: config(config_map("1", true, true)),
            })
            .await;

        assert_eq!(
            writer.calls(),
            vec![WriteCall::RemoveFinalizer {
                namespace: NS.to_string(),
                config: "ConfigMap/x".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_config_created_after_workload_gets_finalizer() {
        let (_stores, mut writers, writer, reconciler) = setup();
        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment("d", true, None))))
            .await;
        writers
            .deployments
            .apply_watcher_event(&watcher::Event::Apply(deployment("d", true, None)));
        writer.clear();

        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, false)));
        reconciler
            .on_config(ResourceEvent::Created(config(config_map("1", false, false))))
            .await;

        let calls = writer.calls();
        assert_eq!(
            calls.first(),
            Some(&WriteCall::AddFinalizer {
                namespace: NS.to_string(),
                config: "ConfigMap/x".to_string()
            })
        );
        assert_eq!(writer.hashes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failures_are_absorbed() {
        let (_stores, mut writers, writer, reconciler) = setup();
        writers
            .config_maps
            .apply_watcher_event(&watcher::Event::Apply(config_map("1", false, false)));
        writer.fail_calls(true);

        reconciler
            .on_workload(ResourceEvent::Created(workload(deployment("d", true, None))))
            .await;

        // Every write was attempted despite the failures, and the index survived.
        assert_eq!(writer.calls().len(), 2);
        assert_eq!(
            reconciler
                .users_of(NS, &ConfigRef::config_map("x"))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_startup_listing_keeps_steady_state_hash() {
        let (_stores, writers, writer, reconciler) = setup();
        let StoreWriters {
            mut deployments,
            mut config_maps,
            mut secrets,
            ..
        } = writers;

        let mut bus = EventBus::gated();
        let consumer = bus.subscribe(Arc::new(reconciler));

        let h1 = sha256(r#"{"configMaps":{"x":{"a":"1"}},"secrets":{"y":{"b":"Zg=="}}}"#);
        let mut finalized_secret = secret();
        finalized_secret.metadata.finalizers = Some(vec![CONFIG_FINALIZER.to_string()]);

        // The workload listing completes before its configs are cached.
        let mut deployment_tracker = EventTracker::default();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(deployment("d", true, Some(&h1))),
            watcher::Event::InitDone,
        ] {
            relay(&mut deployments, &mut deployment_tracker, &bus, ClusterEvent::Deployment, event)
                .await;
        }
        let mut config_map_tracker = EventTracker::default();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(config_map("1", false, true)),
            watcher::Event::InitDone,
        ] {
            relay(&mut config_maps, &mut config_map_tracker, &bus, ClusterEvent::ConfigMap, event)
                .await;
        }
        let mut secret_tracker = EventTracker::default();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(finalized_secret),
            watcher::Event::InitDone,
        ] {
            relay(&mut secrets, &mut secret_tracker, &bus, ClusterEvent::Secret, event).await;
        }

        bus.open().await;
        drop(bus);
        consumer.await.unwrap();

        assert!(writer.hashes().is_empty());
        assert!(writer.calls().is_empty());
    }
}
