// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `informer.rs`

#[cfg(test)]
mod tests {
    use crate::informer::{
        relay, ClusterEvent, EventBus, EventTracker, Projection, ResourceEvent, ResourceKind,
    };
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{ConfigMap, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector::{store::Writer, ObjectRef, Store};
    use kube::runtime::watcher;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn config_map(name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_first_apply_is_created_then_updated() {
        let mut tracker = EventTracker::default();

        let created = tracker.observe(watcher::Event::Apply(config_map("a", "1")));
        assert!(matches!(created.as_slice(), [ResourceEvent::Created(_)]));

        let updated = tracker.observe(watcher::Event::Apply(config_map("a", "2")));
        match updated.as_slice() {
            [ResourceEvent::Updated { old, new }] => {
                assert_eq!(old.metadata.resource_version.as_deref(), Some("1"));
                assert_eq!(new.metadata.resource_version.as_deref(), Some("2"));
            }
            other => panic!("expected one update, got {other:?}"),
        }
    }

    #[test]
    fn test_reapply_with_same_resource_version_is_suppressed() {
        let mut tracker = EventTracker::default();
        tracker.observe(watcher::Event::Apply(config_map("a", "7")));
        assert!(tracker
            .observe(watcher::Event::Apply(config_map("a", "7")))
            .is_empty());
    }

    #[test]
    fn test_delete_reports_last_seen_version() {
        let mut tracker = EventTracker::default();
        tracker.observe(watcher::Event::Apply(config_map("a", "3")));

        let deleted = tracker.observe(watcher::Event::Delete(config_map("a", "4")));
        match deleted.as_slice() {
            [ResourceEvent::Deleted(last)] => {
                assert_eq!(last.metadata.resource_version.as_deref(), Some("3"));
            }
            other => panic!("expected one delete, got {other:?}"),
        }
        let again = tracker.observe(watcher::Event::Apply(config_map("a", "5")));
        assert!(matches!(again.as_slice(), [ResourceEvent::Created(_)]));
    }

    #[test]
    fn test_relist_deletes_objects_not_reapplied() {
        let mut tracker = EventTracker::default();
        tracker.observe(watcher::Event::Apply(config_map("kept", "1")));
        tracker.observe(watcher::Event::Apply(config_map("gone", "1")));

        assert!(tracker.observe(watcher::Event::Init).is_empty());
        assert!(tracker
            .observe(watcher::Event::InitApply(config_map("kept", "1")))
            .is_empty());
        assert!(tracker
            .observe(watcher::Event::InitApply(config_map("new", "1")))
            .is_empty());

        let done = tracker.observe(watcher::Event::InitDone);
        match done.as_slice() {
            [ResourceEvent::Created(fresh), ResourceEvent::Deleted(stale)] => {
                assert_eq!(fresh.metadata.name.as_deref(), Some("new"));
                assert_eq!(stale.metadata.name.as_deref(), Some("gone"));
            }
            other => panic!("expected a create then a stale delete, got {other:?}"),
        }

        // "kept" is still tracked, so a later delete carries its version
        let deleted = tracker.observe(watcher::Event::Delete(config_map("kept", "9")));
        match deleted.as_slice() {
            [ResourceEvent::Deleted(last)] => {
                assert_eq!(last.metadata.resource_version.as_deref(), Some("1"));
            }
            other => panic!("expected one delete, got {other:?}"),
        }
    }

    #[test]
    fn test_initial_listing_is_held_until_init_done() {
        let mut tracker = EventTracker::default();

        assert!(tracker.observe(watcher::Event::Init).is_empty());
        for name in ["a", "b", "c"] {
            assert!(tracker
                .observe(watcher::Event::InitApply(config_map(name, "1")))
                .is_empty());
        }

        let done = tracker.observe(watcher::Event::InitDone);
        let names: Vec<_> = done
            .iter()
            .map(|e| {
                assert!(matches!(e, ResourceEvent::Created(_)));
                e.object().metadata.name.clone().unwrap_or_default()
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let live = tracker.observe(watcher::Event::Apply(config_map("d", "1")));
        assert!(matches!(live.as_slice(), [ResourceEvent::Created(_)]));
    }

    #[test]
    fn test_init_done_without_init_is_empty() {
        let mut tracker: EventTracker<ConfigMap> = EventTracker::default();
        assert!(tracker.observe(watcher::Event::InitDone).is_empty());
    }

    struct Recorder {
        kinds: Vec<ResourceKind>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Projection for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn interested_in(&self, kind: ResourceKind) -> bool {
            self.kinds.contains(&kind)
        }

        async fn handle(&self, event: ClusterEvent) {
            let label = match &event {
                ClusterEvent::ConfigMap(e) => {
                    format!("cm:{}", e.object().metadata.name.clone().unwrap_or_default())
                }
                ClusterEvent::Pod(e) => {
                    format!("pod:{}", e.object().metadata.name.clone().unwrap_or_default())
                }
                other => other.kind().as_str().to_string(),
            };
            self.seen.lock().await.push(label);
        }
    }

    #[tokio::test]
    async fn test_bus_routes_only_to_interested_projections_in_order() {
        let configs = Arc::new(Mutex::new(Vec::new()));
        let pods = Arc::new(Mutex::new(Vec::new()));

        let mut bus = EventBus::new();
        let h1 = bus.subscribe(Arc::new(Recorder {
            kinds: vec![ResourceKind::ConfigMap],
            seen: Arc::clone(&configs),
        }));
        let h2 = bus.subscribe(Arc::new(Recorder {
            kinds: vec![ResourceKind::Pod],
            seen: Arc::clone(&pods),
        }));

        for name in ["one", "two", "three"] {
            bus.publish(ClusterEvent::ConfigMap(ResourceEvent::Created(Arc::new(
                config_map(name, "1"),
            ))))
            .await;
        }
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        bus.publish(ClusterEvent::Pod(ResourceEvent::Created(Arc::new(pod))))
            .await;

        drop(bus);
        h1.await.unwrap();
        h2.await.unwrap();

        assert_eq!(*configs.lock().await, vec!["cm:one", "cm:two", "cm:three"]);
        assert_eq!(*pods.lock().await, vec!["pod:web-0"]);
    }

    #[tokio::test]
    async fn test_gated_bus_holds_events_until_opened() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut bus = EventBus::gated();
        let handle = bus.subscribe(Arc::new(Recorder {
            kinds: vec![ResourceKind::ConfigMap],
            seen: Arc::clone(&seen),
        }));

        for name in ["one", "two"] {
            bus.publish(ClusterEvent::ConfigMap(ResourceEvent::Created(Arc::new(
                config_map(name, "1"),
            ))))
            .await;
        }
        tokio::task::yield_now().await;
        assert!(seen.lock().await.is_empty());

        bus.open().await;
        // Opening twice does not replay the queue
        bus.open().await;
        bus.publish(ClusterEvent::ConfigMap(ResourceEvent::Created(Arc::new(
            config_map("three", "1"),
        ))))
        .await;

        drop(bus);
        handle.await.unwrap();

        assert_eq!(*seen.lock().await, vec!["cm:one", "cm:two", "cm:three"]);
    }

    struct CacheCheck {
        store: Store<ConfigMap>,
        cached: Arc<Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl Projection for CacheCheck {
        fn name(&self) -> &'static str {
            "cache-check"
        }

        fn interested_in(&self, kind: ResourceKind) -> bool {
            kind == ResourceKind::ConfigMap
        }

        async fn handle(&self, event: ClusterEvent) {
            if let ClusterEvent::ConfigMap(e) = event {
                let name = e.object().metadata.name.clone().unwrap_or_default();
                let key = ObjectRef::new(&name).within("default");
                self.cached.lock().await.push(self.store.get(&key).is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_relay_writes_store_before_publishing() {
        let mut writer: Writer<ConfigMap> = Writer::default();
        let cached = Arc::new(Mutex::new(Vec::new()));

        let mut bus = EventBus::new();
        let handle = bus.subscribe(Arc::new(CacheCheck {
            store: writer.as_reader(),
            cached: Arc::clone(&cached),
        }));

        let mut tracker = EventTracker::default();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(config_map("listed", "1")),
            watcher::Event::InitDone,
            watcher::Event::Apply(config_map("added", "1")),
        ] {
            relay(&mut writer, &mut tracker, &bus, ClusterEvent::ConfigMap, event).await;
        }

        drop(bus);
        handle.await.unwrap();

        assert_eq!(*cached.lock().await, vec![true, true]);
    }
}
