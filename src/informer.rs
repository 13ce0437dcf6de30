// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed create/update/delete delivery on top of kube-rs watchers.
//!
//! The kube-rs watcher reports `Apply` and `Delete` events plus an initial
//! listing bracketed by `Init`/`InitDone`. The projections need to know
//! whether an object is new and what it looked like before an update (for
//! example to notice a deletion timestamp being set), so [`EventTracker`]
//! remembers the last-seen version of every object and turns watcher events
//! into [`ResourceEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! watcher(Api<K>) ──► Writer<K> ──► EventTracker<K> ──► EventBus
//!                                                          │
//!                     ┌───────────────────┬────────────────┤
//!                     ▼                   ▼                ▼
//!              ConfigReconciler    ServiceTopology  ...  ThresholdMonitor
//! ```
//!
//! Every projection owns one consumer task fed by a bounded channel, so events
//! reach a projection in the order the watcher produced them.
//!
//! At startup the bus is gated: events are held until every store has
//! finished its initial list, so projections never assemble views from a
//! partially synced cache.

use crate::constants::PROJECTION_QUEUE_CAPACITY;
use crate::metrics;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
    Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A typed create, update or delete delivery.
#[derive(Debug)]
pub enum ResourceEvent<K> {
    /// First observation of the object
    Created(Arc<K>),
    /// The object changed; `old` is the previously observed version
    Updated { old: Arc<K>, new: Arc<K> },
    /// The object is gone; carries its last observed version
    Deleted(Arc<K>),
}

impl<K> Clone for ResourceEvent<K> {
    fn clone(&self) -> Self {
        match self {
            ResourceEvent::Created(obj) => ResourceEvent::Created(Arc::clone(obj)),
            ResourceEvent::Updated { old, new } => ResourceEvent::Updated {
                old: Arc::clone(old),
                new: Arc::clone(new),
            },
            ResourceEvent::Deleted(obj) => ResourceEvent::Deleted(Arc::clone(obj)),
        }
    }
}

impl<K> ResourceEvent<K> {
    /// The current object: the new version for creates/updates, the last one for deletes.
    #[must_use]
    pub fn object(&self) -> &Arc<K> {
        match self {
            ResourceEvent::Created(obj) | ResourceEvent::Deleted(obj) => obj,
            ResourceEvent::Updated { new, .. } => new,
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            ResourceEvent::Created(_) => "created",
            ResourceEvent::Updated { .. } => "updated",
            ResourceEvent::Deleted(_) => "deleted",
        }
    }

    /// Convert the payload type, e.g. into a [`crate::workload::WorkloadController`].
    pub fn map<T>(self, f: impl Fn(Arc<K>) -> T) -> ResourceEvent<T> {
        match self {
            ResourceEvent::Created(obj) => ResourceEvent::Created(Arc::new(f(obj))),
            ResourceEvent::Updated { old, new } => ResourceEvent::Updated {
                old: Arc::new(f(old)),
                new: Arc::new(f(new)),
            },
            ResourceEvent::Deleted(obj) => ResourceEvent::Deleted(Arc::new(f(obj))),
        }
    }
}

/// Remembers the last-seen version of every object of one kind.
pub struct EventTracker<K> {
    known: HashMap<String, Arc<K>>,
    relist: Option<Relist<K>>,
}

/// Progress of an `Init` … `InitDone` listing.
struct Relist<K> {
    seen: HashSet<String>,
    held: Vec<ResourceEvent<K>>,
}

impl<K> Default for EventTracker<K> {
    fn default() -> Self {
        Self {
            known: HashMap::new(),
            relist: None,
        }
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

impl<K: Resource> EventTracker<K> {
    /// Translate one watcher event into zero or more typed deliveries.
    ///
    /// A listing (`Init` … `InitDone`) re-applies every live object. The
    /// reflector store only exposes listed objects at `InitDone`, so deliveries
    /// for listed objects are held until then; objects known before the listing
    /// that were not re-applied are reported deleted after them. Re-applies
    /// with an unchanged `resourceVersion` are suppressed.
    pub fn observe(&mut self, event: watcher::Event<K>) -> Vec<ResourceEvent<K>> {
        match event {
            watcher::Event::Init => {
                self.relist = Some(Relist {
                    seen: HashSet::new(),
                    held: Vec::new(),
                });
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let key = object_key(&obj);
                let delivery = self.apply(obj);
                match self.relist.as_mut() {
                    Some(relist) => {
                        relist.seen.insert(key);
                        relist.held.extend(delivery);
                        Vec::new()
                    }
                    None => delivery.into_iter().collect(),
                }
            }
            watcher::Event::InitDone => {
                let Some(Relist { seen, mut held }) = self.relist.take() else {
                    return Vec::new();
                };
                let stale: Vec<String> = self
                    .known
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                held.extend(
                    stale
                        .into_iter()
                        .filter_map(|key| self.known.remove(&key))
                        .map(ResourceEvent::Deleted),
                );
                held
            }
            watcher::Event::Apply(obj) => self.apply(obj).into_iter().collect(),
            watcher::Event::Delete(obj) => {
                let key = object_key(&obj);
                let last = self.known.remove(&key).unwrap_or_else(|| Arc::new(obj));
                vec![ResourceEvent::Deleted(last)]
            }
        }
    }

    fn apply(&mut self, obj: K) -> Option<ResourceEvent<K>> {
        let key = object_key(&obj);
        let new = Arc::new(obj);
        match self.known.insert(key, Arc::clone(&new)) {
            None => Some(ResourceEvent::Created(new)),
            Some(old) => {
                let unchanged = old.meta().resource_version.is_some()
                    && old.meta().resource_version == new.meta().resource_version;
                if unchanged {
                    None
                } else {
                    Some(ResourceEvent::Updated { old, new })
                }
            }
        }
    }
}

/// Kinds delivered by the event source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Namespace,
    Node,
    Pod,
    Service,
    Endpoints,
    Ingress,
    ConfigMap,
    Secret,
    Deployment,
    DaemonSet,
    StatefulSet,
    PersistentVolume,
    PersistentVolumeClaim,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Node => "Node",
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Endpoints => "Endpoints",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        }
    }
}

/// A typed delivery for any watched kind.
#[derive(Clone, Debug)]
pub enum ClusterEvent {
    Namespace(ResourceEvent<Namespace>),
    Node(ResourceEvent<Node>),
    Pod(ResourceEvent<Pod>),
    Service(ResourceEvent<Service>),
    Endpoints(ResourceEvent<Endpoints>),
    Ingress(ResourceEvent<Ingress>),
    ConfigMap(ResourceEvent<ConfigMap>),
    Secret(ResourceEvent<Secret>),
    Deployment(ResourceEvent<Deployment>),
    DaemonSet(ResourceEvent<DaemonSet>),
    StatefulSet(ResourceEvent<StatefulSet>),
    PersistentVolume(ResourceEvent<PersistentVolume>),
    PersistentVolumeClaim(ResourceEvent<PersistentVolumeClaim>),
}

impl ClusterEvent {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterEvent::Namespace(_) => ResourceKind::Namespace,
            ClusterEvent::Node(_) => ResourceKind::Node,
            ClusterEvent::Pod(_) => ResourceKind::Pod,
            ClusterEvent::Service(_) => ResourceKind::Service,
            ClusterEvent::Endpoints(_) => ResourceKind::Endpoints,
            ClusterEvent::Ingress(_) => ResourceKind::Ingress,
            ClusterEvent::ConfigMap(_) => ResourceKind::ConfigMap,
            ClusterEvent::Secret(_) => ResourceKind::Secret,
            ClusterEvent::Deployment(_) => ResourceKind::Deployment,
            ClusterEvent::DaemonSet(_) => ResourceKind::DaemonSet,
            ClusterEvent::StatefulSet(_) => ResourceKind::StatefulSet,
            ClusterEvent::PersistentVolume(_) => ResourceKind::PersistentVolume,
            ClusterEvent::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
        }
    }
}

/// A consumer of cluster events that maintains derived state.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether events of `kind` should be routed to this projection.
    fn interested_in(&self, kind: ResourceKind) -> bool;

    /// Apply one event. Failures are logged inside; the projection keeps running.
    async fn handle(&self, event: ClusterEvent);
}

struct Route {
    projection: Arc<dyn Projection>,
    sender: mpsc::Sender<ClusterEvent>,
}

/// Routes events to the consumer task of every interested projection.
///
/// A bus built with [`EventBus::gated`] holds every published event until
/// [`EventBus::open`] is called, then delivers the held events in publish
/// order before any later one.
#[derive(Default)]
pub struct EventBus {
    routes: Vec<Route>,
    held: Mutex<Option<Vec<ClusterEvent>>>,
}

impl EventBus {
    /// A bus that delivers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that holds events until [`EventBus::open`].
    #[must_use]
    pub fn gated() -> Self {
        Self {
            routes: Vec::new(),
            held: Mutex::new(Some(Vec::new())),
        }
    }

    /// Register a projection and spawn its consumer task.
    pub fn subscribe(&mut self, projection: Arc<dyn Projection>) -> JoinHandle<()> {
        let (sender, receiver) = mpsc::channel(PROJECTION_QUEUE_CAPACITY);
        self.routes.push(Route {
            projection: Arc::clone(&projection),
            sender,
        });
        tokio::spawn(run_projection(projection, receiver))
    }

    /// Deliver an event to every interested projection, waiting for queue space.
    ///
    /// While the bus is gated the event is queued instead.
    pub async fn publish(&self, event: ClusterEvent) {
        {
            let mut held = self.held.lock().await;
            if let Some(queue) = held.as_mut() {
                queue.push(event);
                return;
            }
        }
        self.deliver(event).await;
    }

    /// Release held events and deliver directly from now on. Idempotent.
    pub async fn open(&self) {
        let mut held = self.held.lock().await;
        let Some(queue) = held.take() else {
            return;
        };
        info!(events = queue.len(), "Releasing events held during the initial sync");
        for event in queue {
            self.deliver(event).await;
        }
    }

    async fn deliver(&self, event: ClusterEvent) {
        let kind = event.kind();
        for route in self
            .routes
            .iter()
            .filter(|r| r.projection.interested_in(kind))
        {
            if route.sender.send(event.clone()).await.is_err() {
                warn!(
                    projection = route.projection.name(),
                    kind = kind.as_str(),
                    "Projection consumer has stopped, dropping event"
                );
            }
        }
    }
}

/// Consume events for one projection until the bus is dropped.
pub async fn run_projection(
    projection: Arc<dyn Projection>,
    mut receiver: mpsc::Receiver<ClusterEvent>,
) {
    info!(projection = projection.name(), "Starting projection consumer");
    while let Some(event) = receiver.recv().await {
        metrics::record_event_handled(projection.name(), event.kind().as_str());
        projection.handle(event).await;
    }
    info!(projection = projection.name(), "Projection consumer stopped");
}

/// Apply one watcher event to the store, then publish what it means.
///
/// The store is written first so a projection handling the event can already
/// read the object from the cache.
pub async fn relay<K>(
    writer: &mut Writer<K>,
    tracker: &mut EventTracker<K>,
    bus: &EventBus,
    wrap: fn(ResourceEvent<K>) -> ClusterEvent,
    event: watcher::Event<K>,
) where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    writer.apply_watcher_event(&event);
    for delivery in tracker.observe(event) {
        debug!(
            kind = %K::kind(&()),
            action = delivery.action(),
            "Publishing event"
        );
        bus.publish(wrap(delivery)).await;
    }
}

/// Watch one kind, keep its reflector store current and publish typed events.
///
/// Watch errors are logged and retried with the watcher's default backoff;
/// this only returns if the underlying stream ends.
///
/// # Errors
///
/// Currently never fails; the `Result` mirrors the other long-running tasks
/// so they can share one `select!` in `main`.
pub async fn watch_and_publish<K>(
    api: Api<K>,
    mut writer: Writer<K>,
    bus: Arc<EventBus>,
    wrap: fn(ResourceEvent<K>) -> ClusterEvent,
) -> anyhow::Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let kind = K::kind(&()).to_string();
    info!(kind = %kind, "Starting watch");

    let mut tracker = EventTracker::<K>::default();
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    let mut stream = std::pin::pin!(stream);

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => relay(&mut writer, &mut tracker, &bus, wrap, event).await,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Watch error, retrying with backoff");
            }
        }
    }

    warn!(kind = %kind, "Watch stream ended");
    Ok(())
}

/// Keep a reflector store current without publishing events.
///
/// Used for kinds the projections only read from the cache
/// (`ReplicaSet` owner chains, `ResourceQuota` hard limits).
///
/// # Errors
///
/// Currently never fails; see [`watch_and_publish`].
pub async fn reflect_only<K>(api: Api<K>, writer: Writer<K>) -> anyhow::Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let kind = K::kind(&()).to_string();
    info!(kind = %kind, "Starting cache-only watch");

    let stream = reflector::reflector(
        writer,
        watcher(api, watcher::Config::default()).default_backoff(),
    );
    let mut stream = std::pin::pin!(stream);

    while let Some(item) = stream.next().await {
        if let Err(e) = item {
            warn!(kind = %kind, error = %e, "Watch error, retrying with backoff");
        }
    }

    warn!(kind = %kind, "Watch stream ended");
    Ok(())
}

#[cfg(test)]
#[path = "informer_tests.rs"]
mod informer_tests;
