// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistent volumes grouped by storage class.
//!
//! Three indices are kept from the event stream:
//!
//! - PV name to its declared capacity, class and pinned node
//! - PV name to the claim bound to it (`namespace/name`)
//! - claim to the names of the pods mounting it
//!
//! Usage is pulled from the [`MountpointCache`] when a view is built. The node
//! agents embed the PV name in the mountpoint path, so a PV is matched to the
//! first mountpoint containing its name.

pub mod cache;

use crate::constants::{HOSTNAME_LABEL, RESOURCE_STORAGE};
use crate::informer::{ClusterEvent, Projection, ResourceEvent, ResourceKind};
use crate::nodeagent::BlockUsage;
use crate::quantity::bytes_of;
use async_trait::async_trait;
use cache::{MountpointCache, UsageSample};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const OPERATOR_IN: &str = "In";

/// A persistent volume with its usage and the pods bound through its claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PvView {
    pub name: String,
    pub storage_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc: Option<String>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub pods: Vec<String>,
}

/// Capacity and usage summed over a set of volumes, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub total: u64,
    pub used: u64,
}

/// One pod reaching a volume through a claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeChain {
    pub pod: String,
    pub pvc: String,
    pub pv: String,
    pub total: u64,
    pub used: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PvInfo {
    capacity: u64,
    storage_class: String,
    node: Option<String>,
}

#[derive(Default)]
struct StorageState {
    volumes: BTreeMap<String, PvInfo>,
    /// PV name to `namespace/name` of its claim
    bound_claims: BTreeMap<String, String>,
    /// `namespace/name` of a claim to pod names
    claim_pods: BTreeMap<String, BTreeSet<String>>,
    /// `namespace/name` of a pod to the claims it mounts
    pod_claims: BTreeMap<String, BTreeSet<String>>,
}

fn claim_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn claim_namespace(key: &str) -> &str {
    key.split_once('/').map_or("", |(ns, _)| ns)
}

fn claim_name(key: &str) -> &str {
    key.split_once('/').map_or(key, |(_, name)| name)
}

/// Node a local volume is pinned to through a single-valued hostname `In` term.
#[must_use]
pub fn pinned_node(pv: &PersistentVolume) -> Option<String> {
    let terms = &pv
        .spec
        .as_ref()?
        .node_affinity
        .as_ref()?
        .required
        .as_ref()?
        .node_selector_terms;
    terms
        .iter()
        .flat_map(|t| t.match_expressions.iter().flatten())
        .find(|e| e.key == HOSTNAME_LABEL && e.operator == OPERATOR_IN)
        .and_then(|e| match e.values.as_deref() {
            Some([host]) => Some(host.clone()),
            _ => None,
        })
}

/// Claims mounted by a pod, as `namespace/name` keys.
#[must_use]
pub fn pod_claims(pod: &Pod) -> BTreeSet<String> {
    let namespace = pod.namespace().unwrap_or_default();
    pod.spec
        .iter()
        .flat_map(|s| s.volumes.iter().flatten())
        .filter_map(|v| v.persistent_volume_claim.as_ref())
        .filter(|c| !c.claim_name.is_empty())
        .map(|c| claim_key(&namespace, &c.claim_name))
        .collect()
}

/// Usage of the first mountpoint, in path order, whose path contains `pv`.
fn matched_usage(sample: &UsageSample, pv: &str) -> Option<BlockUsage> {
    sample
        .iter()
        .filter(|(mountpoint, _)| mountpoint.contains(pv))
        .min_by(|a, b| a.0.cmp(b.0))
        .map(|(_, usage)| *usage)
}

pub struct StorageProjection {
    state: RwLock<StorageState>,
    mountpoints: Arc<MountpointCache>,
}

impl StorageProjection {
    #[must_use]
    pub fn new(mountpoints: Arc<MountpointCache>) -> Self {
        Self {
            state: RwLock::new(StorageState::default()),
            mountpoints,
        }
    }

    /// A newly created volume drops the cached mountpoint sample, which
    /// cannot contain its mount yet.
    pub async fn on_pv(&self, event: ResourceEvent<PersistentVolume>) {
        let created = matches!(event, ResourceEvent::Created(_));
        self.record_pv(event).await;
        if created {
            self.mountpoints.invalidate().await;
        }
    }

    async fn record_pv(&self, event: ResourceEvent<PersistentVolume>) {
        let mut state = self.state.write().await;
        match event {
            ResourceEvent::Created(pv) | ResourceEvent::Updated { new: pv, .. } => {
                let name = pv.name_any();
                let spec = pv.spec.as_ref();
                state.volumes.insert(
                    name.clone(),
                    PvInfo {
                        capacity: bytes_of(
                            spec.and_then(|s| s.capacity.as_ref()),
                            RESOURCE_STORAGE,
                        ),
                        storage_class: spec
                            .and_then(|s| s.storage_class_name.clone())
                            .unwrap_or_default(),
                        node: pinned_node(&pv),
                    },
                );

                let claim = spec.and_then(|s| s.claim_ref.as_ref()).and_then(|r| {
                    Some(claim_key(r.namespace.as_deref()?, r.name.as_deref()?))
                });
                match claim {
                    Some(claim) => {
                        state.bound_claims.insert(name, claim);
                    }
                    None => {
                        state.bound_claims.remove(&name);
                    }
                }
            }
            ResourceEvent::Deleted(pv) => {
                let name = pv.name_any();
                debug!(pv = %name, "Removing persistent volume");
                state.volumes.remove(&name);
                state.bound_claims.remove(&name);
            }
        }
    }

    pub async fn on_pvc(&self, event: ResourceEvent<PersistentVolumeClaim>) {
        let mut state = self.state.write().await;
        let pvc = event.object();
        let key = claim_key(&pvc.namespace().unwrap_or_default(), &pvc.name_any());

        match &event {
            ResourceEvent::Created(pvc) | ResourceEvent::Updated { new: pvc, .. } => {
                let volume = pvc
                    .spec
                    .as_ref()
                    .and_then(|s| s.volume_name.clone())
                    .filter(|v| !v.is_empty());
                state
                    .bound_claims
                    .retain(|pv, claim| *claim != key || volume.as_ref() == Some(pv));
                if let Some(volume) = volume {
                    state.bound_claims.insert(volume, key);
                }
            }
            ResourceEvent::Deleted(_) => {
                state.bound_claims.retain(|_, claim| *claim != key);
            }
        }
    }

    pub async fn on_pod(&self, event: ResourceEvent<Pod>) {
        let mut state = self.state.write().await;
        let pod = event.object();
        let name = pod.name_any();
        let pod_key = claim_key(&pod.namespace().unwrap_or_default(), &name);

        let claims = match &event {
            ResourceEvent::Deleted(_) => BTreeSet::new(),
            _ => pod_claims(&pod),
        };

        let previous = state.pod_claims.remove(&pod_key).unwrap_or_default();
        for claim in previous.difference(&claims) {
            if let Some(pods) = state.claim_pods.get_mut(claim) {
                pods.remove(&name);
                if pods.is_empty() {
                    state.claim_pods.remove(claim);
                }
            }
        }
        for claim in &claims {
            state
                .claim_pods
                .entry(claim.clone())
                .or_default()
                .insert(name.clone());
        }
        if !claims.is_empty() {
            state.pod_claims.insert(pod_key, claims);
        }
    }

    /// Every PV with its usage, grouped by storage class and sorted by name.
    pub async fn classify(&self) -> BTreeMap<String, Vec<PvView>> {
        let sample = self.mountpoints.get().await;
        let state = self.state.read().await;

        let mut classes: BTreeMap<String, Vec<PvView>> = BTreeMap::new();
        for (name, info) in &state.volumes {
            let (used, free) = match matched_usage(&sample, name) {
                Some(usage) => (usage.used, usage.total.saturating_sub(usage.used)),
                None => (0, info.capacity),
            };
            let pvc = state.bound_claims.get(name);
            let pods = pvc
                .and_then(|claim| state.claim_pods.get(claim))
                .map(|pods| pods.iter().cloned().collect())
                .unwrap_or_default();

            classes
                .entry(info.storage_class.clone())
                .or_default()
                .push(PvView {
                    name: name.clone(),
                    storage_class: info.storage_class.clone(),
                    node: info.node.clone(),
                    pvc: pvc.cloned(),
                    total: info.capacity,
                    used,
                    free,
                    pods,
                });
        }
        classes
    }

    /// Declared capacity and used bytes per storage class.
    pub async fn class_totals(&self) -> BTreeMap<String, StorageUsage> {
        let sample = self.mountpoints.get().await;
        let state = self.state.read().await;

        let mut totals: BTreeMap<String, StorageUsage> = BTreeMap::new();
        for (name, info) in &state.volumes {
            let entry = totals.entry(info.storage_class.clone()).or_default();
            entry.total += info.capacity;
            entry.used += matched_usage(&sample, name).map_or(0, |u| u.used);
        }
        totals
    }

    /// Used bytes over the claims of `namespace` that are bound to a PV.
    pub async fn namespace_storage_used(&self, namespace: &str) -> u64 {
        let sample = self.mountpoints.get().await;
        let state = self.state.read().await;

        state
            .bound_claims
            .iter()
            .filter(|(_, claim)| claim_namespace(claim) == namespace)
            .map(|(pv, _)| matched_usage(&sample, pv).map_or(0, |u| u.used))
            .sum()
    }

    /// Every pod of `namespace` that mounts a bound claim, with the volume's usage.
    pub async fn pod_volume_chains(&self, namespace: &str) -> Vec<VolumeChain> {
        let sample = self.mountpoints.get().await;
        let state = self.state.read().await;

        let mut chains = Vec::new();
        for (pv, claim) in &state.bound_claims {
            if claim_namespace(claim) != namespace {
                continue;
            }
            let Some(pods) = state.claim_pods.get(claim) else {
                continue;
            };
            let capacity = state.volumes.get(pv).map_or(0, |i| i.capacity);
            let (total, used) = match matched_usage(&sample, pv) {
                Some(usage) => (usage.total, usage.used),
                None => (capacity, 0),
            };
            for pod in pods {
                chains.push(VolumeChain {
                    pod: pod.clone(),
                    pvc: claim_name(claim).to_string(),
                    pv: pv.clone(),
                    total,
                    used,
                });
            }
        }
        chains
    }
}

#[async_trait]
impl Projection for StorageProjection {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn interested_in(&self, kind: ResourceKind) -> bool {
        matches!(
            kind,
            ResourceKind::PersistentVolume | ResourceKind::PersistentVolumeClaim | ResourceKind::Pod
        )
    }

    async fn handle(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::PersistentVolume(e) => self.on_pv(e).await,
            ClusterEvent::PersistentVolumeClaim(e) => self.on_pvc(e).await,
            ClusterEvent::Pod(e) => self.on_pod(e).await,
            _ => {}
        }
    }
}
