// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service topology: inner and outer services per namespace.
//!
//! Services, their pods and the ingresses targeting them are joined into two
//! views:
//!
//! - **inner services** - services no ingress targets, with their pods
//!   grouped by owning workload;
//! - **outer services** - one entry per ingress rule, mapping each path to the
//!   inner view of the service it routes to.
//!
//! Ingresses come from `networking.k8s.io/v1` objects (layer 7, protocol
//! `http`) and from the `tcp-services` / `udp-services` ConfigMaps in the
//! reserved namespace (layer 4). Services and ingresses refer to each other
//! by name only.

pub mod owner;
pub mod transport;
pub mod types;

use crate::constants::{POD_STATE_TERMINATING, POD_STATE_UNKNOWN, RESERVED_NAMESPACE};
use crate::context::Stores;
use crate::informer::{ClusterEvent, Projection, ResourceEvent, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use owner::{resolve_owner, WorkloadRef};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use transport::{entries_to_ingresses, parse_entries, protocol_for_config_map, TransportEntry};
use types::{
    IngressPath, IngressRecord, IngressRule, OuterServiceView, PodView, Protocol, ServiceView,
    WorkloadView,
};

const HTTP_PORT: u16 = 80;
const DEFAULT_HTTP_PATH: &str = "/";

/// Lifecycle state shown for a pod: `Terminating` once deletion started,
/// otherwise its phase.
#[must_use]
pub fn pod_state(pod: &Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return POD_STATE_TERMINATING.to_string();
    }
    pod.status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| POD_STATE_UNKNOWN.to_string())
}

/// Names of the pods an `Endpoints` object points at, ready or not.
#[must_use]
pub fn endpoint_pod_names(endpoints: &Endpoints) -> BTreeSet<String> {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| {
            subset
                .addresses
                .iter()
                .flatten()
                .chain(subset.not_ready_addresses.iter().flatten())
        })
        .filter_map(|address| address.target_ref.as_ref())
        .filter(|target| target.kind.as_deref() == Some("Pod"))
        .filter_map(|target| target.name.clone())
        .collect()
}

/// Layer-7 rules of an `Ingress` object.
#[must_use]
pub fn http_rules(ingress: &Ingress) -> Vec<IngressRule> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };
    spec.rules
        .iter()
        .flatten()
        .map(|rule| {
            let paths = rule
                .http
                .iter()
                .flat_map(|http| http.paths.iter())
                .filter_map(|path| {
                    let service = path.backend.service.as_ref()?;
                    let port = service.port.as_ref().and_then(|p| {
                        p.number
                            .map(|n| n.to_string())
                            .or_else(|| p.name.clone())
                    });
                    Some(IngressPath {
                        path: path
                            .path
                            .clone()
                            .unwrap_or_else(|| DEFAULT_HTTP_PATH.to_string()),
                        service_name: service.name.clone(),
                        service_port: port.unwrap_or_default(),
                    })
                })
                .collect();
            IngressRule {
                host: rule.host.clone().unwrap_or_default(),
                port: HTTP_PORT,
                protocol: Protocol::Http,
                paths,
            }
        })
        .collect()
}

#[derive(Clone, Debug)]
struct ServiceEntry {
    view: ServiceView,
    ingresses: BTreeSet<String>,
}

impl ServiceEntry {
    fn pod_names(&self) -> BTreeSet<&str> {
        self.view
            .workloads
            .iter()
            .flat_map(|w| w.pods.iter())
            .map(|p| p.name.as_str())
            .collect()
    }
}

#[derive(Default)]
struct NamespaceTopology {
    services: BTreeMap<String, ServiceEntry>,
    ingresses: BTreeMap<String, IngressRecord>,
}

impl NamespaceTopology {
    fn ingresses_targeting(&self, service: &str) -> BTreeSet<String> {
        self.ingresses
            .values()
            .filter(|i| i.targets(service))
            .map(|i| i.name.clone())
            .collect()
    }

    fn refresh_ingress_sets(&mut self) {
        let sets: Vec<(String, BTreeSet<String>)> = self
            .services
            .keys()
            .map(|name| (name.clone(), self.ingresses_targeting(name)))
            .collect();
        for (name, set) in sets {
            if let Some(entry) = self.services.get_mut(&name) {
                entry.ingresses = set;
            }
        }
    }

    /// Replace the rules of `protocol` in ingress `name` with `rules`,
    /// dropping the ingress once it has no rules left.
    fn replace_rules(&mut self, name: &str, protocol: Protocol, rules: Vec<IngressRule>) {
        let record = self
            .ingresses
            .entry(name.to_string())
            .or_insert_with(|| IngressRecord {
                name: name.to_string(),
                rules: Vec::new(),
            });
        record.rules.retain(|r| r.protocol != protocol);
        record.rules.extend(rules);
        if record.rules.is_empty() {
            self.ingresses.remove(name);
        }
    }

    fn warn_dangling(&self, namespace: &str, record: &IngressRecord) {
        for path in record.rules.iter().flat_map(|r| r.paths.iter()) {
            if !self.services.contains_key(&path.service_name) {
                warn!(
                    "Ingress {}/{} targets unknown service {}",
                    namespace, record.name, path.service_name
                );
            }
        }
    }
}

#[derive(Default)]
struct TopologyState {
    namespaces: HashMap<String, NamespaceTopology>,
}

impl TopologyState {
    fn namespace_mut(&mut self, namespace: &str) -> &mut NamespaceTopology {
        self.namespaces.entry(namespace.to_string()).or_default()
    }
}

pub struct ServiceTopology {
    stores: Stores,
    state: RwLock<TopologyState>,
}

impl ServiceTopology {
    #[must_use]
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            state: RwLock::new(TopologyState::default()),
        }
    }

    /// Build a service's view from the cached pods it selects.
    fn assemble(&self, service: &Service) -> ServiceView {
        let namespace = service.namespace().unwrap_or_default();
        let selector = service
            .spec
            .as_ref()
            .and_then(|s| s.selector.clone())
            .unwrap_or_default();

        let mut workloads: BTreeMap<WorkloadRef, Vec<PodView>> = BTreeMap::new();
        for pod in self.stores.pods_matching(&namespace, &selector) {
            let owner = resolve_owner(&pod, |rs| self.stores.get_replica_set(rs, &namespace));
            let Some(owner) = owner else {
                continue;
            };
            workloads.entry(owner).or_default().push(PodView {
                name: pod.name_any(),
                state: pod_state(&pod),
            });
        }

        ServiceView {
            name: service.name_any(),
            namespace,
            workloads: workloads
                .into_iter()
                .map(|(owner, mut pods)| {
                    pods.sort_by(|a, b| a.name.cmp(&b.name));
                    WorkloadView {
                        name: owner.name,
                        kind: owner.kind,
                        pods,
                    }
                })
                .collect(),
        }
    }

    async fn insert_service(&self, view: ServiceView) {
        let mut state = self.state.write().await;
        let topology = state.namespace_mut(&view.namespace);
        let ingresses = topology.ingresses_targeting(&view.name);
        topology
            .services
            .insert(view.name.clone(), ServiceEntry { view, ingresses });
    }

    pub async fn on_service(&self, event: ResourceEvent<Service>) {
        match event {
            ResourceEvent::Created(service) | ResourceEvent::Updated { new: service, .. } => {
                let view = self.assemble(&service);
                debug!(
                    "Assembled service {}/{} with {} workload(s)",
                    view.namespace,
                    view.name,
                    view.workloads.len()
                );
                self.insert_service(view).await;
            }
            ResourceEvent::Deleted(service) => {
                let namespace = service.namespace().unwrap_or_default();
                let mut state = self.state.write().await;
                state
                    .namespace_mut(&namespace)
                    .services
                    .remove(&service.name_any());
            }
        }
    }

    /// Re-assemble a service when its endpoints introduce a pod it does not list yet.
    pub async fn on_endpoints(&self, event: ResourceEvent<Endpoints>) {
        let endpoints = match event {
            ResourceEvent::Created(e) | ResourceEvent::Updated { new: e, .. } => e,
            ResourceEvent::Deleted(_) => return,
        };
        let namespace = endpoints.namespace().unwrap_or_default();
        let name = endpoints.name_any();
        let pod_names = endpoint_pod_names(&endpoints);

        let has_new_pod = {
            let state = self.state.read().await;
            let Some(entry) = state
                .namespaces
                .get(&namespace)
                .and_then(|t| t.services.get(&name))
            else {
                return;
            };
            let known = entry.pod_names();
            pod_names.iter().any(|p| !known.contains(p.as_str()))
        };
        if !has_new_pod {
            return;
        }

        let Some(service) = self.stores.get_service(&name, &namespace) else {
            warn!(
                "Endpoints {}/{} changed but the service is not cached",
                namespace, name
            );
            return;
        };
        debug!("Endpoints {}/{} added pods, re-assembling", namespace, name);
        let view = self.assemble(&service);
        self.insert_service(view).await;
    }

    /// Patch pod states in place; remove deleted pods.
    pub async fn on_pod(&self, event: ResourceEvent<Pod>) {
        let (pod, deleted) = match event {
            ResourceEvent::Created(_) => return,
            ResourceEvent::Updated { old, new } => {
                if pod_state(&old) == pod_state(&new) {
                    return;
                }
                (new, false)
            }
            ResourceEvent::Deleted(pod) => (pod, true),
        };
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        let new_state = pod_state(&pod);

        let mut state = self.state.write().await;
        let Some(topology) = state.namespaces.get_mut(&namespace) else {
            return;
        };
        for entry in topology.services.values_mut() {
            for workload in &mut entry.view.workloads {
                if deleted {
                    workload.pods.retain(|p| p.name != name);
                } else if let Some(p) = workload.pods.iter_mut().find(|p| p.name == name) {
                    p.state.clone_from(&new_state);
                }
            }
            if deleted {
                entry.view.workloads.retain(|w| !w.pods.is_empty());
            }
        }
    }

    /// Replace the `http` rules of a layer-7 ingress; remove them on delete.
    pub async fn on_ingress(&self, event: ResourceEvent<Ingress>) {
        let (ingress, rules) = match event {
            ResourceEvent::Created(i) | ResourceEvent::Updated { new: i, .. } => {
                let rules = http_rules(&i);
                (i, rules)
            }
            ResourceEvent::Deleted(i) => (i, Vec::new()),
        };
        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();

        let mut state = self.state.write().await;
        let topology = state.namespace_mut(&namespace);
        topology.replace_rules(&name, Protocol::Http, rules);
        if let Some(record) = topology.ingresses.get(&name) {
            topology.warn_dangling(&namespace, record);
        }
        topology.refresh_ingress_sets();
    }

    /// Handle the layer-4 ConfigMaps in the reserved namespace.
    pub async fn on_transport_config(&self, event: ResourceEvent<ConfigMap>) {
        let config_map = event.object();
        if config_map.namespace().as_deref() != Some(RESERVED_NAMESPACE) {
            return;
        }
        let Some(protocol) = protocol_for_config_map(&config_map.name_any()) else {
            return;
        };

        let entries = match &event {
            ResourceEvent::Deleted(_) => Vec::new(),
            _ => parse_entries(protocol, &config_map.data.clone().unwrap_or_default()),
        };
        info!(
            "Applying {} {} ingress entr(ies) from {}",
            entries.len(),
            protocol,
            config_map.name_any()
        );
        self.on_replace_transport_layer_ingress(protocol, &entries)
            .await;
    }

    /// Replace every `protocol` rule with the rules synthesised from `entries`.
    ///
    /// Rules of other protocols on the same ingresses are kept.
    pub async fn on_replace_transport_layer_ingress(
        &self,
        protocol: Protocol,
        entries: &[TransportEntry],
    ) {
        let entries: Vec<TransportEntry> = entries
            .iter()
            .filter(|e| e.protocol == protocol)
            .cloned()
            .collect();
        let synthesised = entries_to_ingresses(&entries);

        let mut state = self.state.write().await;
        for (namespace, topology) in &mut state.namespaces {
            let stale: Vec<String> = topology
                .ingresses
                .values()
                .filter(|i| i.rules.iter().any(|r| r.protocol == protocol))
                .filter(|i| {
                    synthesised
                        .get(namespace)
                        .is_none_or(|s| !s.contains_key(&i.name))
                })
                .map(|i| i.name.clone())
                .collect();
            for name in stale {
                topology.replace_rules(&name, protocol, Vec::new());
            }
        }

        for (namespace, records) in synthesised {
            let topology = state.namespace_mut(&namespace);
            for (name, record) in records {
                topology.replace_rules(&name, protocol, record.rules);
                if let Some(record) = topology.ingresses.get(&name) {
                    topology.warn_dangling(&namespace, record);
                }
            }
        }

        for topology in state.namespaces.values_mut() {
            topology.refresh_ingress_sets();
        }
    }

    /// Services in `namespace` that no ingress targets.
    pub async fn inner_services(&self, namespace: &str) -> Vec<ServiceView> {
        let state = self.state.read().await;
        let Some(topology) = state.namespaces.get(namespace) else {
            return Vec::new();
        };
        topology
            .services
            .values()
            .filter(|e| e.ingresses.is_empty())
            .map(|e| e.view.clone())
            .collect()
    }

    /// One entry per rule of every ingress targeting a service in `namespace`.
    pub async fn outer_services(&self, namespace: &str) -> Vec<OuterServiceView> {
        let state = self.state.read().await;
        let Some(topology) = state.namespaces.get(namespace) else {
            return Vec::new();
        };

        let ingress_names: BTreeSet<&String> = topology
            .services
            .values()
            .flat_map(|e| e.ingresses.iter())
            .collect();

        let mut outer = Vec::new();
        for name in ingress_names {
            let Some(record) = topology.ingresses.get(name) else {
                continue;
            };
            for rule in &record.rules {
                let services: BTreeMap<String, ServiceView> = rule
                    .paths
                    .iter()
                    .filter_map(|p| {
                        let entry = topology.services.get(&p.service_name)?;
                        Some((p.path.clone(), entry.view.clone()))
                    })
                    .collect();
                outer.push(OuterServiceView {
                    name: record.name.clone(),
                    entry_point: rule.entry_point(),
                    protocol: rule.protocol,
                    services,
                });
            }
        }
        outer
    }
}

#[async_trait]
impl Projection for ServiceTopology {
    fn name(&self) -> &'static str {
        "service-topology"
    }

    fn interested_in(&self, kind: ResourceKind) -> bool {
        matches!(
            kind,
            ResourceKind::Service
                | ResourceKind::Endpoints
                | ResourceKind::Pod
                | ResourceKind::Ingress
                | ResourceKind::ConfigMap
        )
    }

    async fn handle(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::Service(e) => self.on_service(e).await,
            ClusterEvent::Endpoints(e) => self.on_endpoints(e).await,
            ClusterEvent::Pod(e) => self.on_pod(e).await,
            ClusterEvent::Ingress(e) => self.on_ingress(e).await,
            ClusterEvent::ConfigMap(e) => self.on_transport_config(e).await,
            _ => {}
        }
    }
}
