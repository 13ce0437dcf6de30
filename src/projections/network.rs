// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node, pod and service networks.
//!
//! One node network per node (its internal IP), one pod network per node
//! that has a pod CIDR assigned, and one service network per service with a
//! real cluster IP. Headless services (`clusterIP: None`) have none.

use crate::constants::NODE_ADDRESS_INTERNAL_IP;
use crate::informer::{ClusterEvent, Projection, ResourceEvent, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

const HEADLESS_CLUSTER_IP: &str = "None";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NodeNetwork {
    pub name: String,
    pub ip: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PodNetwork {
    pub node: String,
    pub cidr: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNetwork {
    pub namespace: String,
    pub name: String,
    pub cluster_ip: String,
}

#[derive(Default)]
struct NetworkState {
    nodes: BTreeMap<String, NodeNetwork>,
    pods: BTreeMap<String, PodNetwork>,
    services: BTreeMap<(String, String), ServiceNetwork>,
}

/// The node's first `InternalIP`, falling back to its first address.
#[must_use]
pub fn node_ip(node: &Node) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    addresses
        .iter()
        .find(|a| a.type_ == NODE_ADDRESS_INTERNAL_IP)
        .or_else(|| addresses.first())
        .map(|a| a.address.clone())
}

#[derive(Default)]
pub struct NetworkProjection {
    state: RwLock<NetworkState>,
}

impl NetworkProjection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_node(&self, event: ResourceEvent<Node>) {
        let mut state = self.state.write().await;
        match event {
            ResourceEvent::Created(node) | ResourceEvent::Updated { new: node, .. } => {
                let name = node.name_any();
                state.nodes.insert(
                    name.clone(),
                    NodeNetwork {
                        name: name.clone(),
                        ip: node_ip(&node).unwrap_or_default(),
                    },
                );

                let cidr = node
                    .spec
                    .as_ref()
                    .and_then(|s| s.pod_cidr.clone())
                    .filter(|c| !c.is_empty());
                match cidr {
                    Some(cidr) => {
                        state.pods.insert(
                            name.clone(),
                            PodNetwork {
                                node: name,
                                cidr,
                            },
                        );
                    }
                    None => {
                        state.pods.remove(&name);
                    }
                }
            }
            ResourceEvent::Deleted(node) => {
                let name = node.name_any();
                debug!(node = %name, "Removing node and pod networks");
                state.nodes.remove(&name);
                state.pods.remove(&name);
            }
        }
    }

    pub async fn on_service(&self, event: ResourceEvent<Service>) {
        let mut state = self.state.write().await;
        let service = event.object();
        let key = (
            service.namespace().unwrap_or_default(),
            service.name_any(),
        );

        let cluster_ip = match &event {
            ResourceEvent::Deleted(_) => None,
            _ => service
                .spec
                .as_ref()
                .and_then(|s| s.cluster_ip.clone())
                .filter(|ip| !ip.is_empty() && ip != HEADLESS_CLUSTER_IP),
        };

        match cluster_ip {
            Some(cluster_ip) => {
                state.services.insert(
                    key.clone(),
                    ServiceNetwork {
                        namespace: key.0,
                        name: key.1,
                        cluster_ip,
                    },
                );
            }
            None => {
                state.services.remove(&key);
            }
        }
    }

    pub async fn node_networks(&self) -> Vec<NodeNetwork> {
        self.state.read().await.nodes.values().cloned().collect()
    }

    pub async fn pod_networks(&self) -> Vec<PodNetwork> {
        self.state.read().await.pods.values().cloned().collect()
    }

    pub async fn service_networks(&self) -> Vec<ServiceNetwork> {
        self.state.read().await.services.values().cloned().collect()
    }
}

#[async_trait]
impl Projection for NetworkProjection {
    fn name(&self) -> &'static str {
        "network"
    }

    fn interested_in(&self, kind: ResourceKind) -> bool {
        matches!(kind, ResourceKind::Node | ResourceKind::Service)
    }

    async fn handle(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::Node(e) => self.on_node(e).await,
            ClusterEvent::Service(e) => self.on_service(e).await,
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod network_tests;
