// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared reflector stores for every watched kind.
//!
//! Each store is populated by a dedicated reflector task started in `main`.
//! Projections use them for reads of related objects during assembly (pods
//! selected by a service, the owner of a `ReplicaSet`, the data of a config)
//! without calling the API server.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
    ResourceQuota, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::reflector::store::Writer;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Collection of all reflector stores.
#[derive(Clone)]
pub struct Stores {
    // Cluster-scoped resources
    pub namespaces: Store<Namespace>,
    pub nodes: Store<Node>,
    pub persistent_volumes: Store<PersistentVolume>,

    // Namespace-scoped resources
    pub pods: Store<Pod>,
    pub replica_sets: Store<ReplicaSet>,
    pub services: Store<Service>,
    pub endpoints: Store<Endpoints>,
    pub ingresses: Store<Ingress>,
    pub config_maps: Store<ConfigMap>,
    pub secrets: Store<Secret>,
    pub deployments: Store<Deployment>,
    pub daemon_sets: Store<DaemonSet>,
    pub stateful_sets: Store<StatefulSet>,
    pub persistent_volume_claims: Store<PersistentVolumeClaim>,
    pub resource_quotas: Store<ResourceQuota>,
}

/// Write halves of [`Stores`], handed to the reflector tasks.
pub struct StoreWriters {
    pub namespaces: Writer<Namespace>,
    pub nodes: Writer<Node>,
    pub persistent_volumes: Writer<PersistentVolume>,
    pub pods: Writer<Pod>,
    pub replica_sets: Writer<ReplicaSet>,
    pub services: Writer<Service>,
    pub endpoints: Writer<Endpoints>,
    pub ingresses: Writer<Ingress>,
    pub config_maps: Writer<ConfigMap>,
    pub secrets: Writer<Secret>,
    pub deployments: Writer<Deployment>,
    pub daemon_sets: Writer<DaemonSet>,
    pub stateful_sets: Writer<StatefulSet>,
    pub persistent_volume_claims: Writer<PersistentVolumeClaim>,
    pub resource_quotas: Writer<ResourceQuota>,
}

/// Create empty stores and their writers.
#[must_use]
pub fn stores() -> (Stores, StoreWriters) {
    let (namespaces, namespaces_w) = reflector::store();
    let (nodes, nodes_w) = reflector::store();
    let (persistent_volumes, persistent_volumes_w) = reflector::store();
    let (pods, pods_w) = reflector::store();
    let (replica_sets, replica_sets_w) = reflector::store();
    let (services, services_w) = reflector::store();
    let (endpoints, endpoints_w) = reflector::store();
    let (ingresses, ingresses_w) = reflector::store();
    let (config_maps, config_maps_w) = reflector::store();
    let (secrets, secrets_w) = reflector::store();
    let (deployments, deployments_w) = reflector::store();
    let (daemon_sets, daemon_sets_w) = reflector::store();
    let (stateful_sets, stateful_sets_w) = reflector::store();
    let (persistent_volume_claims, persistent_volume_claims_w) = reflector::store();
    let (resource_quotas, resource_quotas_w) = reflector::store();

    (
        Stores {
            namespaces,
            nodes,
            persistent_volumes,
            pods,
            replica_sets,
            services,
            endpoints,
            ingresses,
            config_maps,
            secrets,
            deployments,
            daemon_sets,
            stateful_sets,
            persistent_volume_claims,
            resource_quotas,
        },
        StoreWriters {
            namespaces: namespaces_w,
            nodes: nodes_w,
            persistent_volumes: persistent_volumes_w,
            pods: pods_w,
            replica_sets: replica_sets_w,
            services: services_w,
            endpoints: endpoints_w,
            ingresses: ingresses_w,
            config_maps: config_maps_w,
            secrets: secrets_w,
            deployments: deployments_w,
            daemon_sets: daemon_sets_w,
            stateful_sets: stateful_sets_w,
            persistent_volume_claims: persistent_volume_claims_w,
            resource_quotas: resource_quotas_w,
        },
    )
}

impl Stores {
    /// Block until every reflector has delivered its initial list.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer was dropped before its first sync.
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.namespaces.wait_until_ready().await?;
        self.nodes.wait_until_ready().await?;
        self.persistent_volumes.wait_until_ready().await?;
        self.pods.wait_until_ready().await?;
        self.replica_sets.wait_until_ready().await?;
        self.services.wait_until_ready().await?;
        self.endpoints.wait_until_ready().await?;
        self.ingresses.wait_until_ready().await?;
        self.config_maps.wait_until_ready().await?;
        self.secrets.wait_until_ready().await?;
        self.deployments.wait_until_ready().await?;
        self.daemon_sets.wait_until_ready().await?;
        self.stateful_sets.wait_until_ready().await?;
        self.persistent_volume_claims.wait_until_ready().await?;
        self.resource_quotas.wait_until_ready().await?;
        Ok(())
    }

    /// Get a `ConfigMap` by name and namespace.
    #[must_use]
    pub fn get_config_map(&self, name: &str, namespace: &str) -> Option<Arc<ConfigMap>> {
        self.config_maps
            .get(&ObjectRef::new(name).within(namespace))
    }

    /// Get a `Secret` by name and namespace.
    #[must_use]
    pub fn get_secret(&self, name: &str, namespace: &str) -> Option<Arc<Secret>> {
        self.secrets.get(&ObjectRef::new(name).within(namespace))
    }

    /// Get a `ReplicaSet` by name and namespace.
    #[must_use]
    pub fn get_replica_set(&self, name: &str, namespace: &str) -> Option<Arc<ReplicaSet>> {
        self.replica_sets
            .get(&ObjectRef::new(name).within(namespace))
    }

    /// Get a `Service` by name and namespace.
    #[must_use]
    pub fn get_service(&self, name: &str, namespace: &str) -> Option<Arc<Service>> {
        self.services.get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_deployment(&self, name: &str, namespace: &str) -> Option<Arc<Deployment>> {
        self.deployments
            .get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_daemon_set(&self, name: &str, namespace: &str) -> Option<Arc<DaemonSet>> {
        self.daemon_sets
            .get(&ObjectRef::new(name).within(namespace))
    }

    #[must_use]
    pub fn get_stateful_set(&self, name: &str, namespace: &str) -> Option<Arc<StatefulSet>> {
        self.stateful_sets
            .get(&ObjectRef::new(name).within(namespace))
    }

    /// Pods in `namespace` whose labels contain every pair of `selector`.
    ///
    /// An empty selector matches nothing, the way a service without a
    /// selector has no automatically managed endpoints.
    #[must_use]
    pub fn pods_matching(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Vec<Arc<Pod>> {
        if selector.is_empty() {
            return Vec::new();
        }
        self.pods
            .state()
            .into_iter()
            .filter(|pod| pod.namespace().as_deref() == Some(namespace))
            .filter(|pod| {
                let labels = pod.labels();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .collect()
    }

    /// Pods scheduled onto `node`.
    #[must_use]
    pub fn pods_on_node(&self, node: &str) -> Vec<Arc<Pod>> {
        self.pods
            .state()
            .into_iter()
            .filter(|pod| {
                pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(node)
            })
            .collect()
    }

    /// Deployments in `namespace`.
    #[must_use]
    pub fn deployments_in(&self, namespace: &str) -> Vec<Arc<Deployment>> {
        self.deployments
            .state()
            .into_iter()
            .filter(|d| d.namespace().as_deref() == Some(namespace))
            .collect()
    }

    /// Resource quotas in `namespace`.
    #[must_use]
    pub fn resource_quotas_in(&self, namespace: &str) -> Vec<Arc<ResourceQuota>> {
        self.resource_quotas
            .state()
            .into_iter()
            .filter(|q| q.namespace().as_deref() == Some(namespace))
            .collect()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
