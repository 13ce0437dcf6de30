// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster, node and namespace checks.
//!
//! Each check gathers one sample from the reflector stores, the resource
//! metrics API and the storage projection, then compares every dimension
//! against the current thresholds. The checks return alerts; the runner in
//! [`super`] pushes them onto the alert channel.

use super::threshold::{check, Breach, Dimension, MonitorConfig};
use super::usage::{MetricsSource, ResourceUsage};
use crate::alerts::AlertEvent;
use crate::constants::{
    EVENT_REASON_THRESHOLD, KIND_CLUSTER, KIND_NAMESPACE, KIND_NODE, KIND_POD, POD_PHASE_RUNNING,
    QUOTA_LIMITS_CPU, QUOTA_LIMITS_MEMORY, QUOTA_REQUESTS_STORAGE, RESOURCE_CPU, RESOURCE_MEMORY,
    RESOURCE_PODS,
};
use crate::context::Stores;
use crate::projections::StorageProjection;
use crate::quantity::{bytes_of, cpu_millis_of};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const CLUSTER_NAME: &str = "cluster";

/// Capacity and usage of one subject.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    pub cpu: u64,
    pub cpu_used: u64,
    pub memory: u64,
    pub memory_used: u64,
    pub pods: u64,
    pub pods_used: u64,
}

impl Sample {
    /// Breaches of the cpu, memory and pod-count dimensions.
    #[must_use]
    pub fn breaches(&self, config: &MonitorConfig) -> Vec<Breach> {
        [
            check(Dimension::Cpu, self.cpu_used, self.cpu, config),
            check(Dimension::Memory, self.memory_used, self.memory, config),
            check(Dimension::PodCount, self.pods_used, self.pods, config),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl std::ops::AddAssign for Sample {
    fn add_assign(&mut self, other: Self) {
        self.cpu += other.cpu;
        self.cpu_used += other.cpu_used;
        self.memory += other.memory;
        self.memory_used += other.memory_used;
        self.pods += other.pods;
        self.pods_used += other.pods_used;
    }
}

/// One periodic check.
#[async_trait]
pub trait Check: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn run(&self, config: &MonitorConfig) -> Vec<AlertEvent>;
}

/// What every check reads from.
#[derive(Clone)]
pub struct CheckContext {
    pub stores: Stores,
    pub storage: Arc<StorageProjection>,
    pub metrics: Arc<dyn MetricsSource>,
}

fn alert(kind: &str, namespace: &str, name: &str, message: String) -> AlertEvent {
    AlertEvent {
        kind: kind.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        message,
        reason: EVENT_REASON_THRESHOLD,
    }
}

fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|p| p == POD_PHASE_RUNNING)
}

/// Allocatable capacity of a node with its live usage.
#[must_use]
pub fn node_sample(node: &Node, usage: ResourceUsage, running_pods: u64) -> Sample {
    let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
    Sample {
        cpu: cpu_millis_of(allocatable, RESOURCE_CPU),
        cpu_used: usage.cpu_millis,
        memory: bytes_of(allocatable, RESOURCE_MEMORY),
        memory_used: usage.memory_bytes,
        pods: bytes_of(allocatable, RESOURCE_PODS),
        pods_used: running_pods,
    }
}

impl CheckContext {
    async fn node_usage(&self) -> HashMap<String, ResourceUsage> {
        self.metrics.node_usage().await.unwrap_or_else(|e| {
            warn!("Failed to read node metrics: {}", e);
            HashMap::new()
        })
    }

    /// Sample of every cached node, keyed by node name.
    pub async fn node_samples(&self) -> BTreeMap<String, Sample> {
        let usage = self.node_usage().await;
        self.stores
            .nodes
            .state()
            .iter()
            .map(|node| {
                let name = node.name_any();
                let running = self
                    .stores
                    .pods_on_node(&name)
                    .iter()
                    .filter(|p| is_running(p))
                    .count() as u64;
                let sample = node_sample(
                    node,
                    usage.get(&name).copied().unwrap_or_default(),
                    running,
                );
                (name, sample)
            })
            .collect()
    }

    /// Sum of all node samples.
    pub async fn cluster_sample(&self) -> Sample {
        let mut total = Sample::default();
        for sample in self.node_samples().await.into_values() {
            total += sample;
        }
        total
    }
}

pub struct ClusterCheck {
    ctx: CheckContext,
}

impl ClusterCheck {
    #[must_use]
    pub fn new(ctx: CheckContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Check for ClusterCheck {
    fn name(&self) -> &'static str {
        "cluster"
    }

    async fn run(&self, config: &MonitorConfig) -> Vec<AlertEvent> {
        let sample = self.ctx.cluster_sample().await;
        let mut alerts: Vec<AlertEvent> = sample
            .breaches(config)
            .iter()
            .map(|b| alert(KIND_CLUSTER, "", CLUSTER_NAME, b.message()))
            .collect();

        for (class, usage) in self.ctx.storage.class_totals().await {
            if let Some(breach) = check(Dimension::Storage, usage.used, usage.total, config) {
                alerts.push(alert(
                    KIND_CLUSTER,
                    "",
                    CLUSTER_NAME,
                    format!("storage class {}: {}", class, breach.message()),
                ));
            }
        }
        debug!(alerts = alerts.len(), "Cluster check finished");
        alerts
    }
}

pub struct NodeCheck {
    ctx: CheckContext,
}

impl NodeCheck {
    #[must_use]
    pub fn new(ctx: CheckContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Check for NodeCheck {
    fn name(&self) -> &'static str {
        "node"
    }

    async fn run(&self, config: &MonitorConfig) -> Vec<AlertEvent> {
        self.ctx
            .node_samples()
            .await
            .into_iter()
            .flat_map(|(node, sample)| {
                sample
                    .breaches(config)
                    .into_iter()
                    .map(move |b| alert(KIND_NODE, "", &node, b.message()))
            })
            .collect()
    }
}

/// Smallest hard value of `key` over the namespace's quotas.
fn quota_limit(
    ctx: &CheckContext,
    namespace: &str,
    key: &str,
    parse: fn(Option<&BTreeMap<String, Quantity>>, &str) -> u64,
) -> Option<u64> {
    ctx.stores
        .resource_quotas_in(namespace)
        .iter()
        .filter_map(|q| {
            let hard = q.spec.as_ref().and_then(|s| s.hard.as_ref())?;
            hard.contains_key(key).then(|| parse(Some(hard), key))
        })
        .min()
}

pub struct NamespaceCheck {
    ctx: CheckContext,
}

impl NamespaceCheck {
    #[must_use]
    pub fn new(ctx: CheckContext) -> Self {
        Self { ctx }
    }

    /// Usage of running pods summed per namespace.
    async fn namespace_usage(&self) -> HashMap<String, ResourceUsage> {
        let pods = match self.ctx.metrics.pod_usage().await {
            Ok(pods) => pods,
            Err(e) => {
                warn!("Failed to read pod metrics: {}", e);
                return HashMap::new();
            }
        };
        let running: HashSet<(String, String)> = self
            .ctx
            .stores
            .pods
            .state()
            .iter()
            .filter(|p| is_running(p))
            .map(|p| (p.namespace().unwrap_or_default(), p.name_any()))
            .collect();

        let mut totals: HashMap<String, ResourceUsage> = HashMap::new();
        for pod in pods {
            if running.contains(&(pod.namespace.clone(), pod.name.clone())) {
                *totals.entry(pod.namespace).or_default() += pod.usage;
            }
        }
        totals
    }
}

#[async_trait]
impl Check for NamespaceCheck {
    fn name(&self) -> &'static str {
        "namespace"
    }

    async fn run(&self, config: &MonitorConfig) -> Vec<AlertEvent> {
        let cluster = self.ctx.cluster_sample().await;
        let cluster_storage: u64 = self
            .ctx
            .storage
            .class_totals()
            .await
            .values()
            .map(|u| u.total)
            .sum();
        let usage = self.namespace_usage().await;

        let mut alerts = Vec::new();
        for namespace in self.ctx.stores.namespaces.state() {
            let ns = namespace.name_any();
            let used = usage.get(&ns).copied().unwrap_or_default();

            let cpu = quota_limit(&self.ctx, &ns, QUOTA_LIMITS_CPU, cpu_millis_of)
                .unwrap_or(cluster.cpu);
            let memory = quota_limit(&self.ctx, &ns, QUOTA_LIMITS_MEMORY, bytes_of)
                .unwrap_or(cluster.memory);
            let storage = quota_limit(&self.ctx, &ns, QUOTA_REQUESTS_STORAGE, bytes_of)
                .unwrap_or(cluster_storage);
            let storage_used = self.ctx.storage.namespace_storage_used(&ns).await;

            let breaches = [
                check(Dimension::Cpu, used.cpu_millis, cpu, config),
                check(Dimension::Memory, used.memory_bytes, memory, config),
                check(Dimension::Storage, storage_used, storage, config),
            ];
            alerts.extend(
                breaches
                    .iter()
                    .flatten()
                    .map(|b| alert(KIND_NAMESPACE, "", &ns, b.message())),
            );

            for chain in self.ctx.storage.pod_volume_chains(&ns).await {
                if let Some(breach) = check(Dimension::Storage, chain.used, chain.total, config) {
                    alerts.push(alert(
                        KIND_POD,
                        &ns,
                        &chain.pod,
                        format!(
                            "volume {} (claim {}): {}",
                            chain.pv,
                            chain.pvc,
                            breach.message()
                        ),
                    ));
                }
            }
        }
        alerts
    }
}

#[cfg(test)]
#[path = "checks_tests.rs"]
mod checks_tests;
