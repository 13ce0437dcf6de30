// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Live CPU and memory usage from the resource metrics API.
//!
//! `metrics.k8s.io/v1beta1` is served by an aggregated API server and has no
//! typed bindings, so `NodeMetrics` and `PodMetrics` are read as
//! [`DynamicObject`]s and their `usage` maps parsed with the quantity helpers.

use crate::quantity::{parse_bytes, parse_cpu_millis};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";

/// CPU in millicores and memory in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub cpu_millis: u64,
    pub memory_bytes: u64,
}

impl std::ops::AddAssign for ResourceUsage {
    fn add_assign(&mut self, other: Self) {
        self.cpu_millis += other.cpu_millis;
        self.memory_bytes += other.memory_bytes;
    }
}

/// Usage of one pod, summed over its containers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodUsage {
    pub namespace: String,
    pub name: String,
    pub usage: ResourceUsage,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Usage per node name.
    async fn node_usage(&self) -> anyhow::Result<HashMap<String, ResourceUsage>>;

    /// Usage of every pod in the cluster.
    async fn pod_usage(&self) -> anyhow::Result<Vec<PodUsage>>;
}

pub struct KubeMetricsSource {
    client: Client,
}

impl KubeMetricsSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: &str, plural: &str) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        Api::all_with(self.client.clone(), &resource)
    }
}

/// Parse a `{cpu, memory}` usage map; unparsable entries count as zero.
#[must_use]
pub fn parse_usage(usage: &Value) -> ResourceUsage {
    let read = |key: &str, parse: fn(&str) -> Result<u64, crate::errors::QuantityError>| {
        let Some(raw) = usage.get(key).and_then(Value::as_str) else {
            return 0;
        };
        parse(raw).unwrap_or_else(|e| {
            warn!("Ignoring metrics value {}={}: {}", key, raw, e);
            0
        })
    };
    ResourceUsage {
        cpu_millis: read("cpu", parse_cpu_millis),
        memory_bytes: read("memory", parse_bytes),
    }
}

/// Sum the container usages of a `PodMetrics` object.
#[must_use]
pub fn pod_metrics_usage(data: &Value) -> ResourceUsage {
    let mut total = ResourceUsage::default();
    for container in data
        .get("containers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(usage) = container.get("usage") {
            total += parse_usage(usage);
        }
    }
    total
}

#[async_trait]
impl MetricsSource for KubeMetricsSource {
    async fn node_usage(&self) -> anyhow::Result<HashMap<String, ResourceUsage>> {
        let list = self
            .api("NodeMetrics", "nodes")
            .list(&ListParams::default())
            .await?;
        Ok(list
            .items
            .iter()
            .map(|m| {
                let usage = m.data.get("usage").map(parse_usage).unwrap_or_default();
                (m.name_any(), usage)
            })
            .collect())
    }

    async fn pod_usage(&self) -> anyhow::Result<Vec<PodUsage>> {
        let list = self
            .api("PodMetrics", "pods")
            .list(&ListParams::default())
            .await?;
        Ok(list
            .items
            .iter()
            .map(|m| PodUsage {
                namespace: m.namespace().unwrap_or_default(),
                name: m.name_any(),
                usage: pod_metrics_usage(&m.data),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "usage_tests.rs"]
mod usage_tests;
