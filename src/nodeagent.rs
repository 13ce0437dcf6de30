// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Node-agent client and fan-out.
//!
//! Every node runs an agent that reports its block devices and the usage of
//! every mounted filesystem:
//!
//! - `GET /v1/disks` returns `device -> {size, parted, filesystem, mountpoint}`
//! - `GET /v1/blockusedsize` returns `mountpoint -> {total, used}`
//!
//! [`NodeAgentPool`] calls all agents in parallel with a bounded width and a
//! per-call timeout. A failing node is logged, counted and alerted; the other
//! nodes still contribute.

use crate::alerts::{AlertEvent, AlertSender};
use crate::constants::{
    DEFAULT_NODE_AGENT_CONCURRENCY, EVENT_REASON_NODE_AGENT, KIND_NODE, NODE_AGENT_TIMEOUT_SECS,
};
use crate::context::Stores;
use crate::errors::NodeAgentError;
use crate::metrics;
use crate::projections::network::node_ip;
use crate::projections::storage::cache::UsageSource;
use async_trait::async_trait;
use futures::{stream, Future, StreamExt};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DISKS_PATH: &str = "/v1/disks";
const BLOCK_USED_SIZE_PATH: &str = "/v1/blockusedsize";

/// A block device as reported by a node agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub size: u64,
    pub parted: bool,
    pub filesystem: String,
    pub mountpoint: String,
}

/// Capacity and usage of one mounted filesystem, in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUsage {
    pub total: u64,
    pub used: u64,
}

#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Node the agent runs on.
    fn node(&self) -> &str;

    async fn get_disks_info(&self) -> Result<BTreeMap<String, DiskInfo>, NodeAgentError>;

    async fn get_block_used_size(&self) -> Result<HashMap<String, BlockUsage>, NodeAgentError>;
}

/// [`NodeAgent`] over HTTP/JSON.
pub struct HttpNodeAgent {
    node: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpNodeAgent {
    #[must_use]
    pub fn new(node: impl Into<String>, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            node: node.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, NodeAgentError> {
        let url = format!("{}{}", self.base_url, path);
        let transport = |source| NodeAgentError::Transport {
            node: self.node.clone(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(NodeAgentError::Status {
                node: self.node.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| NodeAgentError::Decode {
            node: self.node.clone(),
            source,
        })
    }
}

#[async_trait]
impl NodeAgent for HttpNodeAgent {
    fn node(&self) -> &str {
        &self.node
    }

    async fn get_disks_info(&self) -> Result<BTreeMap<String, DiskInfo>, NodeAgentError> {
        self.get_json(DISKS_PATH).await
    }

    async fn get_block_used_size(&self) -> Result<HashMap<String, BlockUsage>, NodeAgentError> {
        self.get_json(BLOCK_USED_SIZE_PATH).await
    }
}

/// Lists the agents to call.
pub trait AgentDirectory: Send + Sync {
    /// One entry per node; nodes that cannot be dialled yield an error.
    fn agents(&self) -> Vec<Result<Arc<dyn NodeAgent>, NodeAgentError>>;
}

/// Dials the agent on every cached node at `http://<internal-ip>:<port>`.
pub struct NodeAgentConnector {
    stores: Stores,
    port: u16,
    client: reqwest::Client,
}

impl NodeAgentConnector {
    #[must_use]
    pub fn new(stores: Stores, port: u16, client: reqwest::Client) -> Self {
        Self {
            stores,
            port,
            client,
        }
    }
}

impl AgentDirectory for NodeAgentConnector {
    fn agents(&self) -> Vec<Result<Arc<dyn NodeAgent>, NodeAgentError>> {
        self.stores
            .nodes
            .state()
            .iter()
            .map(|node| {
                let name = node.name_any();
                let ip = node_ip(node)
                    .filter(|ip| !ip.is_empty())
                    .ok_or_else(|| NodeAgentError::MissingAddress(name.clone()))?;
                let agent: Arc<dyn NodeAgent> = Arc::new(HttpNodeAgent::new(
                    name,
                    format!("http://{}:{}", ip, self.port),
                    self.client.clone(),
                ));
                Ok(agent)
            })
            .collect()
    }
}

/// Fans calls out over every node agent.
pub struct NodeAgentPool {
    directory: Arc<dyn AgentDirectory>,
    alerts: AlertSender,
    concurrency: usize,
    timeout: Duration,
}

impl NodeAgentPool {
    #[must_use]
    pub fn new(directory: Arc<dyn AgentDirectory>, alerts: AlertSender) -> Self {
        Self {
            directory,
            alerts,
            concurrency: DEFAULT_NODE_AGENT_CONCURRENCY,
            timeout: Duration::from_secs(NODE_AGENT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Block devices of every reachable node, keyed by node.
    pub async fn disks_info(&self) -> BTreeMap<String, BTreeMap<String, DiskInfo>> {
        self.fan_out("disks_info", |agent| async move { agent.get_disks_info().await })
            .await
            .into_iter()
            .collect()
    }

    /// Usage of every mountpoint on every reachable node.
    pub async fn block_used_size(&self) -> HashMap<String, BlockUsage> {
        self.fan_out("block_used_size", |agent| async move {
            agent.get_block_used_size().await
        })
        .await
        .into_iter()
        .flat_map(|(_, usage)| usage)
        .collect()
    }

    async fn fan_out<T, F, Fut>(&self, rpc: &'static str, call: F) -> Vec<(String, T)>
    where
        F: Fn(Arc<dyn NodeAgent>) -> Fut,
        Fut: Future<Output = Result<T, NodeAgentError>>,
    {
        let timeout = self.timeout;
        let calls = self.directory.agents().into_iter().map(|agent| {
            let call = &call;
            async move {
                let agent = agent?;
                let node = agent.node().to_string();
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, call(Arc::clone(&agent))).await;
                metrics::record_node_agent_request(rpc, started.elapsed());
                match result {
                    Ok(Ok(value)) => Ok((node, value)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(NodeAgentError::Timeout {
                        node,
                        seconds: timeout.as_secs(),
                    }),
                }
            }
        }).collect::<Vec<_>>();

        let results: Vec<Result<(String, T), NodeAgentError>> = stream::iter(calls)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut values = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(value) => values.push(value),
                Err(e) => self.report_failure(rpc, e).await,
            }
        }
        debug!(rpc, nodes = values.len(), "Node-agent fan-out finished");
        values
    }

    async fn report_failure(&self, rpc: &str, error: NodeAgentError) {
        let node = match &error {
            NodeAgentError::Timeout { node, .. }
            | NodeAgentError::Transport { node, .. }
            | NodeAgentError::Status { node, .. }
            | NodeAgentError::Decode { node, .. }
            | NodeAgentError::MissingAddress(node) => node.clone(),
        };
        warn!(node = %node, rpc, error = %error, "Node agent call failed");
        metrics::record_node_agent_failure(&node);
        self.alerts
            .emit(AlertEvent {
                kind: KIND_NODE.to_string(),
                namespace: String::new(),
                name: node,
                message: error.to_string(),
                reason: EVENT_REASON_NODE_AGENT,
            })
            .await;
    }
}

#[async_trait]
impl UsageSource for NodeAgentPool {
    async fn usage(&self) -> HashMap<String, BlockUsage> {
        self.block_used_size().await
    }
}

#[cfg(test)]
#[path = "nodeagent_tests.rs"]
mod nodeagent_tests;
