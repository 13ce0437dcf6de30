// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.

use crate::constants::{
    DEFAULT_CACHE_TIME_SECS, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_LINKERD_API_URL,
    DEFAULT_LISTEN_ADDRESS, DEFAULT_MESH_TIME_WINDOW, DEFAULT_NODE_AGENT_CONCURRENCY,
    DEFAULT_NODE_AGENT_PORT,
};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Cluster agent: config rollouts, cluster views and threshold alerts
#[derive(Parser, Debug, Clone)]
#[command(name = "cluster-agent", version, about, long_about = None)]
pub struct AgentConfig {
    /// Mount-point usage cache TTL in seconds
    #[arg(long, env = "CACHE_TIME", default_value_t = DEFAULT_CACHE_TIME_SECS)]
    pub cache_time: u64,

    /// Threshold monitor tick in seconds
    #[arg(
        long,
        env = "CHECK_INTERVAL",
        default_value_t = DEFAULT_CHECK_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub check_interval: u64,

    /// Port the node agents listen on
    #[arg(long, env = "NODE_AGENT_PORT", default_value_t = DEFAULT_NODE_AGENT_PORT)]
    pub node_agent_port: u16,

    /// Number of node agents queried concurrently
    #[arg(long, env = "NODE_AGENT_CONCURRENCY", default_value_t = DEFAULT_NODE_AGENT_CONCURRENCY)]
    pub node_agent_concurrency: usize,

    /// Address of the REST and metrics listener
    #[arg(long = "listen", env = "LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: SocketAddr,

    /// Linkerd public API endpoint
    #[arg(long = "linkerd-api", env = "LINKERD_API_URL", default_value = DEFAULT_LINKERD_API_URL)]
    pub linkerd_api_url: String,

    /// Time window for mesh statistics
    #[arg(long, env = "MESH_TIME_WINDOW", default_value = DEFAULT_MESH_TIME_WINDOW)]
    pub mesh_time_window: String,

    /// Name of the pod the agent runs in; alert events are addressed to it
    #[arg(long, env = "POD_NAME", default_value = "cluster-agent")]
    pub pod_name: String,

    /// Namespace of the pod the agent runs in
    #[arg(long, env = "POD_NAMESPACE", default_value = crate::constants::RESERVED_NAMESPACE)]
    pub pod_namespace: String,
}

impl AgentConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_time)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
