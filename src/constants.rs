// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the cluster agent.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Reserved Objects
// ============================================================================

/// Namespace holding the agent's own control objects
pub const RESERVED_NAMESPACE: &str = "cluster-agent-system";

/// `ConfigMap` whose presence starts the threshold monitors
pub const THRESHOLD_CONFIGMAP: &str = "threshold";

/// `ConfigMap` carrying layer-4 TCP ingress mappings
pub const TCP_SERVICES_CONFIGMAP: &str = "tcp-services";

/// `ConfigMap` carrying layer-4 UDP ingress mappings
pub const UDP_SERVICES_CONFIGMAP: &str = "udp-services";

/// Finalizer placed on configs that are referenced by an opted-in workload
pub const CONFIG_FINALIZER: &str = "cluster-agent.io/config-in-use";

// ============================================================================
// Kind Names
// ============================================================================

pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_DAEMON_SET: &str = "DaemonSet";
pub const KIND_STATEFUL_SET: &str = "StatefulSet";
pub const KIND_REPLICA_SET: &str = "ReplicaSet";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";
pub const KIND_SECRET: &str = "Secret";
pub const KIND_POD: &str = "Pod";
pub const KIND_NODE: &str = "Node";
pub const KIND_NAMESPACE: &str = "Namespace";
pub const KIND_CLUSTER: &str = "Cluster";

// ============================================================================
// Pod Phases
// ============================================================================

/// Phase of a pod whose containers have been started
pub const POD_PHASE_RUNNING: &str = "Running";

/// Synthetic lifecycle state for pods carrying a deletion timestamp
pub const POD_STATE_TERMINATING: &str = "Terminating";

/// Lifecycle state reported when the orchestrator has not set a phase yet
pub const POD_STATE_UNKNOWN: &str = "Unknown";

// ============================================================================
// Resource Names
// ============================================================================

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_PODS: &str = "pods";
pub const RESOURCE_STORAGE: &str = "storage";

/// `ResourceQuota` hard limit used as namespace CPU total
pub const QUOTA_LIMITS_CPU: &str = "limits.cpu";

/// `ResourceQuota` hard limit used as namespace memory total
pub const QUOTA_LIMITS_MEMORY: &str = "limits.memory";

/// `ResourceQuota` hard limit used as namespace storage total
pub const QUOTA_REQUESTS_STORAGE: &str = "requests.storage";

/// Node-affinity key that pins local volumes to a host
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Node address type preferred for the node network view
pub const NODE_ADDRESS_INTERNAL_IP: &str = "InternalIP";

// ============================================================================
// Event Constants
// ============================================================================

/// Event type used for every emitted alert
pub const EVENT_TYPE_WARNING: &str = "Warning";

/// Reason used for threshold breaches
pub const EVENT_REASON_THRESHOLD: &str = "ThresholdExceeded";

/// Reason used when a node agent cannot be reached
pub const EVENT_REASON_NODE_AGENT: &str = "NodeAgentUnavailable";

/// Reporting component for emitted events
pub const EVENT_COMPONENT: &str = "cluster-agent";

/// Length of the random suffix appended to event names
pub const EVENT_NAME_SUFFIX_LEN: usize = 16;

/// Capacity of the shared alert channel; senders block when it is full
pub const ALERT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Timing Constants
// ============================================================================

/// Default mount-point cache TTL in seconds (`CACHE_TIME`)
pub const DEFAULT_CACHE_TIME_SECS: u64 = 60;

/// Default threshold monitor tick in seconds
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Per-call timeout for node-agent RPCs
pub const NODE_AGENT_TIMEOUT_SECS: u64 = 10;

/// Upper bound on the initial cache sync before startup is abandoned
pub const CACHE_SYNC_TIMEOUT_SECS: u64 = 300;

/// Default port the node agents listen on
pub const DEFAULT_NODE_AGENT_PORT: u16 = 8090;

/// Default number of node agents queried concurrently
pub const DEFAULT_NODE_AGENT_CONCURRENCY: usize = 8;

/// Capacity of each projection's event queue
pub const PROJECTION_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default bind address for the REST and metrics listener
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8080";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Default Linkerd public API endpoint
pub const DEFAULT_LINKERD_API_URL: &str =
    "http://linkerd-controller-api.linkerd.svc.cluster.local:8085";

/// Default time window for mesh stat summaries
pub const DEFAULT_MESH_TIME_WINDOW: &str = "1m";
