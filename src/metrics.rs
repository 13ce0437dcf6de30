// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the cluster agent.
//!
//! All metrics carry the prefix `cluster_agent_` and are served on
//! `GET /metrics` by the REST router.
//!
//! # Metrics Categories
//!
//! - **Event Metrics** - events consumed per projection and kind
//! - **Error Metrics** - reconcile failures and node-agent failures
//! - **Alert Metrics** - threshold and node-agent alerts emitted
//! - **Performance Metrics** - node-agent RPC latency
//!
//! # Example
//!
//! ```rust,no_run
//! use cluster_agent::metrics::record_alert_emitted;
//!
//! record_alert_emitted("Node");
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "cluster_agent";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Event Metrics
// ============================================================================

/// Events consumed by a projection
///
/// Labels:
/// - `projection`: consumer name (e.g., `service-topology`)
/// - `kind`: resource kind of the event
pub static EVENTS_HANDLED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_events_handled_total"),
        "Total number of cluster events handled by projection and kind",
    );
    let counter = CounterVec::new(opts, &["projection", "kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Failed writes or lookups while handling an event
///
/// Labels:
/// - `component`: the reconciler or projection that failed
pub static RECONCILE_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconcile_errors_total"),
        "Total number of reconcile errors by component",
    );
    let counter = CounterVec::new(opts, &["component"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Failed node-agent RPCs
///
/// Labels:
/// - `node`: node the agent runs on
pub static NODE_AGENT_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_node_agent_failures_total"),
        "Total number of failed node-agent calls by node",
    );
    let counter = CounterVec::new(opts, &["node"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Alert Metrics
// ============================================================================

/// Alerts pushed onto the alert channel
///
/// Labels:
/// - `scope`: kind of the alert subject (`Cluster`, `Node`, `Namespace`, `Pod`)
pub static ALERTS_EMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_alerts_emitted_total"),
        "Total number of alerts emitted by scope",
    );
    let counter = CounterVec::new(opts, &["scope"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Whether the threshold monitors are running (1) or stopped (0)
///
/// Labels:
/// - `monitor`: `cluster`, `node` or `namespace`
pub static MONITOR_RUNNING: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_monitor_running"),
        "Whether each threshold monitor loop is running",
    );
    let gauge = GaugeVec::new(opts, &["monitor"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Performance Metrics
// ============================================================================

/// Mount-point cache refreshes (one node-agent fan-out each)
pub static MOUNTPOINT_CACHE_REFRESHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        format!("{METRICS_NAMESPACE}_mountpoint_cache_refreshes_total"),
        "Total number of mount-point cache refreshes",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of node-agent RPCs in seconds
///
/// Labels:
/// - `rpc`: `disks_info` or `block_used_size`
pub static NODE_AGENT_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_node_agent_request_duration_seconds"),
        "Duration of node-agent calls in seconds by rpc",
    )
    .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]);
    let histogram = HistogramVec::new(opts, &["rpc"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Helper Functions
// ============================================================================

pub fn record_event_handled(projection: &str, kind: &str) {
    EVENTS_HANDLED_TOTAL
        .with_label_values(&[projection, kind])
        .inc();
}

pub fn record_reconcile_error(component: &str) {
    RECONCILE_ERRORS_TOTAL.with_label_values(&[component]).inc();
}

pub fn record_node_agent_failure(node: &str) {
    NODE_AGENT_FAILURES_TOTAL.with_label_values(&[node]).inc();
}

pub fn record_node_agent_request(rpc: &str, duration: Duration) {
    NODE_AGENT_REQUEST_DURATION_SECONDS
        .with_label_values(&[rpc])
        .observe(duration.as_secs_f64());
}

pub fn record_alert_emitted(scope: &str) {
    ALERTS_EMITTED_TOTAL.with_label_values(&[scope]).inc();
}

pub fn record_mountpoint_cache_refresh() {
    MOUNTPOINT_CACHE_REFRESHES_TOTAL.inc();
}

pub fn set_monitor_running(monitor: &str, running: bool) {
    MONITOR_RUNNING
        .with_label_values(&[monitor])
        .set(if running { 1.0 } else { 0.0 });
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
