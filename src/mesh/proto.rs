// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Messages of the Linkerd public API.
//!
//! Only the fields the agent reads are declared. The API's `oneof response`
//! wrappers are modelled as two optional messages; both encode identically on
//! the wire.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Resource {
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(string, tag = "2")]
    pub r#type: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResourceSelection {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    #[prost(string, tag = "2")]
    pub label_selector: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResourceError {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    #[prost(string, tag = "2")]
    pub error: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatSummaryRequest {
    #[prost(message, optional, tag = "1")]
    pub selector: Option<ResourceSelection>,
    #[prost(string, tag = "2")]
    pub time_window: String,
    #[prost(bool, tag = "6")]
    pub skip_stats: bool,
    #[prost(bool, tag = "7")]
    pub tcp_stats: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct BasicStats {
    #[prost(uint64, tag = "1")]
    pub success_count: u64,
    #[prost(uint64, tag = "2")]
    pub failure_count: u64,
    #[prost(uint64, tag = "3")]
    pub latency_ms_p50: u64,
    #[prost(uint64, tag = "4")]
    pub latency_ms_p95: u64,
    #[prost(uint64, tag = "5")]
    pub latency_ms_p99: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatRow {
    #[prost(message, optional, tag = "1")]
    pub resource: Option<Resource>,
    #[prost(string, tag = "2")]
    pub time_window: String,
    #[prost(uint64, tag = "3")]
    pub meshed_pod_count: u64,
    #[prost(uint64, tag = "4")]
    pub running_pod_count: u64,
    #[prost(message, optional, tag = "5")]
    pub stats: Option<BasicStats>,
    #[prost(uint64, tag = "6")]
    pub failed_pod_count: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PodGroup {
    #[prost(message, repeated, tag = "1")]
    pub rows: Vec<StatRow>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatTable {
    #[prost(message, optional, tag = "1")]
    pub pod_group: Option<PodGroup>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatSummaryOk {
    #[prost(message, repeated, tag = "1")]
    pub stat_tables: Vec<StatTable>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatSummaryResponse {
    #[prost(message, optional, tag = "1")]
    pub ok: Option<StatSummaryOk>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<ResourceError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EdgesRequest {
    #[prost(message, optional, tag = "1")]
    pub selector: Option<ResourceSelection>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Edge {
    #[prost(message, optional, tag = "1")]
    pub src: Option<Resource>,
    #[prost(message, optional, tag = "2")]
    pub dst: Option<Resource>,
    #[prost(string, tag = "3")]
    pub client_id: String,
    #[prost(string, tag = "4")]
    pub server_id: String,
    #[prost(string, tag = "5")]
    pub no_identity_msg: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct EdgesOk {
    #[prost(message, repeated, tag = "1")]
    pub edges: Vec<Edge>,
}

#[derive(Clone, PartialEq, Message)]
pub struct EdgesResponse {
    #[prost(message, optional, tag = "1")]
    pub ok: Option<EdgesOk>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<ResourceError>,
}
