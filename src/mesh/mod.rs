// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service-mesh (Linkerd) integration.
//!
//! The Linkerd controller's public API takes protobuf requests over HTTP
//! `POST`. Bodies in both directions are framed as a little-endian `u32`
//! length followed by the encoded message.

pub mod proto;

use crate::errors::FrameError;
use crate::labels::{LINKERD_ADMIN_PORT, LINKERD_INJECT, LINKERD_INJECT_ENABLED};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use prost::Message;
use proto::{
    EdgesRequest, EdgesResponse, Resource, ResourceError, ResourceSelection, StatSummaryRequest,
    StatSummaryResponse,
};
use serde::Serialize;
use tracing::debug;

const STAT_SUMMARY_PATH: &str = "/api/v1/StatSummary";
const EDGES_PATH: &str = "/api/v1/Edges";
const FRAME_HEADER_LEN: usize = 4;

/// Whether the pod template is part of the mesh.
///
/// True when proxy injection is enabled by annotation or a container already
/// exposes the proxy's admin port.
#[must_use]
pub fn is_mesh_workload(template: &PodTemplateSpec) -> bool {
    let injected = template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(LINKERD_INJECT))
        .is_some_and(|v| v == LINKERD_INJECT_ENABLED);

    injected
        || template.spec.iter().flat_map(|s| &s.containers).any(|c| {
            c.ports
                .iter()
                .flatten()
                .any(|p| p.name.as_deref() == Some(LINKERD_ADMIN_PORT))
        })
}

/// Encode `message` with its length prefix.
#[must_use]
pub fn encode_frame<M: Message>(message: &M) -> Vec<u8> {
    let payload = message.encode_to_vec();
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

/// Decode one length-prefixed message.
///
/// # Errors
///
/// Returns [`FrameError`] when the prefix is missing, declares more bytes
/// than remain, or the payload does not decode.
pub fn decode_frame<M: Message + Default>(frame: &[u8]) -> Result<M, FrameError> {
    let Some((header, rest)) = frame.split_first_chunk::<FRAME_HEADER_LEN>() else {
        return Err(FrameError::TooShort(frame.len()));
    };
    let declared = u32::from_le_bytes(*header) as usize;
    if declared > rest.len() {
        return Err(FrameError::Truncated {
            declared,
            available: rest.len(),
        });
    }
    Ok(M::decode(&rest[..declared])?)
}

/// Traffic statistics of one meshed resource.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshStat {
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub meshed_pods: u64,
    pub running_pods: u64,
    pub failed_pods: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    pub latency_ms_p50: u64,
    pub latency_ms_p95: u64,
    pub latency_ms_p99: u64,
}

/// A meshed connection between two resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshEdge {
    pub src: String,
    pub dst: String,
    pub client_id: String,
    pub server_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub no_identity_msg: String,
}

fn resource_label(resource: Option<&Resource>) -> String {
    resource.map_or_else(String::new, |r| format!("{}/{}", r.r#type, r.name))
}

fn remote_error(error: ResourceError) -> FrameError {
    FrameError::Remote(error.error)
}

fn selection(namespace: &str, resource_type: &str) -> Option<ResourceSelection> {
    Some(ResourceSelection {
        resource: Some(Resource {
            namespace: namespace.to_string(),
            r#type: resource_type.to_string(),
            name: String::new(),
        }),
        label_selector: String::new(),
    })
}

/// Client for the Linkerd public API.
#[derive(Clone)]
pub struct LinkerdClient {
    base_url: String,
    client: reqwest::Client,
}

impl LinkerdClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn call<Req: Message, Resp: Message + Default>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, FrameError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling mesh controller");
        let body = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(encode_frame(request))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        decode_frame(&body)
    }

    /// Per-resource traffic statistics for `resource_type` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] on transport failure, malformed frames, or an
    /// error reported by the controller.
    pub async fn stat_summary(
        &self,
        namespace: &str,
        resource_type: &str,
        time_window: &str,
    ) -> Result<Vec<MeshStat>, FrameError> {
        let request = StatSummaryRequest {
            selector: selection(namespace, resource_type),
            time_window: time_window.to_string(),
            skip_stats: false,
            tcp_stats: false,
        };
        let response: StatSummaryResponse = self.call(STAT_SUMMARY_PATH, &request).await?;
        if let Some(error) = response.error {
            return Err(remote_error(error));
        }

        let rows = response
            .ok
            .into_iter()
            .flat_map(|ok| ok.stat_tables)
            .filter_map(|t| t.pod_group)
            .flat_map(|g| g.rows);
        Ok(rows
            .map(|row| {
                let resource = row.resource.unwrap_or_default();
                let stats = row.stats.unwrap_or_default();
                let requests = stats.success_count + stats.failure_count;
                MeshStat {
                    namespace: resource.namespace,
                    kind: resource.r#type,
                    name: resource.name,
                    meshed_pods: row.meshed_pod_count,
                    running_pods: row.running_pod_count,
                    failed_pods: row.failed_pod_count,
                    success_rate: (requests > 0)
                        .then(|| stats.success_count as f64 / requests as f64),
                    latency_ms_p50: stats.latency_ms_p50,
                    latency_ms_p95: stats.latency_ms_p95,
                    latency_ms_p99: stats.latency_ms_p99,
                }
            })
            .collect())
    }

    /// Meshed connections between resources of `resource_type` in `namespace`.
    ///
    /// # Errors
    ///
    /// See [`LinkerdClient::stat_summary`].
    pub async fn edges(
        &self,
        namespace: &str,
        resource_type: &str,
    ) -> Result<Vec<MeshEdge>, FrameError> {
        let request = EdgesRequest {
            selector: selection(namespace, resource_type),
        };
        let response: EdgesResponse = self.call(EDGES_PATH, &request).await?;
        if let Some(error) = response.error {
            return Err(remote_error(error));
        }

        Ok(response
            .ok
            .into_iter()
            .flat_map(|ok| ok.edges)
            .map(|edge| MeshEdge {
                src: resource_label(edge.src.as_ref()),
                dst: resource_label(edge.dst.as_ref()),
                client_id: edge.client_id,
                server_id: edge.server_id,
                no_identity_msg: edge.no_identity_msg,
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
