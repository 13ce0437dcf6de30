// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only REST surface over the projections.
//!
//! Every route is an idempotent `GET` that renders the current snapshot of one
//! projection as JSON. `/metrics` serves the Prometheus text format.

use crate::constants::METRICS_SERVER_PATH;
use crate::context::Stores;
use crate::mesh::{is_mesh_workload, LinkerdClient};
use crate::metrics;
use crate::nodeagent::NodeAgentPool;
use crate::projections::{NetworkProjection, ServiceTopology, StorageProjection};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Resource type queried from the mesh controller.
const MESH_RESOURCE_TYPE: &str = "deployment";

/// Everything the handlers read from.
#[derive(Clone)]
pub struct AppState {
    pub topology: Arc<ServiceTopology>,
    pub storage: Arc<StorageProjection>,
    pub network: Arc<NetworkProjection>,
    pub node_agents: Arc<NodeAgentPool>,
    pub mesh: LinkerdClient,
    pub mesh_time_window: String,
    pub stores: Stores,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(METRICS_SERVER_PATH, get(prometheus_metrics))
        .route("/v1/storageclasses", get(storage_classes))
        .route("/v1/blockdevices", get(block_devices))
        .route("/v1/namespaces/{ns}/innerservices", get(inner_services))
        .route("/v1/namespaces/{ns}/outerservices", get(outer_services))
        .route("/v1/networks/nodes", get(node_networks))
        .route("/v1/networks/pods", get(pod_networks))
        .route("/v1/networks/services", get(service_networks))
        .route("/v1/namespaces/{ns}/meshstats", get(mesh_stats))
        .route("/v1/namespaces/{ns}/edges", get(mesh_edges))
        .with_state(state)
}

/// Serve the router until the listener fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server stops.
pub async fn serve(address: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("REST API listening on {}", address);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn prometheus_metrics() -> Result<Response, ApiError> {
    let body = metrics::gather_metrics().map_err(|e| {
        error!("Failed to render metrics: {}", e);
        ApiError::internal(e.to_string())
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn storage_classes(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.storage.classify().await)
}

async fn block_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.node_agents.disks_info().await)
}

async fn inner_services(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> impl IntoResponse {
    Json(state.topology.inner_services(&ns).await)
}

async fn outer_services(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> impl IntoResponse {
    Json(state.topology.outer_services(&ns).await)
}

async fn node_networks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.network.node_networks().await)
}

async fn pod_networks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.network.pod_networks().await)
}

async fn service_networks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.network.service_networks().await)
}

/// Names of the deployments in `namespace` whose pods join the mesh.
fn mesh_deployments(stores: &Stores, namespace: &str) -> BTreeSet<String> {
    stores
        .deployments_in(namespace)
        .iter()
        .filter(|d| d.spec.as_ref().is_some_and(|s| is_mesh_workload(&s.template)))
        .filter_map(|d| d.metadata.name.clone())
        .collect()
}

/// Controller statistics for the mesh workloads of a namespace.
async fn mesh_stats(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut stats = state
        .mesh
        .stat_summary(&ns, MESH_RESOURCE_TYPE, &state.mesh_time_window)
        .await
        .map_err(|e| {
            warn!(namespace = %ns, "Mesh stat summary failed: {}", e);
            ApiError::bad_gateway(e.to_string())
        })?;
    let meshed = mesh_deployments(&state.stores, &ns);
    stats.retain(|s| meshed.contains(&s.name));
    Ok(Json(stats))
}

async fn mesh_edges(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let edges = state
        .mesh
        .edges(&ns, MESH_RESOURCE_TYPE)
        .await
        .map_err(|e| {
            warn!(namespace = %ns, "Mesh edges failed: {}", e);
            ApiError::bad_gateway(e.to_string())
        })?;
    Ok(Json(edges))
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
