// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolve the workload a pod belongs to.
//!
//! A pod's workload is its controlling owner reference. Pods owned by a
//! `ReplicaSet` are attributed to the `Deployment` that owns the ReplicaSet,
//! so rollouts do not split one deployment into several workloads.

use crate::constants::{KIND_DEPLOYMENT, KIND_REPLICA_SET};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::warn;

/// Kind and name of a workload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkloadRef {
    pub kind: String,
    pub name: String,
}

fn controlling_owner(owners: &[OwnerReference]) -> Option<&OwnerReference> {
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
}

/// Resolve the workload of `pod`.
///
/// `replica_set` looks up a ReplicaSet in the pod's namespace. Returns `None`
/// for ownerless pods and for ReplicaSets whose owner chain is not exactly one
/// `Deployment`; the latter are logged.
pub fn resolve_owner(
    pod: &Pod,
    replica_set: impl Fn(&str) -> Option<Arc<ReplicaSet>>,
) -> Option<WorkloadRef> {
    let owner = controlling_owner(pod.owner_references())?;
    if owner.kind != KIND_REPLICA_SET {
        return Some(WorkloadRef {
            kind: owner.kind.clone(),
            name: owner.name.clone(),
        });
    }

    let Some(rs) = replica_set(&owner.name) else {
        warn!(
            "Pod {}/{} is owned by ReplicaSet {} which is not cached, dropping it",
            pod.namespace().unwrap_or_default(),
            pod.name_any(),
            owner.name
        );
        return None;
    };

    match rs.owner_references() {
        [single] if single.kind == KIND_DEPLOYMENT => Some(WorkloadRef {
            kind: single.kind.clone(),
            name: single.name.clone(),
        }),
        owners => {
            warn!(
                "ReplicaSet {}/{} has {} owner(s) and no single Deployment owner, dropping pod {}",
                rs.namespace().unwrap_or_default(),
                rs.name_any(),
                owners.len(),
                pod.name_any()
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "owner_tests.rs"]
mod owner_tests;
