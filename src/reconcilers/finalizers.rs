// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer helpers for namespaced objects.
//!
//! The config reconciler protects `ConfigMap`s and `Secret`s that are still
//! referenced by an opted-in workload. Both helpers are idempotent: they
//! compute the new finalizer list first and skip the API call when nothing
//! would change.
//!
//! # Example
//!
//! ```rust,ignore
//! use cluster_agent::constants::CONFIG_FINALIZER;
//! use cluster_agent::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
//!
//! ensure_finalizer(&client, &config_map, CONFIG_FINALIZER).await?;
//! // ... later, once no workload references it any more
//! remove_finalizer(&client, &config_map, CONFIG_FINALIZER).await?;
//! ```

use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

/// The finalizer list with `finalizer` appended, or `None` if already present.
#[must_use]
pub fn with_finalizer(existing: &[String], finalizer: &str) -> Option<Vec<String>> {
    if existing.iter().any(|f| f == finalizer) {
        return None;
    }
    let mut finalizers = existing.to_vec();
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// The finalizer list without `finalizer`, or `None` if it was absent.
#[must_use]
pub fn without_finalizer(existing: &[String], finalizer: &str) -> Option<Vec<String>> {
    if !existing.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(
        existing
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect(),
    )
}

async fn patch_finalizers<T>(client: &Client, resource: &T, finalizers: &[String]) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Add a finalizer to a resource if not already present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let existing = resource.finalizers();
    let Some(finalizers) = with_finalizer(existing, finalizer) else {
        debug!(
            "Finalizer {} already present on {} {}/{}",
            finalizer,
            T::kind(&()),
            resource.namespace().unwrap_or_default(),
            resource.name_any()
        );
        return Ok(());
    };

    patch_finalizers(client, resource, &finalizers).await?;
    info!(
        "Added finalizer {} to {} {}/{}",
        finalizer,
        T::kind(&()),
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    );
    Ok(())
}

/// Remove a finalizer from a resource if present.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let existing = resource.finalizers();
    let Some(finalizers) = without_finalizer(existing, finalizer) else {
        return Ok(());
    };

    patch_finalizers(client, resource, &finalizers).await?;
    info!(
        "Removed finalizer {} from {} {}/{}",
        finalizer,
        T::kind(&()),
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    );
    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
